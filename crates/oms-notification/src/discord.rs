//! Discord 알림 서비스.
//!
//! Discord Webhook을 통해 주문 수명주기 알림을 전송합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationPriority, NotificationResult,
    NotificationSender,
};

/// Discord 알림 전송 설정.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Discord Webhook URL
    pub webhook_url: String,
    /// 표시 이름 (봇 이름으로 표시)
    pub display_name: Option<String>,
    /// 전송 활성화 여부
    pub enabled: bool,
}

impl DiscordConfig {
    /// 새 Discord 설정을 생성합니다.
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            display_name: None,
            enabled: true,
        }
    }

    /// 표시 이름을 설정합니다.
    pub fn with_display_name(mut self, name: String) -> Self {
        self.display_name = Some(name);
        self
    }

    /// 환경 변수에서 설정을 생성합니다.
    ///
    /// `DISCORD_WEBHOOK_URL`이 없으면 `None`을 반환합니다.
    pub fn from_env() -> Option<Self> {
        let webhook_url = std::env::var("DISCORD_WEBHOOK_URL").ok()?;
        let display_name = std::env::var("DISCORD_DISPLAY_NAME").ok();
        let enabled = std::env::var("DISCORD_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Some(Self {
            webhook_url,
            display_name,
            enabled,
        })
    }
}

/// Discord 알림 전송기.
pub struct DiscordSender {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordSender {
    /// 새 Discord 전송기를 생성합니다.
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// 환경 변수에서 전송기를 생성합니다.
    pub fn from_env() -> Option<Self> {
        DiscordConfig::from_env().map(Self::new)
    }

    /// 우선순위에 따른 색상을 반환합니다 (Discord embed color는 decimal 값 사용).
    fn get_priority_color(&self, priority: &NotificationPriority) -> u32 {
        match priority {
            NotificationPriority::Low => 0x6c757d,      // 회색
            NotificationPriority::Normal => 0x007bff,   // 파랑
            NotificationPriority::High => 0xfd7e14,     // 주황
            NotificationPriority::Critical => 0xdc3545, // 빨강
        }
    }

    /// 알림을 Discord Embed로 포맷합니다.
    fn format_embed(&self, notification: &Notification) -> serde_json::Value {
        let color = self.get_priority_color(&notification.priority);
        let timestamp = notification.timestamp.to_rfc3339();

        match &notification.event {
            NotificationEvent::OrderSubmitted {
                symbol,
                side,
                order_type,
                qty,
                price,
                order_id,
            } => {
                let side_emoji = if side.to_uppercase() == "BUY" {
                    "🟢"
                } else {
                    "🔴"
                };
                json!({
                    "title": format!("{} 주문 접수", side_emoji),
                    "color": color,
                    "fields": [
                        { "name": "심볼", "value": format!("`{}`", symbol), "inline": true },
                        { "name": "방향", "value": side, "inline": true },
                        { "name": "종류", "value": order_type, "inline": true },
                        { "name": "수량", "value": qty.to_string(), "inline": true },
                        { "name": "가격", "value": price.to_string(), "inline": true },
                        { "name": "주문ID", "value": format!("`{}`", order_id), "inline": false }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::OrderFilled {
                symbol,
                side,
                qty,
                price,
                order_id,
            } => {
                let side_emoji = if side.to_uppercase() == "BUY" {
                    "🟢"
                } else {
                    "🔴"
                };
                json!({
                    "title": format!("{} 주문 체결", side_emoji),
                    "color": if side.to_uppercase() == "BUY" { 0x28a745 } else { 0xdc3545 },
                    "fields": [
                        { "name": "심볼", "value": format!("`{}`", symbol), "inline": true },
                        { "name": "방향", "value": side, "inline": true },
                        { "name": "수량", "value": qty.to_string(), "inline": true },
                        { "name": "가격", "value": price.to_string(), "inline": true },
                        { "name": "주문ID", "value": format!("`{}`", order_id), "inline": false }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::OrderCanceled {
                symbol,
                order_id,
                reason,
            } => {
                let mut fields = vec![
                    json!({ "name": "심볼", "value": format!("`{}`", symbol), "inline": true }),
                    json!({ "name": "주문ID", "value": format!("`{}`", order_id), "inline": true }),
                ];
                if let Some(reason) = reason {
                    fields.push(json!({ "name": "사유", "value": reason, "inline": false }));
                }
                json!({
                    "title": "⏹️ 주문 취소",
                    "color": color,
                    "fields": fields,
                    "timestamp": timestamp
                })
            }

            NotificationEvent::OrderAbandoned {
                symbol,
                order_id,
                code,
                message,
            } => {
                json!({
                    "title": "🚫 주문 포기",
                    "color": 0xdc3545,
                    "fields": [
                        { "name": "심볼", "value": format!("`{}`", symbol), "inline": true },
                        { "name": "주문ID", "value": format!("`{}`", order_id), "inline": true },
                        { "name": "거부 코드", "value": format!("`{}`", code), "inline": true },
                        { "name": "메시지", "value": message, "inline": false }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::EscalatedToMarket {
                symbol,
                order_type,
                attempts,
            } => {
                json!({
                    "title": "⚡ 시장가 전환",
                    "color": 0xfd7e14,
                    "fields": [
                        { "name": "심볼", "value": format!("`{}`", symbol), "inline": true },
                        { "name": "종류", "value": order_type, "inline": true },
                        { "name": "누적 거부", "value": format!("{}회", attempts), "inline": true }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::PositionClosed {
                symbol,
                position_side,
                qty,
                entry_price,
                exit_price,
                pnl,
            } => {
                let pnl_emoji = if *pnl >= Decimal::ZERO { "💰" } else { "📉" };
                let pnl_color = if *pnl >= Decimal::ZERO {
                    0x28a745
                } else {
                    0xdc3545
                };
                let pnl_sign = if *pnl >= Decimal::ZERO { "+" } else { "" };
                json!({
                    "title": format!("{} 포지션 청산", pnl_emoji),
                    "color": pnl_color,
                    "fields": [
                        { "name": "심볼", "value": format!("`{}`", symbol), "inline": true },
                        { "name": "방향", "value": position_side, "inline": true },
                        { "name": "수량", "value": qty.to_string(), "inline": true },
                        { "name": "진입가", "value": entry_price.to_string(), "inline": true },
                        { "name": "청산가", "value": exit_price.to_string(), "inline": true },
                        { "name": "손익", "value": format!("**{}{}**", pnl_sign, pnl), "inline": true }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::OrphanClosed {
                symbol,
                order_id,
                reason,
            } => {
                json!({
                    "title": "🧹 고아 주문 정리",
                    "color": color,
                    "fields": [
                        { "name": "심볼", "value": format!("`{}`", symbol), "inline": true },
                        { "name": "주문ID", "value": format!("`{}`", order_id), "inline": true },
                        { "name": "사유", "value": reason, "inline": false }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::SystemError {
                error_code,
                message,
            } => {
                json!({
                    "title": "🚨 시스템 오류",
                    "color": 0xdc3545,
                    "fields": [
                        { "name": "오류 코드", "value": format!("`{}`", error_code), "inline": true },
                        { "name": "메시지", "value": message, "inline": false }
                    ],
                    "timestamp": timestamp
                })
            }

            NotificationEvent::Custom { title, message } => {
                json!({
                    "title": title,
                    "description": message,
                    "color": color,
                    "timestamp": timestamp
                })
            }
        }
    }

    /// Discord Webhook을 통해 메시지를 전송합니다.
    async fn send_webhook(&self, embed: serde_json::Value) -> NotificationResult<()> {
        let mut payload = json!({
            "embeds": [embed],
        });

        if let Some(ref name) = self.config.display_name {
            payload["username"] = json!(name);
        }

        debug!("Discord webhook 메시지 전송");

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(NotificationError::NetworkError)?;

        if response.status().is_success() {
            info!("Discord 알림 전송 완료");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("Discord rate limited");
                return Err(NotificationError::RateLimited(60));
            }

            error!("Discord webhook 전송 실패: {} - {}", status, body);
            Err(NotificationError::SendFailed(format!(
                "HTTP {}: {}",
                status, body
            )))
        }
    }

    /// 테스트 메시지를 전송합니다.
    pub async fn send_test(&self) -> NotificationResult<()> {
        let embed = json!({
            "title": "✓ Discord 알림 설정 완료",
            "description": "주문 실행 엔진의 Discord 알림이 정상적으로 설정되었습니다.",
            "color": 0x28a745,
            "footer": { "text": "Order Execution Engine" }
        });

        self.send_webhook(embed).await
    }
}

#[async_trait]
impl NotificationSender for DiscordSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("Discord 알림이 비활성화되어 있습니다");
            return Ok(());
        }

        let embed = self.format_embed(notification);
        self.send_webhook(embed).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    fn name(&self) -> &str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discord_config_new() {
        let config = DiscordConfig::new("https://discord.com/api/webhooks/123/abc".to_string());
        assert!(config.webhook_url.contains("discord.com"));
        assert!(config.enabled);
        assert!(config.display_name.is_none());
    }

    #[test]
    fn test_priority_colors() {
        let config = DiscordConfig::new("https://example.com".to_string());
        let sender = DiscordSender::new(config);

        assert_eq!(
            sender.get_priority_color(&NotificationPriority::Low),
            0x6c757d
        );
        assert_eq!(
            sender.get_priority_color(&NotificationPriority::Critical),
            0xdc3545
        );
    }

    #[test]
    fn test_format_embed_position_closed() {
        let config = DiscordConfig::new("https://example.com".to_string());
        let sender = DiscordSender::new(config);

        let notification = Notification::new(NotificationEvent::PositionClosed {
            symbol: "BTCUSDT".to_string(),
            position_side: "LONG".to_string(),
            qty: dec!(2),
            entry_price: dec!(100),
            exit_price: dec!(150),
            pnl: dec!(99),
        });

        let embed = sender.format_embed(&notification);
        assert!(embed["title"].as_str().unwrap().contains("포지션 청산"));
        assert_eq!(embed["color"], 0x28a745); // 녹색 (수익)
    }

    #[test]
    fn test_format_embed_abandoned_is_red() {
        let config = DiscordConfig::new("https://example.com".to_string());
        let sender = DiscordSender::new(config);

        let notification = Notification::new(NotificationEvent::OrderAbandoned {
            symbol: "BTCUSDT".to_string(),
            order_id: "c1".to_string(),
            code: -2019,
            message: "Margin is insufficient.".to_string(),
        });

        let embed = sender.format_embed(&notification);
        assert_eq!(embed["color"], 0xdc3545);
    }

    #[test]
    fn test_disabled_sender_reports_disabled() {
        let mut config = DiscordConfig::new(String::new());
        config.enabled = true;
        let sender = DiscordSender::new(config);
        // webhook URL이 비어 있으면 비활성 취급
        assert!(!sender.is_enabled());
    }
}
