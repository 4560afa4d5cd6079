//! 알림 공통 타입.
//!
//! 주문 수명주기 이벤트를 채널 중립적으로 표현합니다. 전송 채널(Discord,
//! 로그 등)은 [`NotificationSender`]를 구현하며, 이벤트의 필드는 엔진
//! 도메인에 의존하지 않는 원시 타입으로 유지합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

/// 알림 에러.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// 요청 한도 초과 (재시도 가능 시간(초) 포함)
    #[error("요청 한도 초과: {0}초 후 재시도")]
    RateLimited(u64),

    /// 전송 실패
    #[error("전송 실패: {0}")]
    SendFailed(String),

    /// 잘못된 설정
    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 우선순위.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// 주문 수명주기 알림 이벤트.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// 주문이 거래소에 수락됨
    OrderSubmitted {
        symbol: String,
        side: String,
        order_type: String,
        qty: Decimal,
        price: Decimal,
        order_id: String,
    },

    /// 주문 체결
    OrderFilled {
        symbol: String,
        side: String,
        qty: Decimal,
        price: Decimal,
        order_id: String,
    },

    /// 주문 취소 완료
    OrderCanceled {
        symbol: String,
        order_id: String,
        reason: Option<String>,
    },

    /// 종결 거부로 주문을 로컬에서 포기함
    OrderAbandoned {
        symbol: String,
        order_id: String,
        code: i64,
        message: String,
    },

    /// 반복 거부로 시장가 주문으로 전환됨
    EscalatedToMarket {
        symbol: String,
        order_type: String,
        attempts: u32,
    },

    /// 포지션 청산 (실현 손익 포함)
    PositionClosed {
        symbol: String,
        position_side: String,
        qty: Decimal,
        entry_price: Decimal,
        exit_price: Decimal,
        pnl: Decimal,
    },

    /// 고아 주문이 로컬에서 정리됨
    OrphanClosed {
        symbol: String,
        order_id: String,
        reason: String,
    },

    /// 시스템 오류
    SystemError { error_code: String, message: String },

    /// 자유 형식 알림
    Custom { title: String, message: String },
}

impl NotificationEvent {
    /// 이벤트의 기본 우선순위.
    fn default_priority(&self) -> NotificationPriority {
        match self {
            NotificationEvent::SystemError { .. } => NotificationPriority::Critical,
            NotificationEvent::OrderAbandoned { .. }
            | NotificationEvent::EscalatedToMarket { .. } => NotificationPriority::High,
            NotificationEvent::OrderCanceled { .. } | NotificationEvent::OrphanClosed { .. } => {
                NotificationPriority::Low
            }
            _ => NotificationPriority::Normal,
        }
    }
}

/// 전송 채널로 전달되는 알림.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: NotificationEvent,
    pub priority: NotificationPriority,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 이벤트 기본 우선순위로 알림을 생성합니다.
    pub fn new(event: NotificationEvent) -> Self {
        let priority = event.default_priority();
        Self {
            event,
            priority,
            timestamp: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

// =============================================================================
// NotificationSender Trait
// =============================================================================

/// 알림 전송 채널.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 알림을 전송합니다. 비활성화된 채널은 조용히 `Ok(())`를 반환합니다.
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;

    /// 전송 활성화 여부.
    fn is_enabled(&self) -> bool;

    /// 채널 이름.
    fn name(&self) -> &str;
}

// =============================================================================
// LogSender
// =============================================================================

/// 구조화 로그로만 기록하는 전송기.
///
/// 외부 채널이 설정되지 않았거나 DRY_RUN 모드일 때의 기본 전송기입니다.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        info!(
            priority = ?notification.priority,
            event = ?notification.event,
            "알림"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "log"
    }
}
