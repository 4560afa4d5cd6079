//! 주문 수명주기 알림.
//!
//! 이 crate는 다음을 제공합니다:
//! - 채널 중립적 알림 이벤트/우선순위 모델
//! - Discord Webhook 전송기
//! - 구조화 로그 전송기 (기본값)
//!
//! # 예제
//!
//! ```rust,ignore
//! use oms_notification::{DiscordSender, Notification, NotificationEvent, NotificationSender};
//!
//! let sender = DiscordSender::from_env().expect("DISCORD_WEBHOOK_URL");
//! let notification = Notification::new(NotificationEvent::Custom {
//!     title: "엔진 시작".to_string(),
//!     message: "주문 실행 엔진이 시작되었습니다.".to_string(),
//! });
//! sender.send(&notification).await?;
//! ```

pub mod discord;
pub mod types;

// 주요 타입 재내보내기
pub use discord::{DiscordConfig, DiscordSender};
pub use types::{
    LogSender, Notification, NotificationError, NotificationEvent, NotificationPriority,
    NotificationResult, NotificationSender,
};
