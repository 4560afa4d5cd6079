//! 서비스 컨텍스트.
//!
//! 워크플로우 모듈이 공유하는 의존성 묶음입니다. 저장소, 캐시, 거래소
//! 클라이언트, 알림 채널을 trait object로 보유해 드라이런과 실거래
//! 구성을 같은 코드 경로로 돌립니다.

use std::sync::Arc;

use oms_core::{ExchangeClient, OrderStore, SharedCache};
use oms_notification::{Notification, NotificationEvent, NotificationSender};

use crate::config::EngineConfig;

/// 워크플로우 공유 의존성
#[derive(Clone)]
pub struct ServiceContext {
    pub config: EngineConfig,
    pub store: Arc<dyn OrderStore>,
    pub cache: Arc<dyn SharedCache>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub notifier: Arc<dyn NotificationSender>,
}

impl ServiceContext {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn SharedCache>,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            exchange,
            notifier,
        }
    }

    /// 알림 이벤트 발송. 실패해도 워크플로우를 중단하지 않습니다.
    pub async fn notify(&self, event: NotificationEvent) {
        if !self.notifier.is_enabled() {
            return;
        }
        let notification = Notification::new(event);
        if let Err(e) = self.notifier.send(&notification).await {
            tracing::warn!("알림 발송 실패 ({}): {}", self.notifier.name(), e);
        }
    }
}
