//! Redis 공유 캐시.
//!
//! 의도 메일박스, 실패 카운터, 포지션 스냅샷, 마크 가격을 담는 프로세스 간
//! 공유 저장소입니다. 메일박스 점유는 `SET NX PX`로 원자적으로 이루어집니다.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

use oms_core::domain::{failure_key, mailbox_key, Order, OrderType, SharedCache};
use oms_core::error::StoreError;

/// 메일박스 엔트리 TTL 상한. 점유 후 소비되지 않은 의도는 이 시간이 지나면
/// 소멸합니다.
const MAILBOX_TTL: Duration = Duration::from_secs(600);

// =============================================================================
// 설정
// =============================================================================

/// Redis 연결 설정.
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub url: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

// =============================================================================
// RedisSharedCache
// =============================================================================

/// Redis 기반 공유 캐시.
#[derive(Clone)]
pub struct RedisSharedCache {
    conn: ConnectionManager,
}

impl RedisSharedCache {
    /// 설정으로 연결을 생성합니다. 연결 매니저가 재연결을 관리합니다.
    pub async fn connect(config: &RedisCacheConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        debug!("Redis 연결 완료");
        Ok(Self { conn })
    }

    fn cache_err(e: redis::RedisError) -> StoreError {
        StoreError::Cache(e.to_string())
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(Self::cache_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await
                    .map_err(Self::cache_err)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(Self::cache_err)?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(Self::cache_err)?;
        Ok(())
    }

    async fn claim_intent(&self, exchange: &str, intent: &Order) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(intent)?;
        let mut conn = self.conn.clone();

        // SET NX PX: 슬롯이 비어 있을 때만 기록. nil 응답이면 이미 점유 중.
        let reply: Option<String> = redis::cmd("SET")
            .arg(mailbox_key(exchange))
            .arg(&payload)
            .arg("NX")
            .arg("PX")
            .arg(MAILBOX_TTL.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(Self::cache_err)?;

        let claimed = reply.is_some();
        if !claimed {
            debug!(exchange = exchange, intent_id = %intent.id, "메일박스 점유 실패 (슬롯 사용 중)");
        }
        Ok(claimed)
    }

    async fn incr_failure(
        &self,
        exchange: &str,
        bot_id: &str,
        symbol: &str,
        order_type: OrderType,
    ) -> Result<u32, StoreError> {
        let key = failure_key(exchange, bot_id, symbol, order_type);
        let mut conn = self.conn.clone();
        let count: u32 = conn.incr(&key, 1u32).await.map_err(Self::cache_err)?;
        if count > 1 {
            warn!(key = %key, count = count, "연속 거부 누적");
        }
        Ok(count)
    }
}
