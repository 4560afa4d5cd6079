//! 인메모리 저장소/캐시 구현.
//!
//! 드라이런 모드와 테스트에서 실제 Postgres/Redis 없이 엔진을 끝까지
//! 구동하기 위한 구현입니다. 동작 계약(활성 조회 기준, 부분 갱신, 원자적
//! 메일박스 점유)은 실제 구현과 동일합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use oms_core::domain::{
    Order, OrderPatch, OrderStatus, OrderStore, OrderType, SharedCache, SiblingQuery,
};
use oms_core::error::StoreError;

// =============================================================================
// MemoryOrderStore
// =============================================================================

/// HashMap 기반 주문 저장소.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 주문 수 (테스트 검증용).
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    fn sorted(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by_key(|o| o.open_time);
        orders
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, order: &Order) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Ok(false);
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(true)
    }

    async fn update_order(&self, patch: &OrderPatch) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&patch.id) else {
            return Ok(false);
        };

        if let Some(ref_id) = &patch.ref_id {
            order.ref_id = ref_id.clone();
        }
        if let Some(status) = patch.status {
            order.status = status;
        }
        if let Some(open_price) = patch.open_price {
            order.open_price = open_price;
        }
        if let Some(close_price) = patch.close_price {
            order.close_price = close_price;
        }
        if let Some(commission) = patch.commission {
            order.commission = commission;
        }
        if let Some(asset) = &patch.commission_asset {
            order.commission_asset = Some(asset.clone());
        }
        if let Some(pl) = patch.pl {
            order.pl = pl;
        }
        if let Some(close_order_id) = &patch.close_order_id {
            order.close_order_id = Some(close_order_id.clone());
        }
        if let Some(open_time) = patch.open_time {
            order.open_time = open_time;
        }
        if let Some(close_time) = patch.close_time {
            order.close_time = Some(close_time);
        }
        if let Some(update_time) = patch.update_time {
            order.update_time = update_time;
        }
        if let Some(note) = &patch.note {
            order.note = Some(note.clone());
        }
        Ok(true)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn get_new_orders(
        &self,
        exchange: &str,
        bot_id: Option<&str>,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(Self::sorted(
            orders
                .values()
                .filter(|o| {
                    o.exchange == exchange
                        && o.status == OrderStatus::New
                        && o.is_open()
                        && bot_id.map_or(true, |b| o.bot_id == b)
                })
                .cloned()
                .collect(),
        ))
    }

    async fn get_open_orders(
        &self,
        exchange: &str,
        bot_id: Option<&str>,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(Self::sorted(
            orders
                .values()
                .filter(|o| {
                    o.exchange == exchange && o.is_open() && bot_id.map_or(true, |b| o.bot_id == b)
                })
                .cloned()
                .collect(),
        ))
    }

    async fn get_sibling_orders(&self, query: &SiblingQuery) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(Self::sorted(
            orders
                .values()
                .filter(|o| {
                    o.exchange == query.exchange
                        && query.bot_id.as_ref().map_or(true, |b| &o.bot_id == b)
                        && query.symbol.as_ref().map_or(true, |s| &o.symbol == s)
                        && query.position_side.map_or(true, |s| o.position_side == s)
                        && query
                            .open_order_id
                            .as_ref()
                            .map_or(true, |id| o.open_order_id.as_ref() == Some(id))
                        && (!query.open_only || o.is_open())
                })
                .cloned()
                .collect(),
        ))
    }

    async fn get_expired_orders(
        &self,
        exchange: &str,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(Self::sorted(
            orders
                .values()
                .filter(|o| o.exchange == exchange && o.is_open() && o.open_time < older_than)
                .cloned()
                .collect(),
        ))
    }

    async fn delete_canceled_orders(
        &self,
        exchange: &str,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut orders = self.orders.write().await;
        let before_len = orders.len();
        orders.retain(|_, o| {
            !(o.exchange == exchange
                && o.status == OrderStatus::Canceled
                && o.close_time.is_some_and(|t| t < before))
        });
        Ok((before_len - orders.len()) as u64)
    }
}

// =============================================================================
// MemoryCache
// =============================================================================

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// HashMap 기반 공유 캐시. 점유/증가 연산은 단일 잠금 아래에서 수행되어
/// Redis 구현과 같은 원자성을 보장합니다.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn claim_intent(&self, exchange: &str, intent: &Order) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(intent)?;
        let key = oms_core::domain::mailbox_key(exchange);

        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) if !entry.is_expired() => Ok(false),
            _ => {
                entries.insert(
                    key,
                    CacheEntry {
                        value: payload,
                        expires_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn incr_failure(
        &self,
        exchange: &str,
        bot_id: &str,
        symbol: &str,
        order_type: OrderType,
    ) -> Result<u32, StoreError> {
        let key = oms_core::domain::failure_key(exchange, bot_id, symbol, order_type);
        let mut entries = self.entries.lock().await;

        let next = match entries.get(&key) {
            Some(entry) if !entry.is_expired() => entry
                .value
                .parse::<u32>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?
                .saturating_add(1),
            _ => 1,
        };
        entries.insert(
            key,
            CacheEntry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use oms_core::domain::{PositionSide, Side};
    use rust_decimal_macros::dec;

    fn order(id: &str, exchange: &str) -> Order {
        let mut o = Order::new(
            exchange,
            "bot-a",
            "BTCUSDT",
            Side::Buy,
            PositionSide::Long,
            OrderType::Limit,
            dec!(1),
        );
        o.id = id.to_string();
        o
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_id() {
        let store = MemoryOrderStore::new();
        let o = order("1", "binance");
        assert!(store.create_order(&o).await.unwrap());
        assert!(!store.create_order(&o).await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_patch_applies_only_present_fields() {
        let store = MemoryOrderStore::new();
        let o = order("1", "binance");
        store.create_order(&o).await.unwrap();

        let patch = OrderPatch::for_order("1")
            .status(OrderStatus::Filled)
            .close_price(dec!(42000));
        assert!(store.update_order(&patch).await.unwrap());

        let loaded = store.get_order("1").await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Filled);
        assert_eq!(loaded.close_price, dec!(42000));
        // 패치에 없는 필드는 그대로
        assert_eq!(loaded.qty, dec!(1));
        assert!(loaded.close_time.is_none());
    }

    #[tokio::test]
    async fn test_open_queries_exclude_closed_orders() {
        let store = MemoryOrderStore::new();
        let mut a = order("1", "binance");
        a.status = OrderStatus::Filled;
        let mut b = order("2", "binance");
        b.close_time = Some(Utc::now());
        store.create_order(&a).await.unwrap();
        store.create_order(&b).await.unwrap();

        let open = store.get_open_orders("binance", None).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "1");

        let scoped = store
            .get_open_orders_by_symbol("binance", "BTCUSDT", Some(PositionSide::Long))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert!(store
            .get_open_orders_by_symbol("binance", "ETHUSDT", None)
            .await
            .unwrap()
            .is_empty());

        // New 조회는 상태까지 본다
        assert!(store.get_new_orders("binance", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sibling_query_filters_by_open_order_id() {
        let store = MemoryOrderStore::new();
        let entry = order("1", "binance");
        let mut stop = order("2", "binance");
        stop.order_type = OrderType::StopLossLimit;
        stop.open_order_id = Some("1".to_string());
        let mut take = order("3", "binance");
        take.order_type = OrderType::TakeProfitLimit;
        take.open_order_id = Some("1".to_string());
        take.close_time = Some(Utc::now());
        store.create_order(&entry).await.unwrap();
        store.create_order(&stop).await.unwrap();
        store.create_order(&take).await.unwrap();

        // 진입 주문 자신은 제외, 닫힌 형제도 제외
        let query = SiblingQuery::for_exchange("binance").open_order_id("1");
        let siblings = store.get_sibling_orders(&query).await.unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].id, "2");

        let other = SiblingQuery::for_exchange("binance").open_order_id("9");
        assert!(store.get_sibling_orders(&other).await.unwrap().is_empty());

        // 종류 지정 조회: 열린 스탑은 찾고 닫힌 익절은 제외
        let found = store
            .get_stop_order("binance", "1", OrderType::StopLossLimit)
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some("2".to_string()));
        assert!(store
            .get_stop_order("binance", "1", OrderType::TakeProfitLimit)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_canceled_orders_respects_retention() {
        let store = MemoryOrderStore::new();
        let mut stale = order("1", "binance");
        stale.status = OrderStatus::Canceled;
        stale.close_time = Some(Utc::now() - chrono::Duration::days(10));
        let mut fresh = order("2", "binance");
        fresh.status = OrderStatus::Canceled;
        fresh.close_time = Some(Utc::now());
        store.create_order(&stale).await.unwrap();
        store.create_order(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(7);
        let deleted = store
            .delete_canceled_orders("binance", cutoff)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_order("1").await.unwrap().is_none());
        assert!(store.get_order("2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_intent_single_occupancy() {
        let cache = MemoryCache::new();
        let first = order("1", "binance");
        let second = order("2", "binance");

        assert!(cache.claim_intent("binance", &first).await.unwrap());
        assert!(!cache.claim_intent("binance", &second).await.unwrap());

        // 점유 중에도 다른 거래소 슬롯은 독립적
        assert!(cache.claim_intent("bybit", &second).await.unwrap());

        let peeked = cache.peek_intent("binance").await.unwrap().unwrap();
        assert_eq!(peeked.id, "1");

        cache.clear_intent("binance").await.unwrap();
        assert!(cache.peek_intent("binance").await.unwrap().is_none());
        assert!(cache.claim_intent("binance", &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_counter_lifecycle() {
        let cache = MemoryCache::new();
        let n1 = cache
            .incr_failure("binance", "bot-a", "BTCUSDT", OrderType::Limit)
            .await
            .unwrap();
        let n2 = cache
            .incr_failure("binance", "bot-a", "BTCUSDT", OrderType::Limit)
            .await
            .unwrap();
        assert_eq!((n1, n2), (1, 2));

        assert_eq!(
            cache
                .get_failure("binance", "bot-a", "BTCUSDT", OrderType::Limit)
                .await
                .unwrap(),
            2
        );

        cache
            .clear_failure("binance", "bot-a", "BTCUSDT", OrderType::Limit)
            .await
            .unwrap();
        assert_eq!(
            cache
                .get_failure("binance", "bot-a", "BTCUSDT", OrderType::Limit)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
