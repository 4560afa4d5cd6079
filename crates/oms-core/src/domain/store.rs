//! 주문 저장소 및 공유 캐시 추상화.
//!
//! 두 공유 저장소는 프로세스 간 협조의 유일한 통로입니다. 주문 저장소는
//! 주문 행의 영속 기록을, 공유 캐시는 의도 메일박스/실패 카운터/참조 데이터를
//! 담당합니다. 구현체는 `oms-store`에 있습니다 (Postgres/Redis 및
//! 테스트·드라이런용 인메모리).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::StoreError;

use super::exchange::PositionSnapshot;
use super::order::{Order, OrderPatch, OrderType, PositionSide};
use rust_decimal::Decimal;

// =============================================================================
// 캐시 키
// =============================================================================

/// 거래소별 의도 메일박스 키.
pub fn mailbox_key(exchange: &str) -> String {
    format!("mailbox:{}", exchange)
}

/// (거래소, 봇, 심볼, 주문 종류)별 실패 카운터 키.
pub fn failure_key(exchange: &str, bot_id: &str, symbol: &str, order_type: OrderType) -> String {
    format!(
        "failures:{}:{}:{}:{}",
        exchange,
        bot_id,
        symbol,
        order_type.as_str()
    )
}

/// (거래소, 심볼, 포지션 방향)별 포지션 스냅샷 키.
pub fn position_key(exchange: &str, symbol: &str, side: PositionSide) -> String {
    format!("position:{}:{}:{}", exchange, symbol, side.as_str())
}

/// (거래소, 심볼)별 마크 가격 키.
pub fn mark_price_key(exchange: &str, symbol: &str) -> String {
    format!("mark:{}:{}", exchange, symbol)
}

// =============================================================================
// 조회 조건
// =============================================================================

/// 형제 주문 조회 조건. 같은 진입 주문에 연결된 보호 주문들을 찾거나,
/// (심볼, 포지션 방향) 단위로 열린 주문 묶음을 찾는 데 사용됩니다.
#[derive(Debug, Clone, Default)]
pub struct SiblingQuery {
    pub exchange: String,
    pub bot_id: Option<String>,
    pub symbol: Option<String>,
    pub position_side: Option<PositionSide>,
    /// 이 진입 주문을 가리키는 청산 주문들로 한정
    pub open_order_id: Option<String>,
    /// 열린 주문(`close_time IS NULL`)으로 한정
    pub open_only: bool,
}

impl SiblingQuery {
    pub fn for_exchange(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            open_only: true,
            ..Default::default()
        }
    }

    pub fn open_order_id(mut self, id: impl Into<String>) -> Self {
        self.open_order_id = Some(id.into());
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn position_side(mut self, side: PositionSide) -> Self {
        self.position_side = Some(side);
        self
    }
}

// =============================================================================
// OrderStore Trait
// =============================================================================

/// 주문 영속 저장소 trait.
///
/// "열린 주문"은 언제나 `close_time IS NULL`로 판정합니다. 쓰기 연산은
/// 영향받은 행이 있으면 `true`를 반환하며, 호출 측은 `false`를 로그만 남기고
/// 다음 패스의 멱등 재시도에 맡깁니다.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 새 주문 행 삽입.
    async fn create_order(&self, order: &Order) -> Result<bool, StoreError>;

    /// `patch.id` 대상 부분 갱신. 값이 있는 필드만 반영됩니다.
    async fn update_order(&self, patch: &OrderPatch) -> Result<bool, StoreError>;

    /// 클라이언트 ID로 단일 주문 조회.
    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError>;

    /// `New` 상태의 열린 주문 전체 (폴링 리컨실레이션 대상).
    async fn get_new_orders(
        &self,
        exchange: &str,
        bot_id: Option<&str>,
    ) -> Result<Vec<Order>, StoreError>;

    /// 열린 주문 전체.
    async fn get_open_orders(
        &self,
        exchange: &str,
        bot_id: Option<&str>,
    ) -> Result<Vec<Order>, StoreError>;

    /// 조건에 맞는 형제 주문 조회.
    async fn get_sibling_orders(&self, query: &SiblingQuery) -> Result<Vec<Order>, StoreError>;

    /// (심볼, 포지션 방향)의 열린 주문 조회.
    async fn get_open_orders_by_symbol(
        &self,
        exchange: &str,
        symbol: &str,
        position_side: Option<PositionSide>,
    ) -> Result<Vec<Order>, StoreError> {
        let mut query = SiblingQuery::for_exchange(exchange).symbol(symbol);
        if let Some(side) = position_side {
            query = query.position_side(side);
        }
        self.get_sibling_orders(&query).await
    }

    /// 진입 주문에 걸린 특정 종류의 열린 보호 주문 조회.
    async fn get_stop_order(
        &self,
        exchange: &str,
        open_order_id: &str,
        order_type: OrderType,
    ) -> Result<Option<Order>, StoreError> {
        let query = SiblingQuery::for_exchange(exchange).open_order_id(open_order_id);
        let siblings = self.get_sibling_orders(&query).await?;
        Ok(siblings.into_iter().find(|o| o.order_type == order_type))
    }

    /// 기준 시각보다 오래 열려 있는 주문 (고아 스위퍼 대상).
    async fn get_expired_orders(
        &self,
        exchange: &str,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError>;

    /// 보존 기한이 지난 취소 주문 행 삭제. 삭제된 행 수를 반환합니다.
    async fn delete_canceled_orders(
        &self,
        exchange: &str,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

// =============================================================================
// SharedCache Trait
// =============================================================================

/// 공유 캐시 trait.
///
/// 문자열 key/value 기본 연산 위에 엔진이 쓰는 형식화된 연산을 제공합니다.
/// 메일박스 점유는 원자적 set-if-not-exists로만 이루어지므로 두 프로듀서가
/// 동시에 빈 슬롯을 관측해도 한쪽만 성공합니다.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// 원시 문자열 조회.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 원시 문자열 기록 (TTL 선택).
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// 키 삭제.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    // ==================== 의도 메일박스 ====================

    /// 빈 메일박스 슬롯 점유 시도 (set-if-not-exists).
    ///
    /// 슬롯이 비어 있었고 기록에 성공하면 `true`, 이미 점유 중이면 `false`.
    /// 점유 실패는 "다음 틱에 재시도"일 뿐 오류가 아닙니다.
    ///
    /// 구현은 반드시 원자적이어야 합니다. 읽고-확인하고-쓰는 구현은 두
    /// 프로듀서가 동시에 빈 슬롯을 관측하는 창을 열어 의도 유실로 이어집니다.
    async fn claim_intent(&self, exchange: &str, intent: &Order) -> Result<bool, StoreError>;

    /// 메일박스 내용 조회 (소비하지 않음).
    async fn peek_intent(&self, exchange: &str) -> Result<Option<Order>, StoreError> {
        match self.get(&mailbox_key(exchange)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// 메일박스 비우기. 디스패처가 처리 결과와 무관하게 항상 호출합니다.
    async fn clear_intent(&self, exchange: &str) -> Result<(), StoreError> {
        self.del(&mailbox_key(exchange)).await
    }

    // ==================== 실패 카운터 ====================

    /// 실패 카운터 증가. 증가 후 값을 반환합니다.
    async fn incr_failure(
        &self,
        exchange: &str,
        bot_id: &str,
        symbol: &str,
        order_type: OrderType,
    ) -> Result<u32, StoreError>;

    /// 현재 실패 횟수 (카운터 없으면 0).
    async fn get_failure(
        &self,
        exchange: &str,
        bot_id: &str,
        symbol: &str,
        order_type: OrderType,
    ) -> Result<u32, StoreError> {
        let key = failure_key(exchange, bot_id, symbol, order_type);
        match self.get(&key).await? {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(0),
        }
    }

    /// 실패 카운터 삭제. 성공/종결 실패 양쪽에서 호출되어 카운터가 사건을
    /// 넘어 살아남지 않도록 합니다.
    async fn clear_failure(
        &self,
        exchange: &str,
        bot_id: &str,
        symbol: &str,
        order_type: OrderType,
    ) -> Result<(), StoreError> {
        self.del(&failure_key(exchange, bot_id, symbol, order_type))
            .await
    }

    // ==================== 참조 데이터 ====================

    /// 캐시된 포지션 스냅샷 조회.
    async fn position_snapshot(
        &self,
        exchange: &str,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<PositionSnapshot>, StoreError> {
        match self.get(&position_key(exchange, symbol, side)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// 포지션 스냅샷 게시.
    async fn set_position_snapshot(
        &self,
        exchange: &str,
        snapshot: &PositionSnapshot,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let key = position_key(exchange, &snapshot.symbol, snapshot.position_side);
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.set(&key, &payload, ttl).await
    }

    /// 캐시된 마크 가격 조회.
    async fn mark_price(&self, exchange: &str, symbol: &str) -> Result<Option<Decimal>, StoreError> {
        match self.get(&mark_price_key(exchange, symbol)).await? {
            Some(raw) => raw
                .parse::<Decimal>()
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// 마크 가격 게시.
    async fn set_mark_price(
        &self,
        exchange: &str,
        symbol: &str,
        price: Decimal,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.set(&mark_price_key(exchange, symbol), &price.to_string(), ttl)
            .await
    }
}
