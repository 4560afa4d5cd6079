//! 사용자 데이터 스트림 이벤트.
//!
//! 거래소 웹소켓의 원시 메시지를 거래소 중립 이벤트로 변환해 리컨실레이션
//! 엔진의 푸시 경로로 전달합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{OrderStatus, OrderType, Side};

/// 스트림에서 수신한 주문 갱신 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdateEvent {
    pub symbol: String,
    /// 로컬 주문과 매칭되는 클라이언트 주문 ID
    pub client_order_id: String,
    pub ref_id: String,
    pub status: OrderStatus,
    pub order_type: Option<OrderType>,
    pub side: Option<Side>,
    /// 누적 체결 수량
    pub executed_qty: Decimal,
    /// 평균 체결 가격 (체결 전 0)
    pub avg_price: Decimal,
    /// 이번 이벤트의 체결 수수료 (체결 이벤트가 아니면 0)
    pub commission: Decimal,
    pub commission_asset: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl OrderUpdateEvent {
    /// 체결 정보를 포함한 이벤트 여부.
    pub fn has_fill(&self) -> bool {
        !self.executed_qty.is_zero() && !self.avg_price.is_zero()
    }
}

/// 스트림 수명주기를 포함한 상위 이벤트.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// 주문 상태 변경
    OrderUpdate(OrderUpdateEvent),
    /// 거래소가 토큰 만료를 통지함. 즉시 재연결 필요.
    ListenKeyExpired,
    /// 연결이 끊어짐 (사유 포함). 다음 갱신 틱에서 복구됩니다.
    Disconnected(String),
}
