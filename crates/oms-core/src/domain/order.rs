//! 주문 도메인 모델.
//!
//! 실행 엔진의 중심 엔티티인 [`Order`]와 관련 열거형을 정의합니다.
//! 모든 금액/수량은 `rust_decimal::Decimal`, 모든 시각은 `DateTime<Utc>`를
//! 사용합니다.
//!
//! # 주문 수명주기
//!
//! ```text
//! 생성(프로듀서) → 메일박스 → 디스패처 제출 → 거래소 수락(refId 부여, New)
//!   → 폴링/스트림으로 상태 전이 → 종결(Filled/Canceled/Rejected/Expired)
//!   → close_time 설정 시 모든 활성 조회에서 영구 제외
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// 열거형
// =============================================================================

/// 주문 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// 포지션 방향 (헤지 모드).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LONG" => Some(PositionSide::Long),
            "SHORT" => Some(PositionSide::Short),
            _ => None,
        }
    }
}

/// 주문 종류.
///
/// `StopLossLimit`/`TakeProfitLimit`은 지정가 계열(트리거 + 지정가),
/// `Stop`/`TakeProfit`은 트리거 시 시장가로 체결되는 변형입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLossLimit,
    TakeProfitLimit,
    Stop,
    TakeProfit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            OrderType::Stop => "STOP",
            OrderType::TakeProfit => "TAKE_PROFIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LIMIT" => Some(OrderType::Limit),
            "MARKET" => Some(OrderType::Market),
            "STOP_LOSS_LIMIT" => Some(OrderType::StopLossLimit),
            "TAKE_PROFIT_LIMIT" => Some(OrderType::TakeProfitLimit),
            "STOP" => Some(OrderType::Stop),
            "TAKE_PROFIT" => Some(OrderType::TakeProfit),
            _ => None,
        }
    }

    /// 지정가 계열 여부 (지정가로 제출되는 주문).
    pub fn is_limit_family(&self) -> bool {
        matches!(
            self,
            OrderType::Limit | OrderType::StopLossLimit | OrderType::TakeProfitLimit
        )
    }

    /// 보호 주문(손절/익절) 여부.
    pub fn is_protective(&self) -> bool {
        matches!(
            self,
            OrderType::StopLossLimit
                | OrderType::TakeProfitLimit
                | OrderType::Stop
                | OrderType::TakeProfit
        )
    }

    /// 트리거 가격(`stop_price`)이 필요한 종류 여부.
    pub fn requires_trigger(&self) -> bool {
        self.is_protective()
    }
}

/// 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NEW" => Some(OrderStatus::New),
            "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
            "FILLED" => Some(OrderStatus::Filled),
            "CANCELED" | "CANCELLED" => Some(OrderStatus::Canceled),
            "EXPIRED" => Some(OrderStatus::Expired),
            "REJECTED" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }

    /// 종결 상태 여부. 종결 후에는 상태 전이가 일어나지 않습니다.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected
        )
    }

    /// 취소 계열(Canceled/Rejected/Expired) 여부. 동기화 시 즉시 로컬 종결 대상.
    pub fn is_cancel_like(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected
        )
    }
}

// =============================================================================
// Order
// =============================================================================

/// 실행 엔진의 중심 엔티티.
///
/// - `id`: 클라이언트 생성 식별자 (거래소의 clientOrderId로 전달)
/// - `ref_id`: 거래소 부여 식별자. 수락 전까지 빈 문자열.
/// - `open_order_id`: 청산 주문에서 자신이 닫는 진입 주문을 가리킴
/// - `close_order_id`: 진입 주문에서, 청산 주문 체결 후 역방향 링크로 기록됨
/// - `close_time`: 설정되는 순간 모든 활성 주문 조회에서 제외됨 (단조 증가,
///   한 번 설정되면 해제되지 않음)
/// - `commission`: 0이면 아직 체결 내역이 연결되지 않았다는 센티널
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub ref_id: String,
    pub exchange: String,
    pub bot_id: String,
    pub symbol: String,
    pub side: Side,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub qty: Decimal,
    pub open_price: Decimal,
    pub stop_price: Decimal,
    pub close_price: Decimal,
    pub commission: Decimal,
    pub commission_asset: Option<String>,
    pub pl: Decimal,
    pub open_order_id: Option<String>,
    pub close_order_id: Option<String>,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub update_time: DateTime<Utc>,
    pub note: Option<String>,
}

impl Order {
    /// 새 주문 의도를 생성합니다. `ref_id`는 거래소 수락 전까지 비어 있습니다.
    pub fn new(
        exchange: impl Into<String>,
        bot_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        position_side: PositionSide,
        order_type: OrderType,
        qty: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(),
            ref_id: String::new(),
            exchange: exchange.into(),
            bot_id: bot_id.into(),
            symbol: symbol.into(),
            side,
            position_side,
            order_type,
            status: OrderStatus::New,
            qty,
            open_price: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            close_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            commission_asset: None,
            pl: Decimal::ZERO,
            open_order_id: None,
            close_order_id: None,
            open_time: now,
            close_time: None,
            update_time: now,
            note: None,
        }
    }

    /// 클라이언트 주문 ID 생성. epoch 밀리초 접두어로 대략적인 단조성을 확보하고
    /// UUID 일부로 충돌을 방지합니다.
    pub fn generate_id() -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("{}{}", Utc::now().timestamp_millis(), &uuid[..8])
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.open_price = price;
        self
    }

    pub fn with_stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = stop_price;
        self
    }

    /// 이 주문을 진입 주문 `open_order_id`를 닫는 청산 주문으로 표시합니다.
    pub fn closing(mut self, open_order_id: impl Into<String>) -> Self {
        self.open_order_id = Some(open_order_id.into());
        self
    }

    /// 열린 주문 여부. `close_time`이 비어 있는 동안만 활성 조회에 포함됩니다.
    pub fn is_open(&self) -> bool {
        self.close_time.is_none()
    }

    /// 청산 주문 여부 (진입 주문 링크 보유 또는 트리거-시장가 보호 주문).
    pub fn is_closing_order(&self) -> bool {
        self.open_order_id.is_some()
            || matches!(self.order_type, OrderType::Stop | OrderType::TakeProfit)
    }

    /// 체결 내역 연결 전 여부. `commission == 0`이 "아직 미처리" 센티널입니다.
    pub fn fill_unlinked(&self) -> bool {
        self.commission.is_zero()
    }
}

// =============================================================================
// 실현 손익
// =============================================================================

/// 청산 체결가 기준 실현 손익을 계산합니다.
///
/// `(청산 체결가 − 진입 체결가) × 수량 − 청산 수수료 − 진입 수수료`,
/// 숏 포지션은 가격 차 부호를 반전합니다. 진입 주문의 역방향 링크가 기록되는
/// 순간 정확히 한 번 계산됩니다.
pub fn realized_pnl(
    position_side: PositionSide,
    open_fill_price: Decimal,
    close_fill_price: Decimal,
    qty: Decimal,
    open_commission: Decimal,
    close_commission: Decimal,
) -> Decimal {
    let diff = match position_side {
        PositionSide::Long => close_fill_price - open_fill_price,
        PositionSide::Short => open_fill_price - close_fill_price,
    };
    diff * qty - close_commission - open_commission
}

// =============================================================================
// OrderPatch
// =============================================================================

/// 부분 갱신 페이로드. `id`로 대상을 지정하고, 값이 있는 필드만 저장소에
/// 반영됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub id: String,
    pub ref_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub open_price: Option<Decimal>,
    pub close_price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub commission_asset: Option<String>,
    pub pl: Option<Decimal>,
    pub close_order_id: Option<String>,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl OrderPatch {
    /// 대상 주문 `id`만 지정한 빈 패치를 생성합니다. `update_time`은 항상
    /// 현재 시각으로 채워집니다.
    pub fn for_order(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            update_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    pub fn close_price(mut self, price: Decimal) -> Self {
        self.close_price = Some(price);
        self
    }

    pub fn open_price(mut self, price: Decimal) -> Self {
        self.open_price = Some(price);
        self
    }

    pub fn commission(mut self, commission: Decimal, asset: Option<String>) -> Self {
        self.commission = Some(commission);
        self.commission_asset = asset;
        self
    }

    pub fn pl(mut self, pl: Decimal) -> Self {
        self.pl = Some(pl);
        self
    }

    pub fn close_order_id(mut self, id: impl Into<String>) -> Self {
        self.close_order_id = Some(id.into());
        self
    }

    pub fn closed_at(mut self, time: DateTime<Utc>) -> Self {
        self.close_time = Some(time);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// =============================================================================
// 테스트
// =============================================================================
