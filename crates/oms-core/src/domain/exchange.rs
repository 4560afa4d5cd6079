//! 거래소 클라이언트 추상화.
//!
//! 선물 거래소의 REST 주문 연산과 사용자 데이터 스트림 수명주기를
//! 거래소 중립적인 인터페이스로 제공합니다. 구현체는 `oms-exchange`에 있으며
//! 테스트는 스크립트형 목 구현을 주입합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

use super::order::{Order, OrderStatus, OrderType, PositionSide, Side};

// =============================================================================
// 응답 타입
// =============================================================================

/// 주문 제출/취소 승인 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// 거래소 부여 주문 ID
    pub ref_id: String,
    pub status: OrderStatus,
    /// 승인 시점의 (평균) 가격. 시장가 주문에서 0일 수 있으며, 이 경우
    /// 호출 측이 캐시된 마크 가격으로 보정합니다.
    pub price: Decimal,
    pub executed_qty: Decimal,
    pub transact_time: DateTime<Utc>,
}

/// 거래소가 보고하는 주문 스냅샷 (`get_order` 결과).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub ref_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub status: OrderStatus,
    pub order_type: Option<OrderType>,
    pub side: Option<Side>,
    pub price: Decimal,
    pub avg_price: Decimal,
    pub stop_price: Decimal,
    pub executed_qty: Decimal,
    pub update_time: DateTime<Utc>,
}

/// 개별 체결 내역 (`get_trades_list` 항목).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub trade_id: i64,
    /// 이 체결이 속한 주문의 거래소 ID
    pub order_ref_id: String,
    pub symbol: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub time: DateTime<Utc>,
}

/// 계좌 요약.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub total_balance: Decimal,
    pub available_balance: Decimal,
    pub unrealized_pnl: Decimal,
    pub updated: DateTime<Utc>,
}

/// (심볼, 포지션 방향)별 포지션 스냅샷. 공유 캐시에 게시되어 고아 주문
/// 판정과 시장가 보정에 사용됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub position_side: PositionSide,
    /// 포지션 수량 (절대값)
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub updated: DateTime<Utc>,
}

impl PositionSnapshot {
    /// 주어진 수량을 지탱할 수 있는지 여부. 스냅샷 수량이 주문 수량보다
    /// 작으면 해당 주문은 고아로 판정됩니다.
    pub fn supports_qty(&self, qty: Decimal) -> bool {
        self.amount >= qty
    }
}

// =============================================================================
// ExchangeClient Trait
// =============================================================================

/// 선물 거래소 클라이언트 trait.
///
/// 디스패처와 리컨실러가 사용하는 전체 REST 연산과 사용자 데이터 스트림
/// 토큰 수명주기를 정의합니다. 거부 코드는 [`ExchangeError::Rejected`]로
/// 전달되며, "즉시 체결됨" 거부 클래스는
/// [`ExchangeError::is_would_trigger`]로 다른 모든 거부와 구분됩니다.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 지정가 계열 주문 제출 (Limit/StopLossLimit/TakeProfitLimit).
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Rejected`: 거래소 거부 (코드 포함)
    /// - `ExchangeError::Network`: 네트워크 연결 실패
    async fn place_limit_order(&self, order: &Order) -> Result<OrderAck, ExchangeError>;

    /// 시장가 주문 제출. `Stop`/`TakeProfit` 종류는 트리거-시장가 주문으로
    /// 제출됩니다.
    async fn place_market_order(&self, order: &Order) -> Result<OrderAck, ExchangeError>;

    /// 주문 취소.
    async fn cancel_order(
        &self,
        symbol: &str,
        client_order_id: &str,
        ref_id: &str,
    ) -> Result<OrderAck, ExchangeError>;

    /// 단일 주문 조회. 거래소에 기록이 없으면 `Ok(None)`.
    async fn get_order(
        &self,
        symbol: &str,
        client_order_id: &str,
        ref_id: &str,
    ) -> Result<Option<ExchangeOrder>, ExchangeError>;

    /// 최근 체결 내역 조회 (최신순 최대 `limit`건).
    async fn get_trades_list(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<TradeFill>, ExchangeError>;

    /// 계좌 요약 조회.
    async fn get_account_info(&self) -> Result<AccountInfo, ExchangeError>;

    /// 현재 열린 포지션 전체 조회.
    async fn get_open_positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError>;

    /// 사용자 데이터 스트림 토큰 발급.
    async fn start_user_data_stream(&self) -> Result<String, ExchangeError>;

    /// 스트림 토큰 연장 (keepalive).
    async fn keepalive_user_data_stream(&self, token: &str) -> Result<(), ExchangeError>;

    /// 스트림 토큰 폐기. 종료 경로에서 best-effort로 호출됩니다.
    async fn stop_user_data_stream(&self, token: &str) -> Result<(), ExchangeError>;

    /// 거래소 이름.
    fn exchange_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_snapshot_supports_qty() {
        let snap = PositionSnapshot {
            symbol: "BTCUSDT".to_string(),
            position_side: PositionSide::Long,
            amount: dec!(1.5),
            entry_price: dec!(42000),
            mark_price: dec!(42100),
            updated: Utc::now(),
        };

        assert!(snap.supports_qty(dec!(1.5)));
        assert!(snap.supports_qty(dec!(0.3)));
        assert!(!snap.supports_qty(dec!(2)));
    }
}
