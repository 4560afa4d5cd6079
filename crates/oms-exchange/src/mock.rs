//! Mock 거래소 클라이언트.
//!
//! DRY_RUN 모드와 엔진 모듈 테스트에서 실제 거래소 대신 주입되는 가상
//! 거래소입니다. 기본 동작은 "즉시 수락"이며, 결과 큐에 거부/네트워크 에러를
//! 주입해 실패 경로를 재현할 수 있습니다. 모든 연산은 호출 횟수를 기록하므로
//! "거래소 호출이 없어야 한다"는 성질도 검증할 수 있습니다.
//!
//! # 거래소 중립성
//!
//! 실제 거래소 클라이언트와 동일한 [`ExchangeClient`] 인터페이스를 제공하므로
//! 엔진 코드는 주입된 구현이 무엇인지 알지 못합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use oms_core::{
    AccountInfo, ExchangeClient, ExchangeError, ExchangeOrder, Order, OrderAck, OrderStatus,
    PositionSnapshot, TradeFill,
};

type ScriptedResult = Result<OrderAck, ExchangeError>;

/// Mock 거래소 설정.
#[derive(Debug, Clone)]
pub struct MockExchangeConfig {
    /// 거래소 이름 (로그/키 프리픽스에 사용)
    pub name: String,
    /// 체결 수수료율 (기본 0.04%)
    pub commission_rate: Decimal,
    /// 수수료 자산 (기본 USDT)
    pub commission_asset: String,
    /// 초기 잔고
    pub initial_balance: Decimal,
}

impl Default for MockExchangeConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            commission_rate: dec!(0.0004), // 0.04%
            commission_asset: "USDT".to_string(),
            initial_balance: dec!(10_000),
        }
    }
}

/// 스크립트 주입이 가능한 가상 거래소.
pub struct MockExchange {
    config: MockExchangeConfig,
    next_ref_id: AtomicU64,
    next_trade_id: AtomicU64,
    next_token: AtomicU64,

    limit_results: Mutex<VecDeque<ScriptedResult>>,
    market_results: Mutex<VecDeque<ScriptedResult>>,
    cancel_results: Mutex<VecDeque<ScriptedResult>>,

    /// 클라이언트 주문 ID → 거래소 측 주문 스냅샷
    orders: RwLock<HashMap<String, ExchangeOrder>>,
    trades: RwLock<Vec<TradeFill>>,
    positions: RwLock<Vec<PositionSnapshot>>,

    limit_calls: AtomicU32,
    market_calls: AtomicU32,
    cancel_calls: AtomicU32,
    lookup_calls: AtomicU32,
    trade_calls: AtomicU32,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new(MockExchangeConfig::default())
    }
}

impl MockExchange {
    pub fn new(config: MockExchangeConfig) -> Self {
        Self {
            config,
            next_ref_id: AtomicU64::new(9000),
            next_trade_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            limit_results: Mutex::new(VecDeque::new()),
            market_results: Mutex::new(VecDeque::new()),
            cancel_results: Mutex::new(VecDeque::new()),
            orders: RwLock::new(HashMap::new()),
            trades: RwLock::new(Vec::new()),
            positions: RwLock::new(Vec::new()),
            limit_calls: AtomicU32::new(0),
            market_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
            lookup_calls: AtomicU32::new(0),
            trade_calls: AtomicU32::new(0),
        }
    }

    // ==================== 스크립트 주입 ====================

    /// 다음 지정가 제출 결과를 주입합니다 (FIFO).
    pub async fn script_limit_result(&self, result: ScriptedResult) {
        self.limit_results.lock().await.push_back(result);
    }

    /// 다음 시장가 제출 결과를 주입합니다 (FIFO).
    pub async fn script_market_result(&self, result: ScriptedResult) {
        self.market_results.lock().await.push_back(result);
    }

    /// 다음 취소 결과를 주입합니다 (FIFO).
    pub async fn script_cancel_result(&self, result: ScriptedResult) {
        self.cancel_results.lock().await.push_back(result);
    }

    /// 포지션 스냅샷을 설정합니다.
    pub async fn set_positions(&self, positions: Vec<PositionSnapshot>) {
        *self.positions.write().await = positions;
    }

    /// 주문 스냅샷을 직접 설정합니다 (`get_order` 조회 대상).
    pub async fn set_order_snapshot(&self, snapshot: ExchangeOrder) {
        self.orders
            .write()
            .await
            .insert(snapshot.client_order_id.clone(), snapshot);
    }

    /// 체결 내역을 직접 추가합니다.
    pub async fn push_trade(&self, fill: TradeFill) {
        self.trades.write().await.push(fill);
    }

    /// 저장된 주문 스냅샷을 체결 상태로 전이시키고 체결 내역을 기록합니다.
    ///
    /// 폴링 리컨실레이션 테스트에서 "거래소 측 체결"을 한 줄로 재현합니다.
    pub async fn mark_filled(
        &self,
        client_order_id: &str,
        qty: Decimal,
        avg_price: Decimal,
        commission: Decimal,
    ) {
        let mut orders = self.orders.write().await;
        if let Some(snapshot) = orders.get_mut(client_order_id) {
            snapshot.status = OrderStatus::Filled;
            snapshot.executed_qty = qty;
            snapshot.avg_price = avg_price;
            snapshot.update_time = Utc::now();

            self.trades.write().await.push(TradeFill {
                trade_id: self.next_trade_id.fetch_add(1, Ordering::SeqCst) as i64,
                order_ref_id: snapshot.ref_id.clone(),
                symbol: snapshot.symbol.clone(),
                price: avg_price,
                qty,
                commission,
                commission_asset: self.config.commission_asset.clone(),
                time: Utc::now(),
            });
        }
    }

    // ==================== 호출 횟수 ====================

    pub fn limit_call_count(&self) -> u32 {
        self.limit_calls.load(Ordering::SeqCst)
    }

    pub fn market_call_count(&self) -> u32 {
        self.market_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_call_count(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// 주문 관련 호출 총합 (제출/취소/조회/체결 조회).
    pub fn total_order_calls(&self) -> u32 {
        self.limit_call_count()
            + self.market_call_count()
            + self.cancel_call_count()
            + self.lookup_calls.load(Ordering::SeqCst)
            + self.trade_calls.load(Ordering::SeqCst)
    }

    // ==================== 내부 헬퍼 ====================

    fn next_ref_id(&self) -> String {
        self.next_ref_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn record_order(&self, order: &Order, ack: &OrderAck) {
        let snapshot = ExchangeOrder {
            ref_id: ack.ref_id.clone(),
            client_order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            status: ack.status,
            order_type: Some(order.order_type),
            side: Some(order.side),
            price: order.open_price,
            avg_price: if ack.status == OrderStatus::Filled {
                ack.price
            } else {
                Decimal::ZERO
            },
            stop_price: order.stop_price,
            executed_qty: ack.executed_qty,
            update_time: ack.transact_time,
        };
        self.orders.write().await.insert(order.id.clone(), snapshot);
    }

    fn accepted_ack(&self, order: &Order) -> OrderAck {
        OrderAck {
            ref_id: self.next_ref_id(),
            status: OrderStatus::New,
            price: order.open_price,
            executed_qty: Decimal::ZERO,
            transact_time: Utc::now(),
        }
    }

    fn filled_ack(&self, order: &Order) -> OrderAck {
        OrderAck {
            ref_id: self.next_ref_id(),
            status: OrderStatus::Filled,
            price: order.open_price,
            executed_qty: order.qty,
            transact_time: Utc::now(),
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn place_limit_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        self.limit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.limit_results.lock().await.pop_front() {
            return result;
        }
        let ack = self.accepted_ack(order);
        self.record_order(order, &ack).await;
        debug!(id = %order.id, ref_id = %ack.ref_id, "지정가 주문 수락 (mock)");
        Ok(ack)
    }

    async fn place_market_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.market_results.lock().await.pop_front() {
            return result;
        }
        let ack = self.filled_ack(order);
        self.record_order(order, &ack).await;
        if !ack.price.is_zero() {
            self.trades.write().await.push(TradeFill {
                trade_id: self.next_trade_id.fetch_add(1, Ordering::SeqCst) as i64,
                order_ref_id: ack.ref_id.clone(),
                symbol: order.symbol.clone(),
                price: ack.price,
                qty: order.qty,
                commission: ack.price * order.qty * self.config.commission_rate,
                commission_asset: self.config.commission_asset.clone(),
                time: Utc::now(),
            });
        }
        debug!(id = %order.id, ref_id = %ack.ref_id, "시장가 주문 체결 (mock)");
        Ok(ack)
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        client_order_id: &str,
        ref_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.cancel_results.lock().await.pop_front() {
            return result;
        }
        let mut orders = self.orders.write().await;
        if let Some(snapshot) = orders.get_mut(client_order_id) {
            snapshot.status = OrderStatus::Canceled;
            snapshot.update_time = Utc::now();
        }
        Ok(OrderAck {
            ref_id: ref_id.to_string(),
            status: OrderStatus::Canceled,
            price: Decimal::ZERO,
            executed_qty: Decimal::ZERO,
            transact_time: Utc::now(),
        })
    }

    async fn get_order(
        &self,
        _symbol: &str,
        client_order_id: &str,
        _ref_id: &str,
    ) -> Result<Option<ExchangeOrder>, ExchangeError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.orders.read().await.get(client_order_id).cloned())
    }

    async fn get_trades_list(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<TradeFill>, ExchangeError> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        let trades = self.trades.read().await;
        let mut matched: Vec<TradeFill> = trades
            .iter()
            .filter(|fill| fill.symbol == symbol)
            .cloned()
            .collect();
        // 최신순 최대 limit건
        matched.reverse();
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn get_account_info(&self) -> Result<AccountInfo, ExchangeError> {
        Ok(AccountInfo {
            total_balance: self.config.initial_balance,
            available_balance: self.config.initial_balance,
            unrealized_pnl: Decimal::ZERO,
            updated: Utc::now(),
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        Ok(self.positions.read().await.clone())
    }

    async fn start_user_data_stream(&self) -> Result<String, ExchangeError> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-token-{token}"))
    }

    async fn keepalive_user_data_stream(&self, _token: &str) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn stop_user_data_stream(&self, _token: &str) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn exchange_name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oms_core::{OrderType, PositionSide, Side};

    fn sample_order() -> Order {
        Order::new(
            "mock",
            "bot-1",
            "BTCUSDT",
            Side::Buy,
            PositionSide::Long,
            OrderType::Limit,
            dec!(1),
        )
        .with_price(dec!(100))
    }

    #[tokio::test]
    async fn test_default_accepts_and_records() {
        let exchange = MockExchange::default();
        let order = sample_order();

        let ack = exchange.place_limit_order(&order).await.unwrap();
        assert_eq!(ack.status, OrderStatus::New);
        assert!(!ack.ref_id.is_empty());

        let found = exchange
            .get_order("BTCUSDT", &order.id, &ack.ref_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.ref_id, ack.ref_id);
        assert_eq!(found.status, OrderStatus::New);
        assert_eq!(exchange.limit_call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_rejection_consumed_once() {
        let exchange = MockExchange::default();
        exchange
            .script_limit_result(Err(ExchangeError::rejected(-2021, "would trigger")))
            .await;

        let order = sample_order();
        let err = exchange.place_limit_order(&order).await.unwrap_err();
        assert!(err.is_would_trigger());

        // 스크립트 소진 후에는 기본 수락으로 복귀
        let ack = exchange.place_limit_order(&order).await.unwrap();
        assert_eq!(ack.status, OrderStatus::New);
        assert_eq!(exchange.limit_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mark_filled_produces_trade() {
        let exchange = MockExchange::default();
        let order = sample_order();
        exchange.place_limit_order(&order).await.unwrap();

        exchange
            .mark_filled(&order.id, dec!(1), dec!(100), dec!(0.4))
            .await;

        let found = exchange
            .get_order("BTCUSDT", &order.id, "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, OrderStatus::Filled);
        assert_eq!(found.avg_price, dec!(100));

        let fills = exchange.get_trades_list("BTCUSDT", 10).await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_ref_id, found.ref_id);
        assert_eq!(fills[0].commission, dec!(0.4));
    }

    #[tokio::test]
    async fn test_market_fill_records_commission() {
        let exchange = MockExchange::default();
        let mut order = sample_order();
        order.order_type = OrderType::Market;

        let ack = exchange.place_market_order(&order).await.unwrap();
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.executed_qty, dec!(1));

        let fills = exchange.get_trades_list("BTCUSDT", 10).await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].commission, dec!(100) * dec!(1) * dec!(0.0004));
    }

    #[tokio::test]
    async fn test_call_counters_track_everything() {
        let exchange = MockExchange::default();
        assert_eq!(exchange.total_order_calls(), 0);

        let order = sample_order();
        exchange.place_limit_order(&order).await.unwrap();
        exchange.cancel_order("BTCUSDT", &order.id, "").await.unwrap();
        exchange.get_order("BTCUSDT", &order.id, "").await.unwrap();
        exchange.get_trades_list("BTCUSDT", 10).await.unwrap();
        assert_eq!(exchange.total_order_calls(), 4);
    }
}
