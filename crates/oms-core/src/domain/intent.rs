//! 주문 의도와 프로듀서 계약.
//!
//! 시그널 프로듀서는 엔진 외부에 살지만, 메일박스에 쓰는 페이로드와
//! 프로듀서가 구현해야 하는 계약은 여기서 정의합니다. 의도는 아직 제출되지
//! 않은 `Order` 값 자체이며, 디스패처는 그 모양으로 처리 분기를 결정합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::exchange::PositionSnapshot;
use super::order::{Order, OrderStatus, OrderType};

/// 디스패처가 인식하는 의도 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    /// 기존 거래소 주문 취소 (`status == Canceled`, `ref_id` 보유)
    Cancel,
    /// 지정가 계열 제출 (Limit/StopLossLimit/TakeProfitLimit)
    LimitFamily,
    /// 즉시 시장가 제출 (`type == Market`)
    Market,
    /// 트리거-시장가 보호 주문 제출 (Stop/TakeProfit)
    TriggerMarket,
}

/// 의도 `Order`의 모양에서 처리 분기를 결정합니다.
///
/// 취소 의도가 가장 먼저 판별됩니다. 프로듀서는 기존 주문의 사본에
/// `status = Canceled`를 실어 취소를 요청합니다.
pub fn classify_intent(intent: &Order) -> IntentKind {
    if intent.status == OrderStatus::Canceled && !intent.ref_id.is_empty() {
        return IntentKind::Cancel;
    }
    match intent.order_type {
        OrderType::Market => IntentKind::Market,
        OrderType::Stop | OrderType::TakeProfit => IntentKind::TriggerMarket,
        _ => IntentKind::LimitFamily,
    }
}

/// 프로듀서가 의사결정에 사용하는 시장 상태 묶음.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub symbol: String,
    pub mark_price: Decimal,
    /// 캐시된 현재 포지션 (없으면 무포지션)
    pub position: Option<PositionSnapshot>,
    /// 해당 심볼의 열린 주문 수
    pub open_order_count: usize,
}

/// 시그널 프로듀서 계약.
///
/// 각 전략은 이 trait의 작은 구현체로 등록되고, 드라이버가 심볼마다
/// 순회 호출합니다. 의도 생성 여부만 결정하며, 제출·재시도·정합성은 모두
/// 엔진 몫입니다. 반환한 의도는 메일박스 점유에 성공했을 때만 전달됩니다.
#[async_trait]
pub trait IntentProducer: Send + Sync {
    /// 프로듀서 식별자. 생성한 의도의 `bot_id`와 일치해야 합니다.
    fn producer_id(&self) -> &str;

    /// 현재 시장 상태를 평가해 제출할 의도를 결정합니다.
    ///
    /// `None`은 "이번 틱은 할 일 없음"을 뜻하며 오류가 아닙니다.
    async fn evaluate(&self, symbol: &str, market: &MarketState) -> Option<Order>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{PositionSide, Side};
    use rust_decimal_macros::dec;

    fn base_order(order_type: OrderType) -> Order {
        Order::new(
            "binance",
            "bot-a",
            "BTCUSDT",
            Side::Buy,
            PositionSide::Long,
            order_type,
            dec!(1),
        )
    }

    #[test]
    fn test_classify_limit_family() {
        assert_eq!(
            classify_intent(&base_order(OrderType::Limit)),
            IntentKind::LimitFamily
        );
        assert_eq!(
            classify_intent(&base_order(OrderType::StopLossLimit)),
            IntentKind::LimitFamily
        );
        assert_eq!(
            classify_intent(&base_order(OrderType::TakeProfitLimit)),
            IntentKind::LimitFamily
        );
    }

    #[test]
    fn test_classify_market_and_trigger() {
        assert_eq!(
            classify_intent(&base_order(OrderType::Market)),
            IntentKind::Market
        );
        assert_eq!(
            classify_intent(&base_order(OrderType::Stop)),
            IntentKind::TriggerMarket
        );
        assert_eq!(
            classify_intent(&base_order(OrderType::TakeProfit)),
            IntentKind::TriggerMarket
        );
    }

    #[test]
    fn test_classify_cancel_requires_ref_id() {
        let mut intent = base_order(OrderType::Limit);
        intent.status = OrderStatus::Canceled;
        // ref_id 없는 취소는 아직 거래소에 없는 주문이므로 일반 분기로 처리
        assert_eq!(classify_intent(&intent), IntentKind::LimitFamily);

        intent.ref_id = "42".to_string();
        assert_eq!(classify_intent(&intent), IntentKind::Cancel);
    }

    /// 보호 주문 없는 포지션에 스탑을 붙이는 예시 프로듀서.
    struct ProtectiveStopProducer;

    #[async_trait]
    impl IntentProducer for ProtectiveStopProducer {
        fn producer_id(&self) -> &str {
            "bot-a"
        }

        async fn evaluate(&self, symbol: &str, market: &MarketState) -> Option<Order> {
            let position = market.position.as_ref()?;
            if market.open_order_count > 0 {
                return None;
            }
            Some(
                Order::new(
                    "binance",
                    self.producer_id(),
                    symbol,
                    Side::Sell,
                    position.position_side,
                    OrderType::Stop,
                    position.amount,
                )
                .with_stop_price(market.mark_price * dec!(0.95)),
            )
        }
    }

    #[tokio::test]
    async fn test_producer_emits_intent_only_without_open_orders() {
        let producer = ProtectiveStopProducer;
        let mut market = MarketState {
            symbol: "BTCUSDT".to_string(),
            mark_price: dec!(42000),
            position: Some(PositionSnapshot {
                symbol: "BTCUSDT".to_string(),
                position_side: PositionSide::Long,
                amount: dec!(1.5),
                entry_price: dec!(40000),
                mark_price: dec!(42000),
                updated: chrono::Utc::now(),
            }),
            open_order_count: 0,
        };

        let intent = producer.evaluate("BTCUSDT", &market).await.unwrap();
        assert_eq!(intent.bot_id, producer.producer_id());
        assert_eq!(intent.qty, dec!(1.5));
        assert_eq!(classify_intent(&intent), IntentKind::TriggerMarket);

        // 이미 열린 주문이 있으면 이번 틱은 건너뜀
        market.open_order_count = 1;
        assert!(producer.evaluate("BTCUSDT", &market).await.is_none());
    }
}
