//! 재시도 격상 판정.
//!
//! 지정가 계열 주문이 `-2021`(즉시 체결) 거부를 반복하면 공유 캐시의
//! (심볼, 주문 유형) 실패 카운터가 올라가고, 임계치를 초과한 다음 시도는
//! 시장가로 격상됩니다. 카운터는 성공 또는 최종 실패 시 삭제되므로,
//! 격상 여부는 거부의 연속성만 반영합니다.

use oms_core::{Order, SharedCache};

use crate::error::Result;

/// 격상 판정 결과
#[derive(Debug, Clone, Copy)]
pub struct EscalationDecision {
    /// 시장가로 격상해야 하면 true
    pub force_market: bool,
    /// 현재까지 기록된 거부 횟수
    pub attempts: u32,
}

/// 현재 실패 횟수를 조회해 격상 여부를 판정합니다.
///
/// 임계치 `threshold`는 허용 재시도 횟수입니다. 카운터가 임계치를
/// "초과"했을 때만 격상하므로, threshold=5면 6번째 시도부터 시장가입니다.
pub async fn should_force_market(
    cache: &dyn SharedCache,
    order: &Order,
    threshold: u32,
) -> Result<EscalationDecision> {
    let attempts = cache
        .get_failure(&order.exchange, &order.bot_id, &order.symbol, order.order_type)
        .await?;
    Ok(EscalationDecision {
        force_market: attempts > threshold,
        attempts,
    })
}

/// 즉시 체결 거부를 기록합니다. 증가 후 카운터 값을 반환합니다.
pub async fn record_would_trigger(cache: &dyn SharedCache, order: &Order) -> Result<u32> {
    let count = cache
        .incr_failure(&order.exchange, &order.bot_id, &order.symbol, order.order_type)
        .await?;
    Ok(count)
}

/// 실패 카운터 삭제. 제출 성공과 최종 실패(포기, 격상) 양쪽에서 호출됩니다.
pub async fn clear_failures(cache: &dyn SharedCache, order: &Order) -> Result<()> {
    cache
        .clear_failure(&order.exchange, &order.bot_id, &order.symbol, order.order_type)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oms_core::{OrderType, PositionSide, Side};
    use oms_store::MemoryCache;
    use rust_decimal_macros::dec;

    fn limit_order() -> Order {
        Order::new(
            "binance",
            "bot-a",
            "BTCUSDT",
            Side::Buy,
            PositionSide::Long,
            OrderType::Limit,
            dec!(1),
        )
        .with_price(dec!(50000))
    }

    #[tokio::test]
    async fn test_escalates_only_above_threshold() {
        let cache = MemoryCache::new();
        let order = limit_order();

        // 임계치까지는 지정가 유지
        for expected in 1..=5u32 {
            let count = record_would_trigger(&cache, &order).await.unwrap();
            assert_eq!(count, expected);
        }
        let decision = should_force_market(&cache, &order, 5).await.unwrap();
        assert!(!decision.force_market);
        assert_eq!(decision.attempts, 5);

        // 6번째 거부 이후 격상
        record_would_trigger(&cache, &order).await.unwrap();
        let decision = should_force_market(&cache, &order, 5).await.unwrap();
        assert!(decision.force_market);
        assert_eq!(decision.attempts, 6);
    }

    #[tokio::test]
    async fn test_clear_resets_counter() {
        let cache = MemoryCache::new();
        let order = limit_order();

        record_would_trigger(&cache, &order).await.unwrap();
        record_would_trigger(&cache, &order).await.unwrap();
        clear_failures(&cache, &order).await.unwrap();

        let decision = should_force_market(&cache, &order, 1).await.unwrap();
        assert_eq!(decision.attempts, 0);
        assert!(!decision.force_market);
    }

    #[tokio::test]
    async fn test_counter_is_scoped_per_symbol_and_type() {
        let cache = MemoryCache::new();
        let limit = limit_order();
        let mut stop = limit_order();
        stop.order_type = OrderType::StopLossLimit;

        record_would_trigger(&cache, &limit).await.unwrap();
        record_would_trigger(&cache, &limit).await.unwrap();

        // 같은 심볼이라도 주문 유형이 다르면 독립 카운터
        let decision = should_force_market(&cache, &stop, 1).await.unwrap();
        assert_eq!(decision.attempts, 0);
    }
}
