//! 실현 손익 계산 성질 기반 테스트
//!
//! 무작위 가격/수량/수수료 조합으로 단위 테스트가 놓치는 경계를 확인합니다.

use proptest::prelude::*;
use rust_decimal::Decimal;

use oms_core::{realized_pnl, PositionSide};

/// 소수 자릿수를 바꿔 가며 양의 가격을 생성한다.
fn price() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64, 0u32..=4u32).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64, 0u32..=3u32).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn commission() -> impl Strategy<Value = Decimal> {
    (0i64..=1_000_000i64, 2u32..=6u32).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

proptest! {
    /// 같은 체결을 롱/숏으로 각각 계산하면 가격 손익은 상쇄되고 수수료 두 몫만 남는다.
    #[test]
    fn long_and_short_mirror_each_other(
        open in price(),
        close in price(),
        qty in quantity(),
        open_fee in commission(),
        close_fee in commission(),
    ) {
        let long = realized_pnl(PositionSide::Long, open, close, qty, open_fee, close_fee);
        let short = realized_pnl(PositionSide::Short, open, close, qty, open_fee, close_fee);

        prop_assert_eq!(long + short, -(open_fee + close_fee) * Decimal::TWO);
    }

    /// 진입가와 청산가가 같으면 손익은 수수료 합의 음수다.
    #[test]
    fn flat_close_costs_exactly_the_fees(
        entry in price(),
        qty in quantity(),
        open_fee in commission(),
        close_fee in commission(),
        side in side(),
    ) {
        let pl = realized_pnl(side, entry, entry, qty, open_fee, close_fee);

        prop_assert_eq!(pl, -(open_fee + close_fee));
    }

    /// 수수료가 늘어나면 어느 방향이든 손익이 커질 수 없다.
    #[test]
    fn extra_commission_never_improves_pnl(
        open in price(),
        close in price(),
        qty in quantity(),
        open_fee in commission(),
        close_fee in commission(),
        extra in commission(),
        side in side(),
    ) {
        let base = realized_pnl(side, open, close, qty, open_fee, close_fee);
        let bumped_open = realized_pnl(side, open, close, qty, open_fee + extra, close_fee);
        let bumped_close = realized_pnl(side, open, close, qty, open_fee, close_fee + extra);

        prop_assert!(bumped_open <= base);
        prop_assert!(bumped_close <= base);
    }

    /// 수량이 0이면 가격 구간과 무관하게 수수료만 남는다.
    #[test]
    fn zero_quantity_leaves_only_fees(
        open in price(),
        close in price(),
        open_fee in commission(),
        close_fee in commission(),
        side in side(),
    ) {
        let pl = realized_pnl(side, open, close, Decimal::ZERO, open_fee, close_fee);

        prop_assert_eq!(pl, -(open_fee + close_fee));
    }
}
