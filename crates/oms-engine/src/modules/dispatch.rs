//! 주문 디스패처.
//!
//! 의도 메일박스를 틱마다 한 번 확인해 내용물을 분류하고 거래소에 반영합니다.
//! 메일박스는 처리 결과와 무관하게 항상 비워지므로, 한 의도는 정확히 한 번의
//! 디스패치 시도를 받습니다. 재제출 여부는 프로듀서 몫입니다.
//!
//! 분류별 처리:
//! - 취소: 거래소 거절 여부와 무관하게 로컬 행을 종결
//! - 지정가 계열: 수락 시 `ref_id`/상태 기록, "즉시 체결됨" 거부는
//!   실패 카운터를 거쳐 시장가 격상으로 이어짐
//! - 시장가: 수락 즉시 체결 확정으로 기록 (청산이면 진입 시각으로 종결)
//! - 트리거-시장가: 조건부 주문이므로 수락 상태를 그대로 기록

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use oms_core::{
    classify_intent, ExchangeClient, ExchangeError, IntentKind, NoteRecord, NoteStage, Order,
    OrderAck, OrderPatch, OrderStatus, OrderStore, OrderType, SharedCache, REJECT_UNKNOWN_ORDER,
};
use oms_notification::NotificationEvent;

use crate::context::ServiceContext;
use crate::error::Result;
use crate::modules::{escalation, reconcile};
use crate::stats::DispatchStats;

// =============================================================================
// 디스패치 주기
// =============================================================================

/// 한 디스패치 틱을 수행합니다.
///
/// 메일박스가 비어 있으면 할 일이 없습니다. 내용물이 있으면 처리 후
/// 결과와 무관하게 메일박스를 비워 다음 의도가 들어올 수 있게 합니다.
pub async fn run_dispatch_cycle(ctx: &ServiceContext) -> Result<DispatchStats> {
    let started = std::time::Instant::now();
    let mut stats = DispatchStats::new();

    let exchange = ctx.config.exchange.as_str();
    let intent = match ctx.cache.peek_intent(exchange).await? {
        Some(intent) => intent,
        None => {
            stats.elapsed = started.elapsed();
            return Ok(stats);
        }
    };
    stats.claimed += 1;

    let outcome = dispatch_intent(ctx, &intent, &mut stats).await;

    // 메일박스는 성공/실패와 무관하게 비운다. 남겨두면 같은 의도가
    // 무한 반복되고 프로듀서는 슬롯을 영영 점유하지 못한다.
    ctx.cache.clear_intent(exchange).await?;

    outcome?;
    stats.elapsed = started.elapsed();
    Ok(stats)
}

async fn dispatch_intent(
    ctx: &ServiceContext,
    intent: &Order,
    stats: &mut DispatchStats,
) -> Result<()> {
    match classify_intent(intent) {
        IntentKind::Cancel => cancel_order(ctx, intent, stats).await,
        IntentKind::LimitFamily => submit_limit(ctx, intent, stats).await,
        IntentKind::Market => submit_market(ctx, intent, stats).await,
        IntentKind::TriggerMarket => submit_trigger_market(ctx, intent, stats).await,
    }
}

// =============================================================================
// 취소
// =============================================================================

/// 취소 의도 처리.
///
/// 거래소 호출이 거절되어도 (이미 체결/취소된 주문 등) 로컬 행은 반드시
/// 종결합니다. 실제 상태와 어긋난 경우는 리컨실레이션이 바로잡습니다.
async fn cancel_order(
    ctx: &ServiceContext,
    intent: &Order,
    stats: &mut DispatchStats,
) -> Result<()> {
    let confirmed = match ctx
        .exchange
        .cancel_order(&intent.symbol, &intent.id, &intent.ref_id)
        .await
    {
        Ok(ack) => {
            info!(order_id = %intent.id, ref_id = %ack.ref_id, "주문 취소 확인");
            true
        }
        Err(e) if e.reject_code() == Some(REJECT_UNKNOWN_ORDER) => {
            // 체결/만료 직후의 취소 경쟁. 거래소에 이미 없으므로 로컬만 종결
            debug!(order_id = %intent.id, "취소 대상이 거래소에 없음");
            false
        }
        Err(e) => {
            warn!(order_id = %intent.id, error = %e, "취소 실패, 로컬 종결로 처리");
            false
        }
    };

    let patch = OrderPatch::for_order(intent.id.as_str())
        .status(OrderStatus::Canceled)
        .closed_at(Utc::now());
    if !ctx.store.update_order(&patch).await? {
        warn!(order_id = %intent.id, "취소 반영 대상 행이 없습니다");
    }
    stats.canceled += 1;

    if confirmed {
        ctx.notify(NotificationEvent::OrderCanceled {
            symbol: intent.symbol.clone(),
            order_id: intent.id.clone(),
            reason: None,
        })
        .await;
    }
    Ok(())
}

// =============================================================================
// 지정가 계열
// =============================================================================

/// 지정가 계열 제출 (Limit/StopLossLimit/TakeProfitLimit).
async fn submit_limit(
    ctx: &ServiceContext,
    intent: &Order,
    stats: &mut DispatchStats,
) -> Result<()> {
    let threshold = ctx.config.escalation.threshold;
    let decision = escalation::should_force_market(ctx.cache.as_ref(), intent, threshold).await?;
    if decision.force_market {
        return escalate_to_market(ctx, intent, decision.attempts, stats).await;
    }

    match ctx.exchange.place_limit_order(intent).await {
        Ok(ack) => {
            persist_accepted(ctx, intent, &ack, stats).await?;
            escalation::clear_failures(ctx.cache.as_ref(), intent).await?;
            notify_submitted(ctx, intent).await;
            Ok(())
        }
        Err(e) if e.is_would_trigger() => {
            handle_would_trigger(ctx, intent, threshold, stats).await
        }
        Err(e) => handle_submit_failure(ctx, intent, e, stats).await,
    }
}

/// 트리거-시장가 보호 주문 제출 (Stop/TakeProfit).
///
/// 조건부 주문이므로 시장가와 달리 수락 상태를 그대로 기록합니다. 트리거
/// 가격이 이미 지나간 경우 지정가와 같은 "즉시 체결됨" 거부를 받습니다.
async fn submit_trigger_market(
    ctx: &ServiceContext,
    intent: &Order,
    stats: &mut DispatchStats,
) -> Result<()> {
    let threshold = ctx.config.escalation.threshold;
    let decision = escalation::should_force_market(ctx.cache.as_ref(), intent, threshold).await?;
    if decision.force_market {
        return escalate_to_market(ctx, intent, decision.attempts, stats).await;
    }

    match ctx.exchange.place_market_order(intent).await {
        Ok(ack) => {
            persist_accepted(ctx, intent, &ack, stats).await?;
            escalation::clear_failures(ctx.cache.as_ref(), intent).await?;
            notify_submitted(ctx, intent).await;
            Ok(())
        }
        Err(e) if e.is_would_trigger() => {
            handle_would_trigger(ctx, intent, threshold, stats).await
        }
        Err(e) => handle_submit_failure(ctx, intent, e, stats).await,
    }
}

/// "즉시 체결됨" 거부 처리. 카운터를 올리고, 임계치를 넘었으면 같은 틱에서
/// 곧바로 시장가로 격상합니다.
async fn handle_would_trigger(
    ctx: &ServiceContext,
    intent: &Order,
    threshold: u32,
    stats: &mut DispatchStats,
) -> Result<()> {
    let attempts = escalation::record_would_trigger(ctx.cache.as_ref(), intent).await?;
    if attempts > threshold {
        return escalate_to_market(ctx, intent, attempts, stats).await;
    }
    debug!(
        order_id = %intent.id,
        attempts,
        threshold,
        "즉시 체결 거부, 다음 시도로 연기"
    );
    stats.deferred += 1;
    Ok(())
}

/// 연속 "즉시 체결됨" 거부가 임계치를 넘긴 의도를 시장가로 격상합니다.
///
/// 원래 주문 종류의 실패 카운터는 시장가 결과와 무관하게 이 사건과 함께
/// 삭제됩니다.
async fn escalate_to_market(
    ctx: &ServiceContext,
    intent: &Order,
    attempts: u32,
    stats: &mut DispatchStats,
) -> Result<()> {
    warn!(
        order_id = %intent.id,
        order_type = intent.order_type.as_str(),
        attempts,
        "연속 거부 임계치 초과, 시장가로 격상"
    );

    let mut market_intent = intent.clone();
    market_intent.order_type = OrderType::Market;

    let outcome = submit_market(ctx, &market_intent, stats).await;

    if let Err(e) = escalation::clear_failures(ctx.cache.as_ref(), intent).await {
        warn!(order_id = %intent.id, error = %e, "격상 후 실패 카운터 삭제 실패");
    }
    stats.escalated += 1;

    ctx.notify(NotificationEvent::EscalatedToMarket {
        symbol: intent.symbol.clone(),
        order_type: intent.order_type.as_str().to_string(),
        attempts,
    })
    .await;

    outcome
}

// =============================================================================
// 시장가
// =============================================================================

/// 시장가 주문 제출.
///
/// 수락은 곧 체결이므로 상태를 `Filled`로 고정해 기록합니다. 승인 응답에
/// 가격이 없으면 캐시된 마크 가격으로 보정합니다. 청산 주문은 진입 시각을
/// 종결 시각으로 사용해 보유 구간 계산에서 제외됩니다.
async fn submit_market(
    ctx: &ServiceContext,
    intent: &Order,
    stats: &mut DispatchStats,
) -> Result<()> {
    let ack = match ctx.exchange.place_market_order(intent).await {
        Ok(ack) => ack,
        Err(e) => return handle_submit_failure(ctx, intent, e, stats).await,
    };

    let fill_price = resolve_fill_price(ctx, intent, &ack).await;
    let is_closing = intent.open_order_id.is_some();

    let mut order = intent.clone();
    order.ref_id = ack.ref_id.clone();
    order.status = OrderStatus::Filled;
    order.update_time = Utc::now();
    if is_closing {
        order.close_price = fill_price;
        order.close_time = Some(order.open_time);
    } else {
        order.open_price = fill_price;
    }

    persist_new_order(ctx, &order).await?;
    stats.submitted += 1;
    info!(
        order_id = %order.id,
        ref_id = %order.ref_id,
        price = %fill_price,
        closing = is_closing,
        "시장가 주문 체결 기록"
    );

    ctx.notify(NotificationEvent::OrderFilled {
        symbol: order.symbol.clone(),
        side: order.side.as_str().to_string(),
        qty: order.qty,
        price: fill_price,
        order_id: order.id.clone(),
    })
    .await;

    if is_closing {
        // 진입 주문 역방향 링크는 체결 내역(수수료 포함)이 필요하다.
        // 아직 전파 전이면 스트림/폴링 경로가 마저 처리한다.
        if let Err(e) = reconcile::link_recent_fill(ctx, &order).await {
            debug!(order_id = %order.id, error = %e, "체결 내역 즉시 연결 실패");
        }
    }
    Ok(())
}

/// 체결 가격 결정. 승인 가격 → 캐시된 마크 가격 → 의도 가격 순으로 보정.
async fn resolve_fill_price(ctx: &ServiceContext, intent: &Order, ack: &OrderAck) -> Decimal {
    if !ack.price.is_zero() {
        return ack.price;
    }
    match ctx.cache.mark_price(&intent.exchange, &intent.symbol).await {
        Ok(Some(price)) => price,
        Ok(None) => intent.open_price,
        Err(e) => {
            warn!(symbol = %intent.symbol, error = %e, "마크 가격 조회 실패");
            intent.open_price
        }
    }
}

// =============================================================================
// 실패 처리
// =============================================================================

/// 제출 실패 분류.
///
/// 거부는 로컬 포기로 종결하고, 일시적 에러는 다음 틱의 재제출에 맡깁니다.
/// 인증 실패만 주기 밖으로 전파합니다.
async fn handle_submit_failure(
    ctx: &ServiceContext,
    intent: &Order,
    error: ExchangeError,
    stats: &mut DispatchStats,
) -> Result<()> {
    if let ExchangeError::Rejected { code, message } = &error {
        return abandon_intent(ctx, intent, *code, message, stats).await;
    }
    if error.is_retryable() {
        warn!(order_id = %intent.id, error = %error, "일시적 제출 실패, 다음 틱에 재시도");
        stats.deferred += 1;
        return Ok(());
    }
    if error.is_fatal() {
        stats.errors += 1;
        return Err(error.into());
    }
    warn!(order_id = %intent.id, error = %error, "주문 제출 실패");
    stats.errors += 1;
    Ok(())
}

/// 재시도 불가 거부를 받은 의도를 로컬에서 종결합니다.
///
/// 청산 의도였다면 해당 포지션이 보호 주문 없이 남으므로 별도로 경고합니다.
async fn abandon_intent(
    ctx: &ServiceContext,
    intent: &Order,
    code: i64,
    message: &str,
    stats: &mut DispatchStats,
) -> Result<()> {
    let closing = intent.is_closing_order();
    warn!(
        order_id = %intent.id,
        code,
        message,
        closing,
        "주문 거부, 로컬 종결"
    );
    if closing {
        warn!(
            symbol = %intent.symbol,
            position_side = intent.position_side.as_str(),
            "청산 주문 포기로 포지션이 보호 주문 없이 남았습니다"
        );
    }

    let note =
        NoteRecord::new(intent.bot_id.as_str(), NoteStage::Dispatch, message).with_code(code);
    let now = Utc::now();

    let mut order = intent.clone();
    order.status = OrderStatus::Rejected;
    order.close_time = Some(now);
    order.update_time = now;
    order.note = Some(note.to_json());

    if !ctx.store.create_order(&order).await? {
        // 재제출 의도라 행이 이미 있으면 갱신으로 종결한다
        let patch = OrderPatch::for_order(order.id.as_str())
            .status(OrderStatus::Rejected)
            .closed_at(now)
            .note(note.to_json());
        if !ctx.store.update_order(&patch).await? {
            warn!(order_id = %order.id, "포기 반영 대상 행이 없습니다");
        }
    }

    escalation::clear_failures(ctx.cache.as_ref(), intent).await?;
    stats.abandoned += 1;

    ctx.notify(NotificationEvent::OrderAbandoned {
        symbol: intent.symbol.clone(),
        order_id: intent.id.clone(),
        code,
        message: message.to_string(),
    })
    .await;
    Ok(())
}

// =============================================================================
// 저장 헬퍼
// =============================================================================

/// 거래소가 수락한 주문을 저장소에 기록합니다.
async fn persist_accepted(
    ctx: &ServiceContext,
    intent: &Order,
    ack: &OrderAck,
    stats: &mut DispatchStats,
) -> Result<()> {
    let mut order = intent.clone();
    order.ref_id = ack.ref_id.clone();
    order.status = ack.status;
    order.update_time = Utc::now();

    persist_new_order(ctx, &order).await?;
    stats.submitted += 1;
    info!(
        order_id = %order.id,
        ref_id = %order.ref_id,
        order_type = order.order_type.as_str(),
        status = order.status.as_str(),
        "주문 접수"
    );
    Ok(())
}

/// 주문 행 삽입. 같은 클라이언트 ID의 행이 이미 있으면 (재제출 의도)
/// 수락 결과만 덧대어 갱신합니다.
async fn persist_new_order(ctx: &ServiceContext, order: &Order) -> Result<()> {
    if ctx.store.create_order(order).await? {
        return Ok(());
    }

    let mut patch = OrderPatch::for_order(order.id.as_str())
        .ref_id(order.ref_id.as_str())
        .status(order.status);
    if let Some(closed) = order.close_time {
        patch = patch.close_price(order.close_price).closed_at(closed);
    } else if !order.open_price.is_zero() {
        patch = patch.open_price(order.open_price);
    }
    if !ctx.store.update_order(&patch).await? {
        warn!(order_id = %order.id, "주문 기록 대상 행이 없습니다");
    }
    Ok(())
}

async fn notify_submitted(ctx: &ServiceContext, intent: &Order) {
    let price = if intent.open_price.is_zero() {
        intent.stop_price
    } else {
        intent.open_price
    };
    ctx.notify(NotificationEvent::OrderSubmitted {
        symbol: intent.symbol.clone(),
        side: intent.side.as_str().to_string(),
        order_type: intent.order_type.as_str().to_string(),
        qty: intent.qty,
        price,
        order_id: intent.id.clone(),
    })
    .await;
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{context, TestContext};
    use oms_core::{PositionSide, Side, REJECT_INSUFFICIENT_MARGIN};
    use rust_decimal_macros::dec;

    fn limit_intent() -> Order {
        Order::new(
            "mock",
            "bot-a",
            "BTCUSDT",
            Side::Buy,
            PositionSide::Long,
            OrderType::Limit,
            dec!(1),
        )
        .with_price(dec!(42000))
    }

    async fn claim_and_dispatch(tc: &TestContext, intent: &Order) -> DispatchStats {
        assert!(tc.cache.claim_intent("mock", intent).await.unwrap());
        run_dispatch_cycle(&tc.ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_sixth_would_trigger_rejection_escalates_to_market() {
        let tc = context();
        let intent = limit_intent();

        // 지정가 제출 6번이 전부 "즉시 체결됨"으로 거부되도록 스크립트
        for _ in 0..6 {
            tc.exchange
                .script_limit_result(Err(ExchangeError::rejected(
                    -2021,
                    "Order would immediately trigger.",
                )))
                .await;
        }

        // 1~5번째 거부까지는 연기만 된다
        for attempt in 1..=5u32 {
            let stats = claim_and_dispatch(&tc, &intent).await;
            assert_eq!(stats.deferred, 1, "attempt {}", attempt);
            assert_eq!(stats.escalated, 0);
            assert_eq!(tc.exchange.market_call_count(), 0);
            assert_eq!(
                tc.cache
                    .get_failure("mock", "bot-a", "BTCUSDT", OrderType::Limit)
                    .await
                    .unwrap(),
                attempt
            );
            // 메일박스는 매 주기 비워진다
            assert!(tc.cache.peek_intent("mock").await.unwrap().is_none());
        }

        // 6번째 시도: 지정가가 다시 거부되고, 같은 틱에서 시장가가 나간다
        let stats = claim_and_dispatch(&tc, &intent).await;
        assert_eq!(stats.escalated, 1);
        assert_eq!(tc.exchange.limit_call_count(), 6);
        assert_eq!(tc.exchange.market_call_count(), 1);

        // 시장가 결과와 무관하게 카운터는 삭제된다
        assert_eq!(
            tc.cache
                .get_failure("mock", "bot-a", "BTCUSDT", OrderType::Limit)
                .await
                .unwrap(),
            0
        );

        // 격상된 주문은 체결 확정으로 기록된다
        let stored = tc.store.get_order(&intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert_eq!(stored.order_type, OrderType::Market);
    }

    #[tokio::test]
    async fn test_escalation_clears_counter_even_when_market_rejected() {
        let tc = context();
        let intent = limit_intent();

        for _ in 0..6 {
            tc.exchange
                .script_limit_result(Err(ExchangeError::rejected(
                    -2021,
                    "Order would immediately trigger.",
                )))
                .await;
        }
        // 격상된 시장가마저 거부
        tc.exchange
            .script_market_result(Err(ExchangeError::rejected(
                -2019,
                "Margin is insufficient.",
            )))
            .await;

        for _ in 0..5 {
            claim_and_dispatch(&tc, &intent).await;
        }
        let stats = claim_and_dispatch(&tc, &intent).await;
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.abandoned, 1);

        assert_eq!(
            tc.cache
                .get_failure("mock", "bot-a", "BTCUSDT", OrderType::Limit)
                .await
                .unwrap(),
            0
        );

        // 시장가 거부는 로컬 포기로 종결된다
        let stored = tc.store.get_order(&intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Rejected);
        assert!(stored.close_time.is_some());
    }

    #[tokio::test]
    async fn test_accepted_limit_persists_ref_id_and_clears_counter() {
        let tc = context();
        let intent = limit_intent();

        // 직전 틱의 거부가 카운터에 남아 있는 상황
        tc.cache
            .incr_failure("mock", "bot-a", "BTCUSDT", OrderType::Limit)
            .await
            .unwrap();

        let stats = claim_and_dispatch(&tc, &intent).await;
        assert_eq!(stats.submitted, 1);

        let stored = tc.store.get_order(&intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert!(!stored.ref_id.is_empty());

        assert_eq!(
            tc.cache
                .get_failure("mock", "bot-a", "BTCUSDT", OrderType::Limit)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_cancel_terminates_locally_even_when_exchange_rejects() {
        let tc = context();

        let mut order = limit_intent();
        order.ref_id = "900".to_string();
        assert!(tc.store.create_order(&order).await.unwrap());

        // 이미 체결된 주문을 취소하려는 상황 (거래소에는 기록 없음)
        tc.exchange
            .script_cancel_result(Err(ExchangeError::rejected(
                REJECT_UNKNOWN_ORDER,
                "Unknown order sent.",
            )))
            .await;

        let mut cancel = order.clone();
        cancel.status = OrderStatus::Canceled;
        let stats = claim_and_dispatch(&tc, &cancel).await;
        assert_eq!(stats.canceled, 1);
        assert_eq!(tc.exchange.cancel_call_count(), 1);

        // 거절됐어도 로컬 행은 반드시 종결된다
        let stored = tc.store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Canceled);
        assert!(stored.close_time.is_some());
    }

    #[tokio::test]
    async fn test_terminal_rejection_abandons_with_note() {
        let tc = context();
        let intent = limit_intent();

        tc.exchange
            .script_limit_result(Err(ExchangeError::rejected(
                REJECT_INSUFFICIENT_MARGIN,
                "Margin is insufficient.",
            )))
            .await;

        let stats = claim_and_dispatch(&tc, &intent).await;
        assert_eq!(stats.abandoned, 1);

        let stored = tc.store.get_order(&intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Rejected);
        assert!(stored.close_time.is_some());
        let note = stored.note.unwrap();
        assert!(note.contains("-2019"));
        assert!(note.contains("dispatch"));
    }

    #[tokio::test]
    async fn test_transient_failure_defers_without_local_row() {
        let tc = context();
        let intent = limit_intent();

        tc.exchange
            .script_limit_result(Err(ExchangeError::Network("connection reset".to_string())))
            .await;

        let stats = claim_and_dispatch(&tc, &intent).await;
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.abandoned, 0);

        // 일시 실패는 행을 만들지 않는다. 재제출은 프로듀서 몫.
        assert!(tc.store.get_order(&intent.id).await.unwrap().is_none());
        assert!(tc.cache.peek_intent("mock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_market_close_backdates_close_time_and_backfills_price() {
        let tc = context();

        // 체결된 진입 주문
        let mut opener = limit_intent();
        opener.status = OrderStatus::Filled;
        opener.open_price = dec!(42000);
        opener.commission = dec!(0.4);
        assert!(tc.store.create_order(&opener).await.unwrap());

        // 가격 없는 시장가 청산 의도, 마크 가격은 캐시에만 있음
        tc.cache
            .set_mark_price("mock", "BTCUSDT", dec!(43000), None)
            .await
            .unwrap();
        let close_intent = Order::new(
            "mock",
            "bot-a",
            "BTCUSDT",
            Side::Sell,
            PositionSide::Long,
            OrderType::Market,
            dec!(1),
        )
        .closing(opener.id.as_str());

        let stats = claim_and_dispatch(&tc, &close_intent).await;
        assert_eq!(stats.submitted, 1);

        let stored = tc.store.get_order(&close_intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert_eq!(stored.close_price, dec!(43000));
        // 청산 주문은 보유 구간을 만들지 않도록 진입 시각으로 종결된다
        assert_eq!(stored.close_time, Some(stored.open_time));
    }

    #[tokio::test]
    async fn test_trigger_market_keeps_ack_status() {
        let tc = context();

        let intent = Order::new(
            "mock",
            "bot-a",
            "BTCUSDT",
            Side::Sell,
            PositionSide::Long,
            OrderType::Stop,
            dec!(1),
        )
        .with_stop_price(dec!(41000));

        // 조건부 주문은 체결이 아니라 대기 상태로 수락된다
        tc.exchange
            .script_market_result(Ok(OrderAck {
                ref_id: "9100".to_string(),
                status: OrderStatus::New,
                price: Decimal::ZERO,
                executed_qty: Decimal::ZERO,
                transact_time: Utc::now(),
            }))
            .await;

        let stats = claim_and_dispatch(&tc, &intent).await;
        assert_eq!(stats.submitted, 1);

        // 시장가와 달리 Filled로 강제되지 않는다
        let stored = tc.store.get_order(&intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert_eq!(stored.ref_id, "9100");
    }
}
