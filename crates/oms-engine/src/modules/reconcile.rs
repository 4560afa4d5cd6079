//! 주문 정합성 동기화.
//!
//! 진실은 거래소에 있습니다. 폴링 경로는 `New` 상태의 주문을 틱마다
//! 거래소 스냅샷과 대조하고, 푸시 경로는 스트림 이벤트를 도착 즉시
//! 반영합니다. 두 경로가 같은 수렴 규칙 (`sync_order_status`,
//! `finalize_fill`)을 공유하므로 어느 쪽이 먼저 와도, 두 번 와도 결과가
//! 같습니다.
//!
//! 체결 연결은 `commission == 0` 센티널로만 판단합니다. 수수료가 기록된
//! 주문은 이미 연결이 끝난 것이므로 건드리지 않습니다.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use oms_core::{
    realized_pnl, ExchangeClient, Order, OrderPatch, OrderStatus, OrderStore, OrderUpdateEvent,
    SharedCache, SiblingQuery,
};
use oms_notification::NotificationEvent;

use crate::context::ServiceContext;
use crate::error::Result;
use crate::stats::ReconcileStats;

/// 수수료 환산 기준 호가 자산.
const QUOTE_ASSET: &str = "USDT";

// =============================================================================
// 폴링 경로
// =============================================================================

/// 한 리컨실레이션 틱을 수행합니다.
///
/// `New` 상태의 열린 주문 전체를 조회 대상으로 삼습니다. 개별 주문의 실패는
/// 기록만 하고 나머지 주문을 계속 처리합니다.
pub async fn run_reconcile_cycle(ctx: &ServiceContext) -> Result<ReconcileStats> {
    let started = std::time::Instant::now();
    let mut stats = ReconcileStats::new();

    let orders = ctx.store.get_new_orders(&ctx.config.exchange, None).await?;
    stats.scanned = orders.len();

    for order in &orders {
        if let Err(e) = reconcile_order(ctx, order, &mut stats).await {
            warn!(order_id = %order.id, error = %e, "주문 동기화 실패");
            stats.errors += 1;
        }
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}

/// 단일 주문을 거래소 스냅샷과 대조합니다.
async fn reconcile_order(
    ctx: &ServiceContext,
    order: &Order,
    stats: &mut ReconcileStats,
) -> Result<()> {
    let remote = match ctx
        .exchange
        .get_order(&order.symbol, &order.id, &order.ref_id)
        .await?
    {
        Some(remote) => remote,
        None => {
            // 거래소에 기록이 없으면 이번 틱은 넘어간다. 계속 없으면
            // 스위퍼가 고아로 정리한다.
            debug!(order_id = %order.id, "거래소에 주문 기록 없음");
            stats.missing += 1;
            return Ok(());
        }
    };

    if sync_order_status(ctx, order, remote.status).await? {
        stats.synced += 1;
        if remote.status == OrderStatus::Filled {
            stats.filled += 1;
        }
    }

    if remote.status == OrderStatus::Filled
        && order.fill_unlinked()
        && link_recent_fill(ctx, order).await?
    {
        stats.linked += 1;
        if order.open_order_id.is_some() {
            stats.closed += 1;
        }
    }
    Ok(())
}

// =============================================================================
// 푸시 경로
// =============================================================================

/// 스트림 주문 이벤트를 로컬 행에 반영합니다.
///
/// 로컬에 없는 주문 (다른 프로세스의 주문 등)은 조용히 무시합니다. 체결
/// 연결은 폴링 경로와 같은 기준 (최종 체결 상태 + 수수료 센티널)을 따릅니다.
pub async fn handle_stream_event(ctx: &ServiceContext, event: &OrderUpdateEvent) -> Result<()> {
    let order = match ctx.store.get_order(&event.client_order_id).await? {
        Some(order) => order,
        None => {
            debug!(client_order_id = %event.client_order_id, "로컬에 없는 주문 이벤트, 무시");
            return Ok(());
        }
    };

    sync_order_status(ctx, &order, event.status).await?;

    if event.status == OrderStatus::Filled && order.fill_unlinked() && event.has_fill() {
        finalize_fill(
            ctx,
            &order,
            event.avg_price,
            event.commission,
            event.commission_asset.clone(),
        )
        .await?;
    }
    Ok(())
}

// =============================================================================
// 상태 수렴
// =============================================================================

/// 로컬 상태를 거래소 상태로 수렴시킵니다. 같은 상태면 아무것도 하지
/// 않으므로 몇 번을 호출해도 결과가 같습니다.
///
/// 취소류 상태 (Canceled/Expired/Rejected)는 행 종결을 겸합니다. 반환값은
/// 전이 발생 여부입니다.
async fn sync_order_status(
    ctx: &ServiceContext,
    order: &Order,
    new_status: OrderStatus,
) -> Result<bool> {
    if order.status == new_status {
        return Ok(false);
    }

    let mut patch = OrderPatch::for_order(order.id.as_str()).status(new_status);
    if new_status.is_cancel_like() && order.close_time.is_none() {
        patch = patch.closed_at(Utc::now());
    }
    if !ctx.store.update_order(&patch).await? {
        warn!(order_id = %order.id, "상태 동기화 대상 행이 없습니다");
        return Ok(false);
    }

    info!(
        order_id = %order.id,
        from = order.status.as_str(),
        to = new_status.as_str(),
        "주문 상태 전이"
    );

    if new_status.is_cancel_like() {
        ctx.notify(NotificationEvent::OrderCanceled {
            symbol: order.symbol.clone(),
            order_id: order.id.clone(),
            reason: Some(new_status.as_str().to_string()),
        })
        .await;
    }
    Ok(true)
}

// =============================================================================
// 체결 연결
// =============================================================================

/// 최근 체결 내역에서 이 주문의 체결을 찾아 연결합니다.
///
/// 체결 내역이 아직 전파되지 않았으면 조용히 물러나고, 다음 경로 (다음 틱
/// 또는 스트림 이벤트)가 다시 시도합니다. 여러 건으로 나뉜 체결은 수량
/// 가중 평균 가격과 수수료 합으로 합칩니다.
pub(crate) async fn link_recent_fill(ctx: &ServiceContext, order: &Order) -> Result<bool> {
    if !order.fill_unlinked() || order.ref_id.is_empty() {
        return Ok(false);
    }

    let limit = ctx.config.reconcile.trade_fetch_limit;
    let trades = ctx.exchange.get_trades_list(&order.symbol, limit).await?;
    let matched: Vec<_> = trades
        .iter()
        .filter(|fill| fill.order_ref_id == order.ref_id)
        .collect();
    if matched.is_empty() {
        debug!(order_id = %order.id, ref_id = %order.ref_id, "체결 내역 미도착");
        return Ok(false);
    }

    let total_qty: Decimal = matched.iter().map(|fill| fill.qty).sum();
    let commission: Decimal = matched.iter().map(|fill| fill.commission).sum();
    let fill_price = if total_qty.is_zero() {
        matched[0].price
    } else {
        matched.iter().map(|fill| fill.price * fill.qty).sum::<Decimal>() / total_qty
    };

    finalize_fill(
        ctx,
        order,
        fill_price,
        commission,
        Some(matched[0].commission_asset.clone()),
    )
    .await?;
    Ok(true)
}

/// 체결 확정.
///
/// 수수료를 기록해 센티널을 닫고, 가격을 보정하고, 청산 주문이면 진입 주문
/// 역방향 링크까지 잇습니다. 이미 연결된 주문 (`commission != 0`)은
/// 건드리지 않습니다.
async fn finalize_fill(
    ctx: &ServiceContext,
    order: &Order,
    fill_price: Decimal,
    commission: Decimal,
    commission_asset: Option<String>,
) -> Result<()> {
    if !order.fill_unlinked() {
        return Ok(());
    }

    let (commission, commission_asset) = quote_commission(ctx, commission, commission_asset).await;
    let is_closing = order.open_order_id.is_some();

    let resolved_price = if !fill_price.is_zero() {
        fill_price
    } else {
        match ctx.cache.mark_price(&order.exchange, &order.symbol).await {
            Ok(Some(price)) => price,
            _ => {
                if is_closing {
                    order.close_price
                } else {
                    order.open_price
                }
            }
        }
    };

    let mut patch = OrderPatch::for_order(order.id.as_str())
        .status(OrderStatus::Filled)
        .commission(commission, commission_asset);
    if is_closing {
        patch = patch.close_price(resolved_price);
        if order.close_time.is_none() {
            patch = patch.closed_at(Utc::now());
        }
    } else {
        patch = patch.open_price(resolved_price);
    }
    if !ctx.store.update_order(&patch).await? {
        warn!(order_id = %order.id, "체결 반영 대상 행이 없습니다");
        return Ok(());
    }

    info!(
        order_id = %order.id,
        price = %resolved_price,
        commission = %commission,
        closing = is_closing,
        "체결 연결"
    );

    // 시장가 디스패치처럼 이미 체결 확정으로 기록된 주문은 알림이 나갔다
    if order.status != OrderStatus::Filled {
        ctx.notify(NotificationEvent::OrderFilled {
            symbol: order.symbol.clone(),
            side: order.side.as_str().to_string(),
            qty: order.qty,
            price: resolved_price,
            order_id: order.id.clone(),
        })
        .await;
    }

    if let Some(open_order_id) = order.open_order_id.clone() {
        close_open_order(ctx, order, &open_order_id, resolved_price, commission).await?;
    }
    Ok(())
}

/// 수수료를 호가 자산 기준으로 환산합니다.
///
/// 다른 자산 (BNB 등)으로 결제된 수수료는 캐시된 마크 가격으로 환산하고,
/// 가격이 없으면 원 자산 그대로 기록합니다.
async fn quote_commission(
    ctx: &ServiceContext,
    amount: Decimal,
    asset: Option<String>,
) -> (Decimal, Option<String>) {
    let asset_name = match asset {
        Some(asset_name) => asset_name,
        None => return (amount, None),
    };
    if asset_name == QUOTE_ASSET || amount.is_zero() {
        return (amount, Some(asset_name));
    }

    let pair = format!("{}{}", asset_name, QUOTE_ASSET);
    match ctx.cache.mark_price(&ctx.config.exchange, &pair).await {
        Ok(Some(price)) => (amount * price, Some(QUOTE_ASSET.to_string())),
        _ => {
            debug!(asset = %asset_name, "수수료 환산 가격 없음, 원 자산 유지");
            (amount, Some(asset_name))
        }
    }
}

// =============================================================================
// 진입 주문 역방향 링크
// =============================================================================

/// 청산 체결을 진입 주문에 역방향으로 기록합니다.
///
/// `close_order_id`/`pl`은 진입 주문의 `close_time`이 비어 있을 때 한 번만
/// 기록됩니다. 손익은 양쪽 체결가와 체결 수수료 기준입니다.
async fn close_open_order(
    ctx: &ServiceContext,
    closing: &Order,
    open_order_id: &str,
    close_fill_price: Decimal,
    close_commission: Decimal,
) -> Result<()> {
    let opener = match ctx.store.get_order(open_order_id).await? {
        Some(opener) => opener,
        None => {
            warn!(order_id = %closing.id, open_order_id, "진입 주문을 찾을 수 없습니다");
            return Ok(());
        }
    };
    if opener.close_time.is_some() {
        // 역방향 링크는 최초 한 번만. 중복 체결 경로가 와도 덮어쓰지 않는다.
        debug!(open_order_id, "진입 주문이 이미 종결됨, 역방향 링크 생략");
        return Ok(());
    }

    let pl = realized_pnl(
        opener.position_side,
        opener.open_price,
        close_fill_price,
        closing.qty,
        opener.commission,
        close_commission,
    );

    let patch = OrderPatch::for_order(opener.id.as_str())
        .close_price(close_fill_price)
        .close_order_id(closing.id.as_str())
        .pl(pl)
        .closed_at(Utc::now());
    if !ctx.store.update_order(&patch).await? {
        warn!(open_order_id, "역방향 링크 대상 행이 없습니다");
        return Ok(());
    }

    info!(
        open_order_id,
        close_order_id = %closing.id,
        pl = %pl,
        "포지션 종결"
    );

    ctx.notify(NotificationEvent::PositionClosed {
        symbol: opener.symbol.clone(),
        position_side: opener.position_side.as_str().to_string(),
        qty: closing.qty,
        entry_price: opener.open_price,
        exit_price: close_fill_price,
        pnl: pl,
    })
    .await;

    cancel_sibling_protections(ctx, &opener, closing).await;
    Ok(())
}

/// 같은 진입 주문에 걸린 나머지 보호 주문 정리.
///
/// 한쪽 보호 주문이 소진되면 다른 쪽은 의미를 잃습니다. 거래소 취소는
/// best-effort이고, 로컬 행은 항상 종결합니다.
async fn cancel_sibling_protections(ctx: &ServiceContext, opener: &Order, filled: &Order) {
    let query = SiblingQuery::for_exchange(opener.exchange.as_str())
        .symbol(opener.symbol.as_str())
        .open_order_id(opener.id.as_str());
    let siblings = match ctx.store.get_sibling_orders(&query).await {
        Ok(siblings) => siblings,
        Err(e) => {
            warn!(open_order_id = %opener.id, error = %e, "보호 주문 조회 실패");
            return;
        }
    };

    for sibling in siblings {
        if sibling.id == filled.id {
            continue;
        }

        if let Err(e) = ctx
            .exchange
            .cancel_order(&sibling.symbol, &sibling.id, &sibling.ref_id)
            .await
        {
            warn!(order_id = %sibling.id, error = %e, "보호 주문 취소 실패, 로컬만 종결");
        }

        let patch = OrderPatch::for_order(sibling.id.as_str())
            .status(OrderStatus::Canceled)
            .closed_at(Utc::now());
        match ctx.store.update_order(&patch).await {
            Ok(true) => {
                info!(
                    order_id = %sibling.id,
                    order_type = sibling.order_type.as_str(),
                    "잉여 보호 주문 종결"
                );
            }
            Ok(false) => {}
            Err(e) => warn!(order_id = %sibling.id, error = %e, "보호 주문 종결 실패"),
        }
    }
}

// =============================================================================
// 테스트
// =============================================================================
