//! 고아 주문 스위퍼.
//!
//! 오래 열려 있는데 받쳐 줄 포지션이 없는 주문은 프로세스 재시작이나 유실된
//! 이벤트가 남긴 흔적입니다. 판정은 캐시된 포지션 스냅샷만으로 하고 거래소는
//! 호출하지 않습니다. 실제로 거래소에 살아 있는 주문을 잘못 정리했더라도
//! 다음 체결 이벤트가 행을 되살리는 대신 새 기록으로 남으므로, 정리는 언제나
//! 로컬에서만 일어납니다.
//!
//! 같은 주기에서 보존 기한이 지난 취소 행도 함께 삭제합니다.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use oms_core::{NoteRecord, NoteStage, Order, OrderPatch, OrderStatus, OrderStore, SharedCache};
use oms_notification::NotificationEvent;

use crate::context::ServiceContext;
use crate::error::Result;
use crate::stats::SweepStats;

// =============================================================================
// 스위프 주기
// =============================================================================

/// 한 스위프 틱을 수행합니다.
pub async fn run_sweep_cycle(ctx: &ServiceContext) -> Result<SweepStats> {
    let started = std::time::Instant::now();
    let mut stats = SweepStats::new();

    let cutoff = Utc::now() - Duration::minutes(ctx.config.sweep.orphan_age_minutes as i64);
    let orders = ctx
        .store
        .get_expired_orders(&ctx.config.exchange, cutoff)
        .await?;
    stats.scanned = orders.len();

    for order in &orders {
        match sweep_order(ctx, order).await {
            Ok(true) => stats.orphaned += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "고아 판정 실패");
                stats.errors += 1;
            }
        }
    }

    let retention_cutoff = Utc::now() - Duration::days(ctx.config.sweep.retention_days as i64);
    stats.deleted = ctx
        .store
        .delete_canceled_orders(&ctx.config.exchange, retention_cutoff)
        .await?;
    if stats.deleted > 0 {
        info!(deleted = stats.deleted, "보존 기한 지난 취소 행 삭제");
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}

/// 단일 주문의 고아 여부를 판정하고, 고아면 로컬에서 종결합니다.
///
/// 반환값은 종결 여부입니다.
async fn sweep_order(ctx: &ServiceContext, order: &Order) -> Result<bool> {
    let snapshot = ctx
        .cache
        .position_snapshot(&order.exchange, &order.symbol, order.position_side)
        .await?;

    let reason = match snapshot {
        Some(position) if position.supports_qty(order.qty) => {
            debug!(order_id = %order.id, "포지션이 받치고 있어 유지");
            return Ok(false);
        }
        Some(position) => format!("포지션 부족 (보유 {} < 주문 {})", position.amount, order.qty),
        None => "포지션 없음".to_string(),
    };

    warn!(
        order_id = %order.id,
        symbol = %order.symbol,
        position_side = order.position_side.as_str(),
        age_minutes = (Utc::now() - order.open_time).num_minutes(),
        reason = %reason,
        "고아 주문 로컬 종결"
    );

    let note = NoteRecord::new(order.bot_id.as_str(), NoteStage::Sweep, reason.as_str());
    let mut patch = OrderPatch::for_order(order.id.as_str())
        .closed_at(Utc::now())
        .note(note.to_json());
    if !order.status.is_terminal() {
        patch = patch.status(OrderStatus::Expired);
    }
    if !ctx.store.update_order(&patch).await? {
        warn!(order_id = %order.id, "고아 종결 대상 행이 없습니다");
        return Ok(false);
    }

    ctx.notify(NotificationEvent::OrphanClosed {
        symbol: order.symbol.clone(),
        order_id: order.id.clone(),
        reason,
    })
    .await;

    Ok(true)
}

// =============================================================================
// 테스트
// =============================================================================
