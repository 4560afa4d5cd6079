//! 주문 실행·정합성 워크플로우 모듈.
//!
//! 각 모듈은 데몬의 한 주기(tick)에 대응하는 `run_*` 진입점을 제공합니다.
//! - [`dispatch`]: 의도 우편함을 비우고 거래소에 주문을 제출/취소
//! - [`reconcile`]: 미체결 주문 상태 동기화와 체결 내역 연결
//! - [`stream_sync`]: 사용자 데이터 스트림 수명주기와 푸시 이벤트 반영
//! - [`sweep`]: 포지션 없는 고아 주문 정리

pub mod dispatch;
pub mod escalation;
pub mod reconcile;
pub mod stream_sync;
pub mod sweep;

pub use dispatch::run_dispatch_cycle;
pub use reconcile::{handle_stream_event, run_reconcile_cycle};
pub use stream_sync::run_stream_lifecycle;
pub use sweep::run_sweep_cycle;

// =============================================================================
// 테스트 공용 픽스처
// =============================================================================
