//! 주문 실행·정합성 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - 메일박스 기반 주문 디스패처 (취소/지정가/트리거/시장가 경로)
//! - 거래소 상태 폴링·스트림 이벤트 수렴과 체결 연결
//! - 사용자 데이터 스트림 토큰 수명주기 관리
//! - 고아 보호 주문 정리와 취소 주문 보존 정책
//!
//! # 예제
//!
//! ```rust,ignore
//! use oms_engine::{EngineConfig, ServiceContext};
//! use oms_engine::modules::run_dispatch_cycle;
//!
//! let config = EngineConfig::from_env()?;
//! let ctx = ServiceContext::new(config, store, cache, exchange, notifier);
//! let stats = run_dispatch_cycle(&ctx).await?;
//! stats.log_summary("디스패치");
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod modules;
pub mod stats;

// 주요 타입 재내보내기
pub use config::EngineConfig;
pub use context::ServiceContext;
pub use error::{EngineError, Result};
pub use stats::{DispatchStats, ReconcileStats, SweepStats};
