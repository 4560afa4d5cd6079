//! 주문 실행 엔진 핵심 도메인.
//!
//! 이 crate는 다음을 제공합니다:
//! - 주문 모델과 상태 기계 (Order/OrderStatus/OrderType)
//! - 거래소·저장소·캐시 추상화 trait
//! - 의도 분류와 프로듀서 계약
//! - 에러 분류 체계 (재시도/에스컬레이션 판정 포함)
//!
//! # 예제
//!
//! ```rust,ignore
//! use oms_core::domain::{classify_intent, IntentKind, Order, OrderType, PositionSide, Side};
//! use rust_decimal_macros::dec;
//!
//! let intent = Order::new("binance", "bot-a", "BTCUSDT",
//!     Side::Buy, PositionSide::Long, OrderType::Limit, dec!(0.5));
//! assert_eq!(classify_intent(&intent), IntentKind::LimitFamily);
//! ```

pub mod domain;
pub mod error;

// 주요 타입 재내보내기
pub use domain::{
    classify_intent, failure_key, mailbox_key, mark_price_key, position_key, realized_pnl,
    AccountInfo, ExchangeClient, ExchangeOrder, IntentKind, IntentProducer, MarketState,
    NoteRecord, NoteStage, Order, OrderAck, OrderPatch, OrderStatus, OrderStore, OrderType,
    OrderUpdateEvent, PositionSide, PositionSnapshot, SharedCache, Side, SiblingQuery,
    StreamEvent, TradeFill,
};
pub use error::{
    ExchangeError, StoreError, REJECT_INSUFFICIENT_MARGIN, REJECT_UNKNOWN_ORDER,
    REJECT_WOULD_TRIGGER,
};
