//! 도메인 타입 모듈.

pub mod event;
pub mod exchange;
pub mod intent;
pub mod note;
pub mod order;
pub mod store;

pub use event::{OrderUpdateEvent, StreamEvent};
pub use exchange::{
    AccountInfo, ExchangeClient, ExchangeOrder, OrderAck, PositionSnapshot, TradeFill,
};
pub use intent::{classify_intent, IntentKind, IntentProducer, MarketState};
pub use note::{NoteRecord, NoteStage};
pub use order::{realized_pnl, Order, OrderPatch, OrderStatus, OrderType, PositionSide, Side};
pub use store::{
    failure_key, mailbox_key, mark_price_key, position_key, OrderStore, SharedCache, SiblingQuery,
};
