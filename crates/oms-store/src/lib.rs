//! 주문 저장소와 공유 캐시 구현.
//!
//! 이 crate는 다음을 제공합니다:
//! - Postgres 주문 저장소 (`PgOrderStore`)
//! - Redis 공유 캐시 (`RedisSharedCache`): 메일박스/카운터/참조 데이터
//! - 드라이런·테스트용 인메모리 구현 (`MemoryOrderStore`/`MemoryCache`)
//!
//! 스키마는 `migrations/` 디렉터리의 SQL로 관리합니다.

pub mod memory;
pub mod postgres;
pub mod redis_cache;

// 주요 타입 재내보내기
pub use memory::{MemoryCache, MemoryOrderStore};
pub use postgres::{PgOrderStore, PgStoreConfig};
pub use redis_cache::{RedisCacheConfig, RedisSharedCache};
