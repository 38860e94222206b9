//! 시장 데이터 캐시 및 영속 저장소.
//!
//! 이 crate는 다음을 제공합니다:
//! - `HotCache` 트레잇과 Redis/인메모리 구현
//! - `PersistentStore` 트레잇과 PostgreSQL/인메모리 구현
//! - 데이터 레이어 에러 타입

pub mod cache;
pub mod error;
pub mod storage;
pub mod store;

pub use cache::{CacheEntry, CacheLookup, HotCache, MemoryCache};
pub use error::{DataError, Result};
pub use storage::{Database, DatabaseConfig, PostgresStore, RedisCache, RedisConfig};
pub use store::{MemoryStore, PersistentStore};
