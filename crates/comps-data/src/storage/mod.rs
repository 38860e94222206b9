//! 외부 저장소 백엔드.
//!
//! - `redis` - Redis 핫 캐시
//! - `postgres` - PostgreSQL 영속 저장소

pub mod postgres;
pub mod redis;

pub use self::postgres::{Database, DatabaseConfig, PostgresStore};
pub use self::redis::{RedisCache, RedisConfig};
