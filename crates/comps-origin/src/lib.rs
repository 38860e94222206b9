//! 업스트림 부동산 시장 데이터 API 연동.
//!
//! 이 crate는 다음을 제공합니다:
//! - `OriginClient` 트레잇과 HTTP 구현 (`HttpOriginClient`)
//! - 업스트림 응답/에러를 내부 타입으로 변환하는 에러 분류
//! - 업스트림 장애를 격리하는 Circuit Breaker

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use client::{HttpOriginClient, OriginClient};
pub use config::OriginConfig;
pub use error::{OriginError, OriginResult};
