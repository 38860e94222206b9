//! # Comps Service
//!
//! 시장 비교 매매 데이터 조회 서비스.
//!
//! 요청마다 다음 순서로 데이터를 찾습니다:
//! 1. 식별자별 rate limit 확인
//! 2. Circuit Breaker 확인 (업스트림 장애 시 즉시 실패)
//! 3. 핫 캐시
//! 4. 영속 저장소의 신선한 레코드 (24시간 이내)
//! 5. 업스트림 호출 후 저장소/캐시에 기록
//! 6. 업스트림 실패 시 7일 이내의 오래된 레코드로 대체

pub mod audit;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod service;
pub mod sync_map;

pub use audit::{AuditSink, RetrievalAuditEvent, TracingAuditSink};
pub use config::{AppConfig, ServiceConfig};
pub use error::{MarketDataError, MarketDataResult};
pub use rate_limit::{RateLimitConfig, RateLimitState, RateLimiter};
pub use service::{HealthReport, MarketDataService, ServiceStats};
pub use sync_map::SynchronizedMap;
