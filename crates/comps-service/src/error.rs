//! 시장 데이터 조회 에러 타입.
//!
//! 호출자가 "나중에 다시 시도"(RateLimitExceeded, CircuitOpen, 업스트림 일시 장애),
//! "존재하지 않음"(NotFound), "입력 오류"(Validation)를 구분할 수 있도록 분류합니다.

use std::time::Duration;

use comps_core::CoreError;
use comps_data::DataError;
use comps_origin::OriginError;
use thiserror::Error;

/// 시장 데이터 조회 에러.
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// 잘못된 요청 (상태 변경 없음)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// 식별자별 요청 한도 초과
    #[error("Rate limit exceeded for '{identifier}'")]
    RateLimitExceeded {
        identifier: String,
        retry_after: Option<Duration>,
    },

    /// Circuit Breaker가 요청을 거부 중
    #[error("Circuit breaker is open")]
    CircuitOpen { retry_after: Option<Duration> },

    /// 업스트림 에러 (오래된 레코드로도 대체하지 못함)
    #[error(transparent)]
    Origin(#[from] OriginError),

    /// 저장소 읽기 에러
    #[error("Storage error: {0}")]
    Storage(#[from] DataError),

    /// 캐시, 신선한 레코드, 오래된 레코드 모두 없음
    #[error("Market data not found: {0}")]
    NotFound(String),
}

/// 서비스 작업을 위한 Result 타입.
pub type MarketDataResult<T> = Result<T, MarketDataError>;

impl From<CoreError> for MarketDataError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) => MarketDataError::Validation(msg),
            other => MarketDataError::Validation(other.to_string()),
        }
    }
}

impl MarketDataError {
    /// 호출자가 백오프 후 재시도할 만한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            MarketDataError::RateLimitExceeded { .. } | MarketDataError::CircuitOpen { .. } => {
                true
            }
            MarketDataError::Origin(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 데이터가 존재하지 않는 경우인지 확인.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MarketDataError::NotFound(_))
    }

    /// 재시도 권장 대기 시간.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MarketDataError::RateLimitExceeded { retry_after, .. }
            | MarketDataError::CircuitOpen { retry_after } => *retry_after,
            MarketDataError::Origin(OriginError::RateLimited { retry_after_secs }) => {
                retry_after_secs.map(Duration::from_secs)
            }
            _ => None,
        }
    }

    /// 로그/메트릭용 분류 레이블.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketDataError::Validation(_) => "validation",
            MarketDataError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            MarketDataError::CircuitOpen { .. } => "circuit_open",
            MarketDataError::Origin(e) => e.kind(),
            MarketDataError::Storage(_) => "storage",
            MarketDataError::NotFound(_) => "not_found",
        }
    }
}
