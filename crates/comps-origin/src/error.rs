//! 업스트림 API 에러 타입.

use thiserror::Error;

/// 업스트림 호출 에러.
#[derive(Debug, Clone, Error)]
pub enum OriginError {
    /// 인증/권한 에러 (HTTP 401/403)
    #[error("Origin authentication failed: {0}")]
    Auth(String),

    /// 업스트림 요청 한도 초과 (HTTP 429)
    #[error("Origin rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// `Retry-After` 헤더 값 (초)
        retry_after_secs: Option<u64>,
    },

    /// 업스트림 사용 불가 (HTTP 5xx, 타임아웃, 연결 실패)
    #[error("Origin unavailable: {0}")]
    Unavailable(String),

    /// 응답 형식 오류 (`properties`/`marketStats` 누락 등)
    #[error("Origin returned malformed response: {0}")]
    MalformedResponse(String),

    /// 그 밖의 예상치 못한 상태 코드
    #[error("Origin returned unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },
}

/// 업스트림 작업을 위한 Result 타입.
pub type OriginResult<T> = Result<T, OriginError>;

impl OriginError {
    /// HTTP 상태 코드와 응답 본문으로 에러를 분류합니다.
    pub fn from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {} - {}", status, truncate(body, 200))
        };

        match status {
            401 | 403 => OriginError::Auth(message),
            429 => OriginError::RateLimited { retry_after_secs },
            500..=599 => OriginError::Unavailable(message),
            _ => OriginError::Unexpected { status, message },
        }
    }

    /// 잠시 후 재시도하면 성공할 수 있는 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OriginError::RateLimited { .. } | OriginError::Unavailable(_)
        )
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, OriginError::Auth(_))
    }

    /// 로그/메트릭용 분류 레이블.
    pub fn kind(&self) -> &'static str {
        match self {
            OriginError::Auth(_) => "auth",
            OriginError::RateLimited { .. } => "rate_limited",
            OriginError::Unavailable(_) => "unavailable",
            OriginError::MalformedResponse(_) => "malformed_response",
            OriginError::Unexpected { .. } => "unexpected",
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OriginError::Unavailable(format!("request timed out: {}", err))
        } else if err.is_decode() {
            OriginError::MalformedResponse(err.to_string())
        } else {
            OriginError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OriginError {
    fn from(err: serde_json::Error) -> Self {
        OriginError::MalformedResponse(err.to_string())
    }
}
