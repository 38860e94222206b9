//! 업스트림 API 설정.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 업스트림 API 설정.
#[derive(Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// API 기본 URL (예: `https://api.property-data.example`)
    pub base_url: String,
    /// API 키 (비어있으면 인증 헤더 생략)
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// 비교 매매 `source` 태그로 기록되는 이름
    #[serde(default = "default_source_name")]
    pub source_name: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 요청/보관할 비교 매매 최대 개수
    #[serde(default = "default_comparable_sales_limit")]
    pub comparable_sales_limit: usize,
    /// 시장 데이터 엔드포인트 경로
    #[serde(default = "default_market_data_path")]
    pub market_data_path: String,
    /// 헬스 체크 엔드포인트 경로
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_source_name() -> String {
    "origin".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_comparable_sales_limit() -> usize {
    20
}
fn default_market_data_path() -> String {
    "/market-data".to_string()
}
fn default_health_path() -> String {
    "/health".to_string()
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            source_name: default_source_name(),
            timeout_ms: default_timeout_ms(),
            comparable_sales_limit: default_comparable_sales_limit(),
            market_data_path: default_market_data_path(),
            health_path: default_health_path(),
        }
    }
}

impl OriginConfig {
    /// 기본 URL로 설정 생성.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// API 키 지정.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// 타임아웃 지정.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 요청 타임아웃.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 시장 데이터 엔드포인트 전체 URL.
    pub fn market_data_url(&self) -> String {
        join_url(&self.base_url, &self.market_data_path)
    }

    /// 헬스 체크 엔드포인트 전체 URL.
    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// API 키가 로그에 남지 않도록 직접 구현
impl fmt::Debug for OriginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &if self.api_key.is_empty() { "" } else { "[REDACTED]" },
            )
            .field("source_name", &self.source_name)
            .field("timeout_ms", &self.timeout_ms)
            .field("comparable_sales_limit", &self.comparable_sales_limit)
            .field("market_data_path", &self.market_data_path)
            .field("health_path", &self.health_path)
            .finish()
    }
}
