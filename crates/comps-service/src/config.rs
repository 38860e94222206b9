//! 설정 관리.
//!
//! 기본값 → (선택) TOML 파일 → `COMPS__` 접두사 환경 변수 순으로 적용합니다.
//! 예: `COMPS__ORIGIN__BASE_URL`, `COMPS__RATE_LIMIT__MAX_REQUESTS`.

use std::path::Path;
use std::time::Duration;

use comps_core::{DataPeriod, LogConfig, RequestDefaults};
use comps_data::{DatabaseConfig, RedisConfig};
use comps_origin::{CircuitBreakerConfig, OriginConfig};
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;

/// 조회 서비스 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// 핫 캐시 TTL (초)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// 저장소 레코드를 업스트림 호출 없이 제공할 수 있는 최대 경과 시간 (시간)
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u32,
    /// 업스트림 실패 시 대체로 제공할 수 있는 최대 경과 시간 (일)
    #[serde(default = "default_stale_max_age_days")]
    pub stale_max_age_days: u32,
    /// 기본 매물 유형
    #[serde(default = "default_property_type")]
    pub default_property_type: String,
    /// 기본 집계 기간
    #[serde(default)]
    pub default_period: DataPeriod,
    /// 같은 키에 대한 동시 업스트림 호출을 하나로 합칠지 여부
    #[serde(default = "default_true")]
    pub single_flight: bool,
    /// 헬스 체크에 업스트림 probe 포함 여부
    #[serde(default)]
    pub origin_probe: bool,
    /// 업스트림 호출 타임아웃 (밀리초, 없으면 업스트림 설정 값 사용)
    #[serde(default)]
    pub origin_timeout_ms: Option<u64>,
    /// 업스트림 응답 전에 저장소 쓰기를 기다리는 최대 시간 (밀리초).
    /// 넘기면 쓰기는 백그라운드에서 계속됩니다.
    #[serde(default = "default_persist_wait_ms")]
    pub persist_wait_ms: u64,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_freshness_hours() -> u32 {
    24
}
fn default_stale_max_age_days() -> u32 {
    7
}
fn default_persist_wait_ms() -> u64 {
    1000
}
fn default_property_type() -> String {
    "house".to_string()
}
fn default_true() -> bool {
    true
}

const DEFAULT_ORIGIN_TIMEOUT_MS: u64 = 10_000;

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            freshness_hours: default_freshness_hours(),
            stale_max_age_days: default_stale_max_age_days(),
            default_property_type: default_property_type(),
            default_period: DataPeriod::default(),
            single_flight: true,
            origin_probe: false,
            origin_timeout_ms: None,
            persist_wait_ms: default_persist_wait_ms(),
        }
    }
}

impl ServiceConfig {
    /// 핫 캐시 TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// 신선도 윈도우.
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::try_hours(i64::from(self.freshness_hours)).unwrap_or(chrono::Duration::MAX)
    }

    /// 오래된 레코드 허용 한도.
    pub fn stale_max_age(&self) -> chrono::Duration {
        chrono::Duration::try_days(i64::from(self.stale_max_age_days))
            .unwrap_or(chrono::Duration::MAX)
    }

    /// 저장소 쓰기 대기 한도.
    pub fn persist_wait(&self) -> Duration {
        Duration::from_millis(self.persist_wait_ms)
    }

    /// 값 사이의 관계를 검사합니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl_secs == 0 {
            return Err("service.cache_ttl_secs must be greater than 0".to_string());
        }
        if self.stale_max_age() < self.freshness() {
            return Err(format!(
                "service.stale_max_age_days ({}d) must cover service.freshness_hours ({}h)",
                self.stale_max_age_days, self.freshness_hours
            ));
        }
        Ok(())
    }

    /// 업스트림 호출 타임아웃.
    pub fn origin_timeout(&self) -> Duration {
        Duration::from_millis(self.origin_timeout_ms.unwrap_or(DEFAULT_ORIGIN_TIMEOUT_MS))
    }

    /// 요청 기본값.
    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            property_type: self.default_property_type.clone(),
            period: self.default_period,
        }
    }
}

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Redis 설정
    #[serde(default)]
    pub redis: RedisConfig,
    /// 업스트림 API 설정
    #[serde(default)]
    pub origin: OriginConfig,
    /// Circuit Breaker 설정
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate Limiter 설정
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// 조회 서비스 설정
    #[serde(default)]
    pub service: ServiceConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LogConfig,
}

impl AppConfig {
    /// 파일(선택)과 환경 변수에서 설정을 로드합니다.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // 파일에서 로드
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        // 환경 변수로 오버라이드
        builder = builder.add_source(
            config::Environment::with_prefix("COMPS")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.service.validate().map_err(config::ConfigError::Message)?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load(Some(Path::new("config/default.toml")))
    }

    /// 업스트림 타임아웃이 반영된 서비스 설정.
    pub fn service_config(&self) -> ServiceConfig {
        let mut service = self.service.clone();
        if service.origin_timeout_ms.is_none() {
            service.origin_timeout_ms = Some(self.origin.timeout_ms);
        }
        service
    }
}
