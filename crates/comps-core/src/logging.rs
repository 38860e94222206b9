//! 구조화 로깅 초기화.
//!
//! `tracing-subscriber` 레지스트리에 포맷 레이어 하나와 `EnvFilter`를 얹습니다.
//! 조회 경로의 로그는 `location`, `property_type`, `period`, `cache_key`, `error`
//! 필드를 일관되게 사용하므로 JSON 형식으로 출력하면 그대로 집계할 수 있습니다.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::CoreError;

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 여러 줄, 색상 포함 (로컬 개발)
    #[default]
    Pretty,
    /// 한 줄 JSON (로그 수집기)
    Json,
    /// 한 줄 텍스트
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(CoreError::Config(format!(
                "unknown log format `{}` (expected pretty, json or compact)",
                other
            ))),
        }
    }
}

/// 의존 크레이트의 기본 필터. DB 드라이버와 HTTP 스택의 요청 단위 로그를 줄입니다.
fn default_directives() -> Vec<String> {
    ["sqlx=warn", "hyper=warn", "reqwest=warn", "redis=warn"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// 로깅 설정 (`[logging]` 섹션).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 기본 레벨 또는 `EnvFilter` 구문 (예: "info", "comps_service=debug")
    pub level: String,
    pub format: LogFormat,
    /// 레벨 뒤에 추가되는 대상별 필터
    pub directives: Vec<String>,
    /// span 진입/종료 이벤트 출력
    pub with_span_events: bool,
    /// 파일명과 줄 번호 출력
    pub with_file: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            directives: default_directives(),
            with_span_events: false,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// 대상별 필터를 추가합니다.
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// `RUST_LOG`와 `LOG_FORMAT`이 설정되어 있으면 해당 값으로 덮어씁니다.
    ///
    /// 알 수 없는 `LOG_FORMAT` 값은 무시합니다.
    pub fn overridden_by_env(mut self) -> Self {
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.format = format;
        }
        self
    }

    pub fn from_env() -> Self {
        Self::default().overridden_by_env()
    }

    /// 레벨과 대상별 필터로 `EnvFilter`를 만듭니다.
    pub fn env_filter(&self) -> Result<EnvFilter, CoreError> {
        let mut filter =
            EnvFilter::try_new(&self.level).map_err(|e| CoreError::Config(e.to_string()))?;
        for directive in &self.directives {
            let parsed = directive
                .parse::<Directive>()
                .map_err(|e| CoreError::Config(format!("invalid log directive `{}`: {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.with_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_file)
            .with_target(self.with_target)
            .with_span_events(span_events);

        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }
}

/// 전역 subscriber를 설치합니다. 프로세스당 한 번만 성공합니다.
///
/// ```no_run
/// use comps_core::logging::{init_logging, LogConfig, LogFormat};
///
/// let config = LogConfig::new("comps_service=debug").with_format(LogFormat::Json);
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = config.env_filter()?;

    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(filter)
        .try_init()?;

    tracing::debug!(
        format = ?config.format,
        level = %config.level,
        directives = ?config.directives,
        "Logging initialized"
    );

    Ok(())
}

/// 조회 키(`MarketDataKey`) 필드를 담은 span.
#[macro_export]
macro_rules! retrieval_span {
    ($name:expr, $key:expr) => {
        tracing::info_span!(
            $name,
            location = %$key.location,
            property_type = %$key.property_type,
            period = %$key.period
        )
    };
}
