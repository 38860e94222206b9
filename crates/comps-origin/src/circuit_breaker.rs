//! 업스트림 호출을 보호하는 Circuit Breaker.
//!
//! 업스트림 장애 시 실패하는 API를 반복 호출하지 않도록 막고,
//! 쿨다운 이후 자동으로 복구 여부를 탐지합니다.
//!
//! # 상태 전이
//!
//! ```text
//! Closed ──[연속 실패 임계치 도달]──> Open
//!    ↑                                │
//!    │              [마지막 실패 후 쿨다운 경과 + allow_request]
//!    │                                ↓
//!    └──────[성공]────── HalfOpen ──[실패]──> Open
//! ```
//!
//! Open → HalfOpen 전이는 오직 `allow_request()`에서만 일어납니다.
//! `state()`와 `snapshot()`은 상태를 읽기만 합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OriginError;

/// Circuit Breaker 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// 정상 상태 - 모든 요청 허용
    Closed,
    /// 장애 상태 - 쿨다운 동안 요청 즉시 거부
    Open,
    /// 복구 테스트 상태 - 다음 결과로 Closed/Open 결정
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit Breaker 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Open으로 전이하는 연속 실패 횟수
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// 마지막 실패 이후 Open 상태 유지 시간 (밀리초)
    #[serde(default = "default_cool_down_ms")]
    pub cool_down_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cool_down_ms() -> u64 {
    60_000
} // 60초

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down_ms: default_cool_down_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    /// 새 설정 생성.
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold,
            cool_down_ms: u64::try_from(cool_down.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// 쿨다운 Duration.
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}

/// Circuit Breaker 내부 상태.
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_state_change: Instant,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            last_failure_time: None,
            last_state_change: Instant::now(),
        }
    }

    fn cool_down_elapsed(&self, cool_down: Duration) -> bool {
        self.last_failure_at
            .map(|at| at.elapsed() > cool_down)
            .unwrap_or(true)
    }
}

/// Circuit Breaker.
///
/// 업스트림 호출 전후로 사용합니다.
///
/// # Example
///
/// ```ignore
/// let cb = CircuitBreaker::new("origin", CircuitBreakerConfig::default());
///
/// if !cb.allow_request() {
///     return Err(MarketDataError::CircuitOpen { retry_after: cb.retry_after() });
/// }
/// let result = origin.fetch(&key).await;
/// cb.record_result(&result);
/// ```
pub struct CircuitBreaker {
    /// 서비스 이름 (로깅용)
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    /// 총 실패 횟수 (메트릭용)
    total_failures: AtomicU64,
    /// 총 성공 횟수 (메트릭용)
    total_successes: AtomicU64,
    /// Circuit Open 횟수 (메트릭용)
    open_count: AtomicU64,
}

impl CircuitBreaker {
    /// 새 Circuit Breaker 생성.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            open_count: AtomicU64::new(0),
        }
    }

    /// 기본 설정(실패 5회, 쿨다운 60초)으로 생성.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// 서비스 이름 반환.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit_breaker = %self.name, "Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// 현재 상태 반환 (전이 없음).
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// 요청이 허용되는지 확인.
    ///
    /// Open 상태에서 마지막 실패 후 쿨다운이 지났으면 HalfOpen으로 전이하고
    /// 이번 요청을 허용합니다. HalfOpen 상태에서는 결과가 기록될 때까지 요청을 허용합니다.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if inner.cool_down_elapsed(self.config.cool_down()) {
                    self.transition_to(&mut inner, CircuitState::HalfOpen);
                    tracing::info!(
                        circuit_breaker = %self.name,
                        "Circuit breaker cool-down elapsed: Open -> HalfOpen"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// 성공 기록.
    ///
    /// HalfOpen 상태에서만 의미가 있으며 Closed로 전이하고 연속 실패 횟수를 0으로 만듭니다.
    /// Closed 상태에서는 아무 일도 하지 않습니다.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            self.transition_to(&mut inner, CircuitState::Closed);
            inner.consecutive_failures = 0;
            tracing::info!(
                circuit_breaker = %self.name,
                "Circuit breaker recovered: HalfOpen -> Closed"
            );
        }
    }

    /// 실패 기록.
    ///
    /// 연속 실패 횟수를 증가시키고 마지막 실패 시각을 갱신합니다.
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to(&mut inner, CircuitState::Open);
                    self.open_count.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        circuit_breaker = %self.name,
                        consecutive_failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker tripped: Closed -> Open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(&mut inner, CircuitState::Open);
                self.open_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    circuit_breaker = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    "Circuit breaker recovery failed: HalfOpen -> Open"
                );
            }
            CircuitState::Open => {
                // 쿨다운은 마지막 실패 기준으로 다시 시작됨
            }
        }
    }

    /// 업스트림 호출 결과 기록.
    ///
    /// 네트워크에 도달한 모든 호출 결과는 성공/실패로 보고됩니다.
    pub fn record_result<T>(&self, result: &Result<T, OriginError>) {
        match result {
            Ok(_) => self.record_success(),
            Err(e) => {
                tracing::debug!(circuit_breaker = %self.name, kind = e.kind(), "Recording origin failure");
                self.record_failure();
            }
        }
    }

    /// Open 상태일 때 남은 쿨다운 (예상).
    pub fn retry_after(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        inner
            .last_failure_at
            .map(|at| self.config.cool_down().saturating_sub(at.elapsed()))
    }

    /// 수동으로 Circuit 리셋.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition_to(&mut inner, CircuitState::Closed);
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        inner.last_failure_time = None;
        tracing::info!(
            circuit_breaker = %self.name,
            "Circuit breaker manually reset"
        );
    }

    /// 현재 상태 스냅샷 반환.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_time,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            open_count: self.open_count.load(Ordering::Relaxed),
            time_in_current_state: inner.last_state_change.elapsed(),
        }
    }

    fn transition_to(&self, inner: &mut BreakerInner, new_state: CircuitState) {
        inner.state = new_state;
        inner.last_state_change = Instant::now();
    }
}

/// Circuit Breaker 상태 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    /// 서비스 이름
    pub name: String,
    /// 현재 상태
    pub state: CircuitState,
    /// 현재 연속 실패 횟수
    pub consecutive_failures: u32,
    /// 마지막 실패 시각
    pub last_failure_at: Option<DateTime<Utc>>,
    /// 총 실패 횟수
    pub total_failures: u64,
    /// 총 성공 횟수
    pub total_successes: u64,
    /// Circuit Open 횟수
    pub open_count: u64,
    /// 현재 상태 유지 시간
    pub time_in_current_state: Duration,
}
