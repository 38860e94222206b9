//! Rate limiting.
//!
//! 식별자(정규화된 지역명 등)별 고정 윈도우 카운터를 제공합니다.
//! 순수 인메모리 상태이며 네트워크나 저장소에 접근하지 않습니다.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sync_map::SynchronizedMap;

/// Rate Limiter 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 윈도우당 최대 요청 수
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// 윈도우 길이 (초)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> u32 {
    10
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// 윈도우 길이.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// 식별자별 윈도우 상태.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    /// 식별자
    pub identifier: String,
    /// 현재 윈도우의 요청 수
    pub count: u32,
    /// 윈도우가 리셋되는 시각
    pub window_reset_at: Instant,
}

impl RateLimitState {
    fn new(identifier: &str, now: Instant) -> Self {
        // 만료된 윈도우로 시작해 첫 요청에서 리셋되게 함
        Self {
            identifier: identifier.to_string(),
            count: 0,
            window_reset_at: now,
        }
    }

    /// 윈도우 리셋까지 남은 시간.
    pub fn resets_in(&self, now: Instant) -> Duration {
        self.window_reset_at.saturating_duration_since(now)
    }
}

/// 고정 윈도우 Rate Limiter.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    states: SynchronizedMap<String, RateLimitState>,
}

impl RateLimiter {
    /// 윈도우당 `max_requests`회를 허용하는 limiter 생성.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            states: SynchronizedMap::new(),
        }
    }

    /// 설정으로 생성.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// 윈도우당 최대 요청 수.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// 요청 허용 여부를 판단하고 카운터를 갱신합니다.
    ///
    /// - 상태가 없거나 `now >= window_reset_at`이면 count=1로 새 윈도우를 시작하고 허용
    /// - 한도 미만이면 count를 증가시키고 허용
    /// - 한도에 도달했으면 count를 그대로 두고 거부
    pub fn allow(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let max_requests = self.max_requests;
        let window = self.window;

        let allowed = self.states.with_entry(
            identifier,
            || RateLimitState::new(identifier, now),
            |state| {
                if now >= state.window_reset_at {
                    state.count = 1;
                    state.window_reset_at = now + window;
                    true
                } else if state.count < max_requests {
                    state.count += 1;
                    true
                } else {
                    false
                }
            },
        );

        if !allowed {
            warn!(
                identifier = identifier,
                max_requests = self.max_requests,
                "Rate limit exceeded"
            );
        }

        allowed
    }

    /// 식별자의 현재 상태.
    pub fn state(&self, identifier: &str) -> Option<RateLimitState> {
        self.states.get_cloned(identifier)
    }

    /// 한도에 도달한 식별자의 윈도우 리셋까지 남은 시간.
    pub fn retry_after(&self, identifier: &str) -> Option<Duration> {
        let now = Instant::now();
        self.state(identifier)
            .filter(|s| s.count >= self.max_requests && now < s.window_reset_at)
            .map(|s| s.resets_in(now))
    }

    /// 윈도우가 끝난 상태를 제거하고 제거한 개수를 반환합니다.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.states.retain(|_, state| now < state.window_reset_at)
    }

    /// 추적 중인 식별자 수.
    pub fn tracked_identifiers(&self) -> usize {
        self.states.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
