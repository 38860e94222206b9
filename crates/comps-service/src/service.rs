//! 시장 데이터 조회 오케스트레이터.
//!
//! # 조회 흐름
//!
//! ```text
//! validate → rate limit → circuit breaker → hot cache → fresh store (≤24h)
//!          → origin fetch ─┬─ 성공: persist + cache + 반환
//!                          └─ 실패: breaker 기록 → stale store (≤7d) 또는 에러 전파
//! ```
//!
//! `single_flight`가 켜져 있으면 같은 키의 업스트림 호출은 하나만 진행되고, 대기하던
//! 요청은 그 결과(성공 시 캐시, 실패 시 같은 에러와 stale 대체)를 이어받습니다.
//!
//! 모든 의존성은 생성자로 주입되므로 테스트에서 인메모리 구현으로 교체할 수 있습니다.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use comps_core::{
    MarketDataKey, MarketDataRecord, MarketDataRequest, MarketDataResponse, RequestDefaults,
    RetrievalSource, MAX_COMPARABLE_SALES,
};
use comps_data::{CacheLookup, DataError, HotCache, PersistentStore};
use comps_origin::{CircuitBreaker, CircuitBreakerSnapshot, CircuitState, OriginClient, OriginError};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::audit::{AuditSink, RetrievalAuditEvent};
use crate::config::ServiceConfig;
use crate::error::{MarketDataError, MarketDataResult};
use crate::rate_limit::RateLimiter;

/// 키별 업스트림 호출 슬롯.
///
/// 잠금을 쥔 호출자만 업스트림을 호출합니다. 잠금 안의 값은 가장 최근 호출의
/// 실패이고, `completed`는 끝난 호출 수입니다. 대기하는 동안 `completed`가 바뀌었으면
/// 앞선 호출의 결과를 그대로 이어받습니다.
#[derive(Default)]
struct Flight {
    last_failure: Mutex<Option<OriginError>>,
    completed: AtomicU64,
}

type FetchLockMap = Arc<RwLock<HashMap<String, Arc<Flight>>>>;

/// 내부 카운터.
#[derive(Debug, Default)]
struct ServiceCounters {
    cache_hits: AtomicU64,
    store_hits: AtomicU64,
    origin_fetches: AtomicU64,
    origin_failures: AtomicU64,
    stale_serves: AtomicU64,
    write_failures: AtomicU64,
    slow_writes: AtomicU64,
    shared_outcomes: AtomicU64,
    rate_limited: AtomicU64,
    circuit_rejections: AtomicU64,
}

fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// 서비스 통계 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// 핫 캐시 적중 횟수
    pub cache_hits: u64,
    /// 저장소(신선한 레코드) 적중 횟수
    pub store_hits: u64,
    /// 업스트림 성공 횟수
    pub origin_fetches: u64,
    /// 업스트림 실패 횟수
    pub origin_failures: u64,
    /// 오래된 레코드로 대체한 횟수
    pub stale_serves: u64,
    /// 저장소 쓰기 실패 횟수 (요청은 성공)
    pub write_failures: u64,
    /// 대기 한도를 넘겨 백그라운드로 넘긴 저장소 쓰기 횟수
    pub slow_writes: u64,
    /// 앞선 업스트림 호출 결과를 이어받은 대기 요청 수
    pub shared_outcomes: u64,
    /// Rate limit 거부 횟수
    pub rate_limited: u64,
    /// Circuit open 거부 횟수
    pub circuit_rejections: u64,
    /// Circuit Breaker 상태
    pub circuit: CircuitBreakerSnapshot,
}

/// 헬스 체크 결과.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// 영속 저장소 정상 여부
    pub store: bool,
    /// 핫 캐시 정상 여부
    pub cache: bool,
    /// 업스트림 probe 결과 (probe 비활성화 시 `None`)
    pub origin: Option<bool>,
    /// Circuit Breaker 상태
    pub circuit: CircuitState,
}

impl HealthReport {
    /// 모든 구성 요소가 정상인지 확인.
    pub fn is_healthy(&self) -> bool {
        self.store && self.cache && self.origin.unwrap_or(true)
    }
}

/// 시장 데이터 조회 서비스.
pub struct MarketDataService {
    cache: Arc<dyn HotCache>,
    store: Arc<dyn PersistentStore>,
    origin: Arc<dyn OriginClient>,
    rate_limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    config: ServiceConfig,
    defaults: RequestDefaults,
    audit: Option<Arc<dyn AuditSink>>,
    fetch_locks: FetchLockMap,
    counters: Arc<ServiceCounters>,
}

impl MarketDataService {
    /// 의존성을 주입하여 서비스를 생성합니다.
    pub fn new(
        cache: Arc<dyn HotCache>,
        store: Arc<dyn PersistentStore>,
        origin: Arc<dyn OriginClient>,
        rate_limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        config: ServiceConfig,
    ) -> Self {
        let defaults = config.request_defaults();
        Self {
            cache,
            store,
            origin,
            rate_limiter,
            breaker,
            config,
            defaults,
            audit: None,
            fetch_locks: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(ServiceCounters::default()),
        }
    }

    /// 감사 훅을 등록합니다.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// 서비스 설정.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Circuit Breaker.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Rate Limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    // =========================================================================
    // 조회
    // =========================================================================

    /// 시장 데이터를 조회합니다.
    ///
    /// 첫 번째로 만족되는 경로에서 반환합니다. 업스트림이 실패하면 7일 이내의
    /// 레코드로 대체하고, 그마저 없으면 원래의 업스트림 에러를 전파합니다.
    #[instrument(skip(self, request), fields(location = %request.location))]
    pub async fn get_market_data(
        &self,
        request: &MarketDataRequest,
    ) -> MarketDataResult<MarketDataResponse> {
        // 1. 검증
        let key = request.validate(&self.defaults)?;

        // 2. Rate limit
        if !self.rate_limiter.allow(&key.location) {
            inc(&self.counters.rate_limited);
            return Err(MarketDataError::RateLimitExceeded {
                retry_after: self.rate_limiter.retry_after(&key.location),
                identifier: key.location,
            });
        }

        // 3. Circuit breaker
        if !self.breaker.allow_request() {
            inc(&self.counters.circuit_rejections);
            debug!(key = %key, "Circuit open, rejecting request");
            return Err(MarketDataError::CircuitOpen {
                retry_after: self.breaker.retry_after(),
            });
        }

        // 4-5. 핫 캐시 → 신선한 저장소 레코드
        if let Some(response) = self.serve_local(&key).await {
            return Ok(response);
        }

        // 6-7. 업스트림
        if !self.config.single_flight {
            return self.fetch_from_origin(&key).await;
        }

        let flight = self.flight(&key).await;
        let result = self.fetch_single_flight(&key, &flight).await;
        drop(flight);
        self.release_flight(&key).await;
        result
    }

    /// 업스트림을 호출하지 않는 읽기 전용 조회.
    ///
    /// 핫 캐시 → 신선한 레코드 → 오래된 레코드 순으로 찾고, 없으면 `NotFound`를
    /// 반환합니다. 저장소 읽기 실패는 `Storage` 에러로 전파합니다.
    #[instrument(skip(self, request), fields(location = %request.location))]
    pub async fn get_cached_market_data(
        &self,
        request: &MarketDataRequest,
    ) -> MarketDataResult<MarketDataResponse> {
        let key = request.validate(&self.defaults)?;

        if let Some(record) = self.lookup_cache(&key).await {
            inc(&self.counters.cache_hits);
            return Ok(self.respond(record, RetrievalSource::HotCache));
        }

        if let Some(record) = self.find_fresh(&key).await? {
            inc(&self.counters.store_hits);
            self.write_cache(&record).await;
            return Ok(self.respond(record, RetrievalSource::Store));
        }

        if let Some(record) = self.find_stale(&key).await? {
            inc(&self.counters.stale_serves);
            return Ok(self.respond(record, RetrievalSource::Stale));
        }

        Err(MarketDataError::NotFound(key.to_string()))
    }

    /// 핫 캐시와 신선한 저장소 레코드에서 응답을 찾습니다.
    ///
    /// 저장소 읽기 실패는 미스로 취급합니다.
    async fn serve_local(&self, key: &MarketDataKey) -> Option<MarketDataResponse> {
        if let Some(record) = self.lookup_cache(key).await {
            inc(&self.counters.cache_hits);
            debug!(key = %key, "Hot cache hit");
            return Some(self.respond(record, RetrievalSource::HotCache));
        }

        match self.find_fresh(key).await {
            Ok(Some(record)) => {
                inc(&self.counters.store_hits);
                debug!(key = %key, "Fresh store hit");
                self.write_cache(&record).await;
                Some(self.respond(record, RetrievalSource::Store))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Store read failed, treating as miss");
                None
            }
        }
    }

    /// 같은 키의 업스트림 호출을 하나로 합칩니다.
    ///
    /// 앞선 호출이 성공했으면 캐시/저장소에서, 실패했으면 같은 업스트림 에러로
    /// 오래된 레코드 대체를 시도합니다. 대기 요청은 업스트림을 다시 호출하지 않습니다.
    async fn fetch_single_flight(
        &self,
        key: &MarketDataKey,
        flight: &Flight,
    ) -> MarketDataResult<MarketDataResponse> {
        let seen = flight.completed.load(Ordering::Acquire);
        let mut last_failure = flight.last_failure.lock().await;

        if flight.completed.load(Ordering::Acquire) != seen {
            inc(&self.counters.shared_outcomes);
            if let Some(origin_err) = last_failure.clone() {
                drop(last_failure);
                debug!(key = %key, kind = origin_err.kind(), "Reusing failed origin outcome");
                return self.fallback_to_stale(key, origin_err).await;
            }
        }

        if let Some(response) = self.serve_local(key).await {
            return Ok(response);
        }

        // 대기하는 동안 circuit이 열렸을 수 있음
        if !self.breaker.allow_request() {
            inc(&self.counters.circuit_rejections);
            return Err(MarketDataError::CircuitOpen {
                retry_after: self.breaker.retry_after(),
            });
        }

        let outcome = self.call_origin(key).await;
        *last_failure = outcome.as_ref().err().cloned();
        flight.completed.fetch_add(1, Ordering::Release);
        drop(last_failure);

        match outcome {
            Ok(response) => Ok(response),
            Err(origin_err) => self.fallback_to_stale(key, origin_err).await,
        }
    }

    async fn fetch_from_origin(&self, key: &MarketDataKey) -> MarketDataResult<MarketDataResponse> {
        match self.call_origin(key).await {
            Ok(response) => Ok(response),
            Err(origin_err) => self.fallback_to_stale(key, origin_err).await,
        }
    }

    /// 업스트림 호출. 성공하면 저장 후 캐시하고, 실패는 breaker에 기록한 뒤 반환합니다.
    async fn call_origin(&self, key: &MarketDataKey) -> Result<MarketDataResponse, OriginError> {
        let timeout = self.config.origin_timeout();
        let result = match tokio::time::timeout(timeout, self.origin.fetch(key)).await {
            Ok(result) => result,
            Err(_) => Err(OriginError::Unavailable(format!(
                "origin fetch timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        self.breaker.record_result(&result);

        match result {
            Ok(mut record) => {
                inc(&self.counters.origin_fetches);
                record.location = key.location.clone();
                record.property_type = key.property_type.clone();
                record.data_period = key.period;
                record.normalize_comparable_sales(MAX_COMPARABLE_SALES);

                info!(
                    key = %key,
                    comparable_sales = record.comparable_sales.len(),
                    "Fetched market data from origin"
                );

                self.persist(record.clone()).await;
                self.write_cache(&record).await;
                Ok(self.respond(record, RetrievalSource::Origin))
            }
            Err(origin_err) => {
                inc(&self.counters.origin_failures);
                warn!(key = %key, kind = origin_err.kind(), error = %origin_err, "Origin fetch failed");
                Err(origin_err)
            }
        }
    }

    /// 업스트림 실패 후 7일 이내 레코드로 대체하거나 원래 에러를 반환합니다.
    async fn fallback_to_stale(
        &self,
        key: &MarketDataKey,
        origin_err: OriginError,
    ) -> MarketDataResult<MarketDataResponse> {
        match self.find_stale(key).await {
            Ok(Some(record)) => {
                inc(&self.counters.stale_serves);
                warn!(
                    key = %key,
                    last_updated = %record.last_updated,
                    "Serving stale market data after origin failure"
                );
                Ok(self.respond(record, RetrievalSource::Stale))
            }
            Ok(None) => Err(MarketDataError::Origin(origin_err)),
            Err(e) => {
                warn!(key = %key, error = %e, "Stale lookup failed, treating as miss");
                Err(MarketDataError::Origin(origin_err))
            }
        }
    }

    // =========================================================================
    // 계층별 접근
    // =========================================================================

    /// 핫 캐시 조회. 만료 항목은 삭제하고, 읽기 실패는 미스로 취급합니다.
    async fn lookup_cache(&self, key: &MarketDataKey) -> Option<MarketDataRecord> {
        match self.cache.lookup(key, Utc::now()).await {
            Ok(CacheLookup::Hit(record)) => Some(record),
            Ok(CacheLookup::Miss) => None,
            Ok(CacheLookup::Expired) => {
                debug!(cache_key = %key.cache_key(), "Evicting expired cache entry");
                if let Err(e) = self.cache.delete(key).await {
                    warn!(cache_key = %key.cache_key(), error = %e, "Failed to evict expired cache entry");
                }
                None
            }
            Err(e) => {
                warn!(cache_key = %key.cache_key(), error = %e, "Hot cache read failed, treating as miss");
                None
            }
        }
    }

    async fn find_fresh(&self, key: &MarketDataKey) -> Result<Option<MarketDataRecord>, DataError> {
        let now = Utc::now();
        let freshness = self.config.freshness();
        Ok(self
            .store
            .find_by_key(key)
            .await?
            .filter(|record| record.is_within(now, freshness)))
    }

    async fn find_stale(&self, key: &MarketDataKey) -> Result<Option<MarketDataRecord>, DataError> {
        let now = Utc::now();
        let max_age = self.config.stale_max_age();
        Ok(self
            .store
            .find_stale_by_key(key, max_age)
            .await?
            .filter(|record| record.is_within(now, max_age)))
    }

    async fn write_cache(&self, record: &MarketDataRecord) {
        if let Err(e) = self.cache.set(record, self.config.cache_ttl()).await {
            warn!(cache_key = %record.key().cache_key(), error = %e, "Failed to write hot cache");
        }
    }

    /// 저장소 쓰기.
    ///
    /// 별도 태스크에서 실행하므로 호출자가 취소되거나 `persist_wait`가 지나도 쓰기는
    /// 끝까지 진행됩니다. 실패는 로그와 카운터로만 남기고 전파하지 않습니다.
    async fn persist(&self, record: MarketDataRecord) {
        let store = self.store.clone();
        let counters = self.counters.clone();
        let key = record.key();
        let span = comps_core::retrieval_span!("persist_market_data", key);

        let handle = tokio::spawn(
            async move {
                if let Err(e) = store.upsert(&record).await {
                    inc(&counters.write_failures);
                    error!(error = %e, "Failed to persist market data");
                }
            }
            .instrument(span),
        );

        let wait = self.config.persist_wait();
        match tokio::time::timeout(wait, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                inc(&self.counters.write_failures);
                error!(error = %e, "Persist task did not complete");
            }
            Err(_) => {
                inc(&self.counters.slow_writes);
                warn!(
                    key = %key,
                    wait_ms = self.config.persist_wait_ms,
                    "Persist still running, continuing in background"
                );
            }
        }
    }

    fn respond(&self, record: MarketDataRecord, source: RetrievalSource) -> MarketDataResponse {
        self.emit_audit(&record, source);
        MarketDataResponse::new(record, source)
    }

    fn emit_audit(&self, record: &MarketDataRecord, source: RetrievalSource) {
        let Some(sink) = self.audit.clone() else {
            return;
        };
        let event = RetrievalAuditEvent::from_record(record);

        tokio::spawn(async move {
            match AssertUnwindSafe(sink.emit(event, source)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Audit hook failed"),
                Err(_) => warn!("Audit hook panicked"),
            }
        });
    }

    /// 키에 대한 호출 슬롯을 가져오거나 생성합니다.
    async fn flight(&self, key: &MarketDataKey) -> Arc<Flight> {
        let lock_key = key.cache_key();
        {
            let locks = self.fetch_locks.read().await;
            if let Some(flight) = locks.get(&lock_key) {
                return flight.clone();
            }
        }

        let mut locks = self.fetch_locks.write().await;
        locks.entry(lock_key).or_default().clone()
    }

    /// 더 이상 참조하는 요청이 없으면 슬롯을 제거합니다.
    async fn release_flight(&self, key: &MarketDataKey) {
        let lock_key = key.cache_key();
        let mut locks = self.fetch_locks.write().await;
        if locks
            .get(&lock_key)
            .is_some_and(|flight| Arc::strong_count(flight) == 1)
        {
            locks.remove(&lock_key);
        }
    }

    /// 업스트림 호출이 진행 중이거나 대기 중인 키 수.
    pub async fn in_flight_keys(&self) -> usize {
        self.fetch_locks.read().await.len()
    }

    // =========================================================================
    // 운영
    // =========================================================================

    /// 구성 요소별 헬스 체크.
    pub async fn health_report(&self) -> HealthReport {
        let store = match self.store.health_check().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "Store health check failed");
                false
            }
        };

        let cache = match self.cache.health_check().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "Hot cache health check failed");
                false
            }
        };

        let origin = if self.config.origin_probe {
            let timeout = self.config.origin_timeout();
            let result = match tokio::time::timeout(timeout, self.origin.probe()).await {
                Ok(result) => result,
                Err(_) => Err(OriginError::Unavailable("origin probe timed out".to_string())),
            };
            // probe 결과는 breaker에 기록하지 않음
            if let Err(e) = &result {
                warn!(origin = self.origin.name(), error = %e, "Origin probe failed");
            }
            Some(result.is_ok())
        } else {
            None
        };

        HealthReport {
            store,
            cache,
            origin,
            circuit: self.breaker.state(),
        }
    }

    /// 저장소, 캐시, (설정 시) 업스트림이 모두 정상이면 `true`.
    pub async fn health_check(&self) -> bool {
        self.health_report().await.is_healthy()
    }

    /// 통계 스냅샷.
    pub fn stats(&self) -> ServiceStats {
        let c = &self.counters;
        ServiceStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            store_hits: c.store_hits.load(Ordering::Relaxed),
            origin_fetches: c.origin_fetches.load(Ordering::Relaxed),
            origin_failures: c.origin_failures.load(Ordering::Relaxed),
            stale_serves: c.stale_serves.load(Ordering::Relaxed),
            write_failures: c.write_failures.load(Ordering::Relaxed),
            slow_writes: c.slow_writes.load(Ordering::Relaxed),
            shared_outcomes: c.shared_outcomes.load(Ordering::Relaxed),
            rate_limited: c.rate_limited.load(Ordering::Relaxed),
            circuit_rejections: c.circuit_rejections.load(Ordering::Relaxed),
            circuit: self.breaker.snapshot(),
        }
    }
}
