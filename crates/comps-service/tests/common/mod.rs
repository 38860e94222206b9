//! 오케스트레이터 테스트용 대역(test double).

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use comps_core::{ComparableSale, MarketDataKey, MarketDataRecord, RetrievalSource};
use comps_data::{
    CacheEntry, DataError, HotCache, MemoryCache, MemoryStore, PersistentStore,
};
use comps_origin::{CircuitBreaker, CircuitBreakerConfig, OriginClient, OriginError, OriginResult};
use comps_service::{
    AuditSink, MarketDataService, RateLimiter, RetrievalAuditEvent, ServiceConfig,
};
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

// =============================================================================
// 샘플 데이터
// =============================================================================

pub fn sample_record(key: &MarketDataKey, last_updated: DateTime<Utc>) -> MarketDataRecord {
    let mut record = MarketDataRecord::empty(key, last_updated);
    record.average_price = Some(dec!(4200000));
    record.median_price = Some(dec!(3900000));
    record.total_listings = Some(120);
    record.sold_listings = Some(37);
    record.price_trend = Some("rising".to_string());
    record.comparable_sales = (1..=3)
        .map(|i| ComparableSale {
            id: format!("sale-{}", i),
            address: format!("{} Kloof St", i),
            suburb: "Gardens".to_string(),
            city: "Cape Town".to_string(),
            property_type: key.property_type.clone(),
            bedrooms: Some(3),
            bathrooms: Some(2),
            size: Some(dec!(180)),
            land_size: None,
            sale_price: dec!(3500000) + rust_decimal::Decimal::from(i * 10_000),
            sale_date: last_updated - chrono::Duration::days(i as i64 * 7),
            days_on_market: Some(30),
            source: "scripted".to_string(),
        })
        .collect();
    record
}

// =============================================================================
// 업스트림 대역
// =============================================================================

/// 호출 횟수를 세고, 실패와 지연을 주입할 수 있는 업스트림.
#[derive(Default)]
pub struct ScriptedOrigin {
    calls: AtomicUsize,
    probes: AtomicUsize,
    failure: Mutex<Option<OriginError>>,
    latency: Mutex<Duration>,
}

impl ScriptedOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, err: OriginError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginClient for ScriptedOrigin {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, key: &MarketDataKey) -> OriginResult<MarketDataRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(sample_record(key, Utc::now())),
        }
    }

    async fn probe(&self) -> OriginResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// =============================================================================
// 저장소/캐시 대역
// =============================================================================

/// 호출 횟수를 세고 읽기/쓰기 실패와 쓰기 지연을 주입할 수 있는 저장소.
#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    calls: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_latency: Mutex<Duration>,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_latency(&self, latency: Duration) {
        *self.write_latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> comps_data::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(DataError::ConnectionError("injected read failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistentStore for InstrumentedStore {
    async fn find_by_key(&self, key: &MarketDataKey) -> comps_data::Result<Option<MarketDataRecord>> {
        self.check_read()?;
        self.inner.find_by_key(key).await
    }

    async fn find_stale_by_key(
        &self,
        key: &MarketDataKey,
        max_age: chrono::Duration,
    ) -> comps_data::Result<Option<MarketDataRecord>> {
        self.check_read()?;
        self.inner.find_stale_by_key(key, max_age).await
    }

    async fn upsert(&self, record: &MarketDataRecord) -> comps_data::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.write_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DataError::QueryError("injected write failure".to_string()));
        }
        self.inner.upsert(record).await
    }

    async fn deactivate(&self, key: &MarketDataKey) -> comps_data::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.deactivate(key).await
    }

    async fn health_check(&self) -> comps_data::Result<bool> {
        self.check_read()?;
        Ok(true)
    }
}

/// 호출 횟수를 세는 캐시.
#[derive(Default)]
pub struct InstrumentedCache {
    pub inner: MemoryCache,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl InstrumentedCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> comps_data::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(DataError::CacheError("injected cache failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HotCache for InstrumentedCache {
    async fn get(&self, key: &MarketDataKey) -> comps_data::Result<Option<CacheEntry>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, record: &MarketDataRecord, ttl: Duration) -> comps_data::Result<()> {
        self.check()?;
        self.inner.set(record, ttl).await
    }

    async fn delete(&self, key: &MarketDataKey) -> comps_data::Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> comps_data::Result<bool> {
        self.check()?;
        Ok(true)
    }
}

// =============================================================================
// 감사 훅 대역
// =============================================================================

/// 수신한 이벤트를 채널로 전달하는 감사 훅.
pub struct ChannelAuditSink {
    tx: mpsc::UnboundedSender<(RetrievalAuditEvent, RetrievalSource)>,
}

impl ChannelAuditSink {
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<(RetrievalAuditEvent, RetrievalSource)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn emit(
        &self,
        event: RetrievalAuditEvent,
        source: RetrievalSource,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.tx.send((event, source))?;
        Ok(())
    }
}

/// 항상 실패하거나 패닉하는 감사 훅.
pub struct BrokenAuditSink {
    pub panic: bool,
}

#[async_trait]
impl AuditSink for BrokenAuditSink {
    async fn emit(
        &self,
        _event: RetrievalAuditEvent,
        _source: RetrievalSource,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.panic {
            panic!("audit backend exploded");
        }
        Err("audit backend unavailable".into())
    }
}

// =============================================================================
// 하네스
// =============================================================================

pub struct Harness {
    pub service: MarketDataService,
    pub cache: Arc<InstrumentedCache>,
    pub store: Arc<InstrumentedStore>,
    pub origin: Arc<ScriptedOrigin>,
    pub limiter: Arc<RateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
}

pub struct HarnessBuilder {
    config: ServiceConfig,
    limiter: RateLimiter,
    breaker: CircuitBreakerConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl HarnessBuilder {
    pub fn config(mut self, f: impl FnOnce(&mut ServiceConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.limiter = RateLimiter::new(max_requests, window);
        self
    }

    pub fn breaker(mut self, failure_threshold: u32, cool_down: Duration) -> Self {
        self.breaker = CircuitBreakerConfig::new(failure_threshold, cool_down);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn build(self) -> Harness {
        let cache = InstrumentedCache::new();
        let store = InstrumentedStore::new();
        let origin = ScriptedOrigin::new();
        let limiter = Arc::new(self.limiter);
        let breaker = Arc::new(CircuitBreaker::new("scripted", self.breaker));

        let mut service = MarketDataService::new(
            cache.clone(),
            store.clone(),
            origin.clone(),
            limiter.clone(),
            breaker.clone(),
            self.config,
        );
        if let Some(sink) = self.audit {
            service = service.with_audit_sink(sink);
        }

        Harness {
            service,
            cache,
            store,
            origin,
            limiter,
            breaker,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        config: ServiceConfig::default(),
        limiter: RateLimiter::new(1000, Duration::from_secs(60)),
        breaker: CircuitBreakerConfig::default(),
        audit: None,
    }
}

/// 오래된 만료 시각을 가진 캐시 항목.
pub fn expired_entry(record: MarketDataRecord) -> CacheEntry {
    CacheEntry {
        key: record.key().cache_key(),
        expires_at: Utc::now() - chrono::Duration::seconds(1),
        record,
    }
}
