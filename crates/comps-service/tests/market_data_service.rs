//! MarketDataService 통합 테스트.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{expired_entry, harness, sample_record, BrokenAuditSink, ChannelAuditSink};
use comps_core::{DataPeriod, MarketDataKey, MarketDataRequest, RetrievalSource};
use comps_data::{HotCache, PersistentStore};
use comps_origin::{CircuitState, OriginError};
use comps_service::MarketDataError;

fn cape_town_request() -> MarketDataRequest {
    MarketDataRequest::new("Cape Town")
        .with_property_type("house")
        .with_period(DataPeriod::SixMonths)
}

fn cape_town_key() -> MarketDataKey {
    MarketDataKey::new("Cape Town", "house", DataPeriod::SixMonths)
}

// =============================================================================
// 기본 시나리오
// =============================================================================

#[tokio::test]
async fn test_cold_miss_fetches_origin_once_and_populates_both_layers() {
    let h = harness().build();

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert!(!response.cached);
    assert_eq!(response.source, RetrievalSource::Origin);
    assert_eq!(response.record.location, "cape town");
    assert_eq!(h.origin.calls(), 1);

    let cached = h.cache.inner.get(&cape_town_key()).await.unwrap().unwrap();
    assert_eq!(cached.record, response.record);
    assert!(cached.expires_at > Utc::now());

    let stored = h.store.inner.find_by_key(&cape_town_key()).await.unwrap().unwrap();
    assert_eq!(stored.comparable_sale_ids(), response.record.comparable_sale_ids());
    assert_eq!(stored.average_price, response.record.average_price);
}

#[tokio::test]
async fn test_repeat_within_ttl_is_served_from_hot_cache() {
    let h = harness().build();

    h.service.get_market_data(&cape_town_request()).await.unwrap();
    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert!(response.cached);
    assert_eq!(response.source, RetrievalSource::HotCache);
    assert_eq!(h.origin.calls(), 1);
    assert_eq!(h.service.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_origin_failure_serves_two_day_old_record() {
    let h = harness().build();
    let old = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::days(2));
    h.store.inner.upsert(&old).await.unwrap();
    h.origin.fail_with(OriginError::Unavailable("HTTP 503".into()));

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert!(response.cached);
    assert_eq!(response.source, RetrievalSource::Stale);
    assert_eq!(response.record.last_updated, old.last_updated);
    assert_eq!(response.record.average_price, old.average_price);
    assert_eq!(h.origin.calls(), 1);
    assert_eq!(h.breaker.snapshot().consecutive_failures, 1);
    assert_eq!(h.service.stats().stale_serves, 1);
}

#[tokio::test]
async fn test_origin_failure_without_recent_record_propagates_origin_error() {
    let h = harness().build();
    let ancient = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::days(8));
    h.store.inner.upsert(&ancient).await.unwrap();
    h.origin.fail_with(OriginError::Unavailable("HTTP 502".into()));

    let err = h.service.get_market_data(&cape_town_request()).await.unwrap_err();

    assert!(matches!(err, MarketDataError::Origin(OriginError::Unavailable(_))));
    assert!(!err.is_not_found());
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_empty_location_fails_before_any_interaction() {
    let h = harness().build();

    for location in ["", "   "] {
        let err = h
            .service
            .get_market_data(&MarketDataRequest::new(location))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Validation(_)));
    }

    assert_eq!(h.limiter.tracked_identifiers(), 0);
    assert_eq!(h.origin.calls(), 0);
    assert_eq!(h.cache.calls(), 0);
    assert_eq!(h.store.calls(), 0);
    let snapshot = h.breaker.snapshot();
    assert_eq!(snapshot.total_failures + snapshot.total_successes, 0);
}

// =============================================================================
// 계층별 동작
// =============================================================================

#[tokio::test]
async fn test_fresh_store_record_skips_origin_and_warms_cache() {
    let h = harness().build();
    let recent = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::hours(3));
    h.store.inner.upsert(&recent).await.unwrap();

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert!(!response.cached);
    assert_eq!(response.source, RetrievalSource::Store);
    assert_eq!(h.origin.calls(), 0);
    assert!(h.cache.inner.get(&cape_town_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_record_older_than_freshness_window_refetches() {
    let h = harness().build();
    let yesterday = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::hours(25));
    h.store.inner.upsert(&yesterday).await.unwrap();

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert_eq!(response.source, RetrievalSource::Origin);
    assert_eq!(h.origin.calls(), 1);
    let stored = h.store.inner.find_by_key(&cape_town_key()).await.unwrap().unwrap();
    assert!(stored.last_updated > yesterday.last_updated);
}

#[tokio::test]
async fn test_expired_cache_entry_is_evicted_and_treated_as_miss() {
    let h = harness().build();
    let stale_cached = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::hours(30));
    h.cache.inner.insert_entry(expired_entry(stale_cached)).await;

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert_eq!(response.source, RetrievalSource::Origin);
    let entry = h.cache.inner.get(&cape_town_key()).await.unwrap().unwrap();
    assert!(entry.expires_at > Utc::now());
    assert_eq!(entry.record, response.record);
}

#[tokio::test]
async fn test_cache_failures_do_not_fail_the_request() {
    let h = harness().build();
    h.cache.fail(true);

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert_eq!(response.source, RetrievalSource::Origin);
    assert!(h.store.inner.find_by_key(&cape_town_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_write_failure_is_swallowed() {
    let h = harness().build();
    h.store.fail_writes(true);

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert!(!response.cached);
    assert_eq!(response.source, RetrievalSource::Origin);
    assert_eq!(h.service.stats().write_failures, 1);
    assert!(h.store.inner.is_empty().await);
    assert!(h.cache.inner.get(&cape_town_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_read_failure_is_treated_as_miss() {
    let h = harness().build();
    h.store.fail_reads(true);

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();
    assert_eq!(response.source, RetrievalSource::Origin);

    h.cache.inner.delete(&cape_town_key()).await.unwrap();
    h.origin.fail_with(OriginError::Unavailable("down".into()));

    let err = h.service.get_market_data(&cape_town_request()).await.unwrap_err();
    assert!(matches!(err, MarketDataError::Origin(_)));
}

#[tokio::test]
async fn test_request_defaults_are_applied() {
    let h = harness().build();

    let response = h
        .service
        .get_market_data(&MarketDataRequest::new("  Stellenbosch "))
        .await
        .unwrap();

    assert_eq!(response.record.location, "stellenbosch");
    assert_eq!(response.record.property_type, "house");
    assert_eq!(response.record.data_period, DataPeriod::SixMonths);
}

// =============================================================================
// Rate limit / Circuit breaker
// =============================================================================

#[tokio::test]
async fn test_rate_limit_is_keyed_by_normalized_location() {
    let h = harness().rate_limit(2, Duration::from_secs(60)).build();

    h.service
        .get_market_data(&MarketDataRequest::new("Cape Town"))
        .await
        .unwrap();
    h.service
        .get_market_data(&MarketDataRequest::new("cape   town"))
        .await
        .unwrap();

    let err = h
        .service
        .get_market_data(&MarketDataRequest::new("CAPE TOWN"))
        .await
        .unwrap_err();
    match err {
        MarketDataError::RateLimitExceeded {
            identifier,
            retry_after,
        } => {
            assert_eq!(identifier, "cape town");
            assert!(retry_after.is_some());
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 다른 지역은 영향 없음
    h.service
        .get_market_data(&MarketDataRequest::new("Durban"))
        .await
        .unwrap();
    assert_eq!(h.service.stats().rate_limited, 1);
}

#[tokio::test]
async fn test_circuit_opens_after_five_failures_and_fails_fast() {
    let h = harness().build();
    h.origin.fail_with(OriginError::Unavailable("HTTP 500".into()));

    for _ in 0..5 {
        let err = h.service.get_market_data(&cape_town_request()).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Origin(_)));
    }
    assert_eq!(h.breaker.state(), CircuitState::Open);

    let err = h.service.get_market_data(&cape_town_request()).await.unwrap_err();
    assert!(matches!(err, MarketDataError::CircuitOpen { retry_after: Some(_) }));
    assert_eq!(h.origin.calls(), 5);
    assert_eq!(h.service.stats().circuit_rejections, 1);
}

#[tokio::test]
async fn test_circuit_recovers_after_cool_down() {
    let h = harness().breaker(1, Duration::from_millis(50)).build();
    h.origin.fail_with(OriginError::Unavailable("HTTP 500".into()));

    h.service.get_market_data(&cape_town_request()).await.unwrap_err();
    assert!(matches!(
        h.service.get_market_data(&cape_town_request()).await,
        Err(MarketDataError::CircuitOpen { .. })
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;
    h.origin.succeed();

    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();
    assert_eq!(response.source, RetrievalSource::Origin);
    assert_eq!(h.breaker.state(), CircuitState::Closed);
    assert_eq!(h.breaker.snapshot().consecutive_failures, 0);
}

#[tokio::test]
async fn test_every_origin_error_kind_counts_as_breaker_failure() {
    let h = harness().breaker(3, Duration::from_secs(60)).build();

    for err in [
        OriginError::Auth("HTTP 401".into()),
        OriginError::RateLimited { retry_after_secs: Some(5) },
        OriginError::MalformedResponse("`marketStats` is null".into()),
    ] {
        h.origin.fail_with(err);
        h.service.get_market_data(&cape_town_request()).await.unwrap_err();
    }

    assert_eq!(h.breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_origin_timeout_maps_to_unavailable() {
    let h = harness()
        .config(|c| c.origin_timeout_ms = Some(50))
        .build();
    h.origin.set_latency(Duration::from_millis(300));

    let err = h.service.get_market_data(&cape_town_request()).await.unwrap_err();

    assert!(matches!(err, MarketDataError::Origin(OriginError::Unavailable(_))));
    assert_eq!(h.breaker.snapshot().total_failures, 1);
}

// =============================================================================
// 동시성
// =============================================================================

#[tokio::test]
async fn test_single_flight_coalesces_concurrent_misses() {
    let h = Arc::new(harness().build());
    h.origin.set_latency(Duration::from_millis(100));

    let requests = (0..10).map(|_| {
        let h = h.clone();
        async move { h.service.get_market_data(&cape_town_request()).await }
    });
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.origin.calls(), 1);
    let from_origin = results
        .iter()
        .filter(|r| matches!(r, Ok(resp) if resp.source == RetrievalSource::Origin))
        .count();
    assert_eq!(from_origin, 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_origin_failure() {
    let h = Arc::new(harness().build());
    h.origin.set_latency(Duration::from_millis(100));
    h.origin.fail_with(OriginError::Unavailable("HTTP 503".into()));

    let started = std::time::Instant::now();
    let requests = (0..8).map(|_| {
        let h = h.clone();
        async move { h.service.get_market_data(&cape_town_request()).await }
    });
    let results = futures::future::join_all(requests).await;

    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(MarketDataError::Origin(OriginError::Unavailable(_))))));
    assert_eq!(h.origin.calls(), 1);
    assert_eq!(h.breaker.snapshot().total_failures, 1);
    assert_eq!(h.service.stats().shared_outcomes, 7);
    assert_eq!(h.service.in_flight_keys().await, 0);

    // 이후 요청은 다시 업스트림을 시도
    h.origin.set_latency(Duration::ZERO);
    h.origin.succeed();
    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();
    assert_eq!(response.source, RetrievalSource::Origin);
    assert_eq!(h.origin.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_misses_fall_back_to_stale_after_shared_failure() {
    let h = Arc::new(harness().build());
    let old = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::days(2));
    h.store.inner.upsert(&old).await.unwrap();
    h.origin.set_latency(Duration::from_millis(100));
    h.origin.fail_with(OriginError::Unavailable("connect timeout".into()));

    let requests = (0..8).map(|_| {
        let h = h.clone();
        async move { h.service.get_market_data(&cape_town_request()).await }
    });
    let results = futures::future::join_all(requests).await;

    for result in &results {
        let response = result.as_ref().unwrap();
        assert_eq!(response.source, RetrievalSource::Stale);
        assert_eq!(response.record.last_updated, old.last_updated);
    }
    assert_eq!(h.origin.calls(), 1);
    assert_eq!(h.breaker.snapshot().consecutive_failures, 1);
    assert_eq!(h.service.stats().stale_serves, 8);
}

#[tokio::test]
async fn test_in_flight_slots_are_released_per_key() {
    let h = Arc::new(harness().build());
    h.origin.set_latency(Duration::from_millis(20));

    let requests = (0..20).map(|i| {
        let h = h.clone();
        async move {
            let request = MarketDataRequest {
                location: format!("Suburb {}", i),
                property_type: None,
                period: None,
            };
            h.service.get_market_data(&request).await
        }
    });
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.origin.calls(), 20);
    assert_eq!(h.service.in_flight_keys().await, 0);
}

#[tokio::test]
async fn test_without_single_flight_concurrent_misses_all_reach_origin() {
    let h = Arc::new(harness().config(|c| c.single_flight = false).build());
    h.origin.set_latency(Duration::from_millis(100));

    let requests = (0..5).map(|_| {
        let h = h.clone();
        async move { h.service.get_market_data(&cape_town_request()).await }
    });
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(h.origin.calls() > 1);
}

#[tokio::test]
async fn test_persist_completes_after_caller_is_cancelled() {
    let h = harness().build();
    h.store.set_write_latency(Duration::from_millis(150));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        h.service.get_market_data(&cape_town_request()),
    )
    .await;
    assert!(outcome.is_err(), "caller should stop waiting");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.store.inner.find_by_key(&cape_town_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_slow_persist_does_not_hold_the_response() {
    let h = harness().config(|c| c.persist_wait_ms = 50).build();
    h.store.set_write_latency(Duration::from_millis(500));

    let started = std::time::Instant::now();
    let response = h.service.get_market_data(&cape_town_request()).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(response.source, RetrievalSource::Origin);
    assert_eq!(h.service.stats().slow_writes, 1);
    assert_eq!(h.service.stats().write_failures, 0);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(h.store.inner.find_by_key(&cape_town_key()).await.unwrap().is_some());
}

// =============================================================================
// 읽기 전용 조회
// =============================================================================

#[tokio::test]
async fn test_cached_read_path_never_calls_origin() {
    let h = harness().build();

    let err = h
        .service
        .get_cached_market_data(&cape_town_request())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let old = sample_record(&cape_town_key(), Utc::now() - chrono::Duration::days(3));
    h.store.inner.upsert(&old).await.unwrap();
    let response = h
        .service
        .get_cached_market_data(&cape_town_request())
        .await
        .unwrap();
    assert_eq!(response.source, RetrievalSource::Stale);
    assert!(response.cached);

    assert_eq!(h.origin.calls(), 0);
}

#[tokio::test]
async fn test_cached_read_path_surfaces_storage_errors() {
    let h = harness().build();
    h.store.fail_reads(true);

    let err = h
        .service
        .get_cached_market_data(&cape_town_request())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketDataError::Storage(_)));
}

// =============================================================================
// 감사 훅 / 헬스 체크
// =============================================================================

#[tokio::test]
async fn test_audit_hook_receives_one_event_per_success() {
    let (sink, mut rx) = ChannelAuditSink::new();
    let h = harness().audit(sink).build();

    h.service.get_market_data(&cape_town_request()).await.unwrap();
    h.service.get_market_data(&cape_town_request()).await.unwrap();

    let mut sources = Vec::new();
    for _ in 0..2 {
        let (event, source) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.location, "cape town");
        assert_eq!(event.property_type, "house");
        assert_eq!(event.period, DataPeriod::SixMonths);
        assert_eq!(event.comparable_sale_count, 3);
        sources.push(source);
    }
    assert!(sources.contains(&RetrievalSource::Origin));
    assert!(sources.contains(&RetrievalSource::HotCache));

    // 실패한 조회는 이벤트 없음
    h.origin.fail_with(OriginError::Auth("HTTP 403".into()));
    h.service
        .get_market_data(&MarketDataRequest::new("Nowhere"))
        .await
        .unwrap_err();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_broken_audit_hook_does_not_affect_result() {
    for panic in [false, true] {
        let h = harness().audit(Arc::new(BrokenAuditSink { panic })).build();

        let response = h.service.get_market_data(&cape_town_request()).await.unwrap();
        assert_eq!(response.source, RetrievalSource::Origin);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = harness().build();
    assert!(h.service.health_check().await);

    let report = h.service.health_report().await;
    assert!(report.origin.is_none());
    assert_eq!(report.circuit, CircuitState::Closed);
    assert_eq!(h.origin.probes(), 0);

    h.store.fail_reads(true);
    assert!(!h.service.health_check().await);
}

#[tokio::test]
async fn test_health_check_with_origin_probe() {
    let h = harness().config(|c| c.origin_probe = true).build();
    assert!(h.service.health_check().await);
    assert_eq!(h.origin.probes(), 1);

    h.origin.fail_with(OriginError::Unavailable("HTTP 503".into()));
    let report = h.service.health_report().await;
    assert_eq!(report.origin, Some(false));
    assert!(!report.is_healthy());

    // 헬스 체크는 circuit 상태를 바꾸지 않음
    let snapshot = h.breaker.snapshot();
    assert_eq!(snapshot.total_failures, 0);
    assert_eq!(snapshot.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_failing_health_checks_never_open_the_circuit() {
    let h = harness()
        .config(|c| c.origin_probe = true)
        .breaker(1, Duration::from_secs(60))
        .build();
    h.origin.fail_with(OriginError::Unavailable("HTTP 503".into()));

    for _ in 0..3 {
        assert_eq!(h.service.health_report().await.origin, Some(false));
    }

    assert_eq!(h.breaker.state(), CircuitState::Closed);
    h.origin.succeed();
    assert!(h.service.get_market_data(&cape_town_request()).await.is_ok());
    assert_eq!(h.origin.calls(), 1);
}
