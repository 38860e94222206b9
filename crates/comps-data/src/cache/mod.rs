//! 핫 캐시 레이어.
//!
//! 저장소의 TTL 메커니즘(예: Redis `SETEX`)과 별개로, 모든 읽기는 항목에 기록된
//! 만료 시각을 현재 시각과 다시 비교합니다. 만료된 항목은 미스로 취급하며
//! 삭제는 호출자가 담당합니다.

mod memory;

pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use comps_core::{MarketDataKey, MarketDataRecord};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// 캐시 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 복합 캐시 키
    pub key: String,
    /// 캐시된 레코드
    pub record: MarketDataRecord,
    /// 절대 만료 시각
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// `now`부터 `ttl` 동안 유효한 항목을 생성합니다.
    pub fn new(record: MarketDataRecord, ttl: Duration, now: DateTime<Utc>) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DataError::InvalidData(format!("invalid cache ttl: {}", e)))?;

        Ok(Self {
            key: record.key().cache_key(),
            record,
            expires_at: now + ttl,
        })
    }

    /// 만료 여부. `expires_at <= now`이면 만료입니다.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 캐시 조회 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// 유효한 항목
    Hit(MarketDataRecord),
    /// 항목 없음
    Miss,
    /// 항목은 있으나 만료됨 (호출자가 삭제해야 함)
    Expired,
}

impl CacheLookup {
    /// 적중한 레코드를 반환합니다.
    pub fn into_hit(self) -> Option<MarketDataRecord> {
        match self {
            CacheLookup::Hit(record) => Some(record),
            _ => None,
        }
    }
}

/// 시장 데이터 핫 캐시.
#[async_trait]
pub trait HotCache: Send + Sync {
    /// 저장된 항목을 만료 여부와 관계없이 반환합니다.
    async fn get(&self, key: &MarketDataKey) -> Result<Option<CacheEntry>>;

    /// 레코드를 `ttl` 동안 캐시합니다.
    async fn set(&self, record: &MarketDataRecord, ttl: Duration) -> Result<()>;

    /// 항목을 삭제합니다. 삭제된 항목이 있으면 `true`.
    async fn delete(&self, key: &MarketDataKey) -> Result<bool>;

    /// 캐시 연결 상태 확인.
    async fn health_check(&self) -> Result<bool>;

    /// 만료 시각을 직접 확인하는 조회.
    async fn lookup(&self, key: &MarketDataKey, now: DateTime<Utc>) -> Result<CacheLookup> {
        Ok(match self.get(key).await? {
            None => CacheLookup::Miss,
            Some(entry) if entry.is_expired(now) => CacheLookup::Expired,
            Some(entry) => CacheLookup::Hit(entry.record),
        })
    }
}
