//! 인메모리 핫 캐시.
//!
//! 단일 프로세스 배포와 테스트에서 Redis 대신 사용합니다.
//! 저장소 수준의 자동 만료는 하지 않으며, 만료 판단은 `HotCache::lookup`이 합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use comps_core::{MarketDataKey, MarketDataRecord};
use tokio::sync::RwLock;

use super::{CacheEntry, HotCache};
use crate::error::Result;

/// 인메모리 핫 캐시.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    /// 빈 캐시를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 항목을 그대로 저장합니다 (만료 시각 직접 지정).
    pub async fn insert_entry(&self, entry: CacheEntry) {
        self.entries.write().await.insert(entry.key.clone(), entry);
    }

    /// 저장된 항목 수 (만료된 항목 포함).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 비어있는지 확인.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl HotCache for MemoryCache {
    async fn get(&self, key: &MarketDataKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(&key.cache_key()).cloned())
    }

    async fn set(&self, record: &MarketDataRecord, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(record.clone(), ttl, Utc::now())?;
        self.insert_entry(entry).await;
        Ok(())
    }

    async fn delete(&self, key: &MarketDataKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(&key.cache_key()).is_some())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
