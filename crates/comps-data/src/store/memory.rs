//! 인메모리 영속 저장소.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use comps_core::{ComparableSale, MarketDataKey, MarketDataRecord, MAX_COMPARABLE_SALES};
use tokio::sync::RwLock;

use super::PersistentStore;
use crate::error::Result;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: MarketDataRecord,
    sales: HashMap<String, ComparableSale>,
    is_active: bool,
}

impl StoredRecord {
    fn materialize(&self) -> MarketDataRecord {
        let mut record = self.record.clone();
        record.comparable_sales = self.sales.values().cloned().collect();
        record.normalize_comparable_sales(MAX_COMPARABLE_SALES);
        record
    }
}

/// 인메모리 영속 저장소.
///
/// PostgreSQL 구현과 같은 규칙을 따릅니다: 복합 키 upsert, 매매 ID 기준 병합,
/// 읽을 때 최신순 20건.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<MarketDataKey, StoredRecord>>>,
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 레코드 수 (비활성 포함).
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// 비어있는지 확인.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn find_by_key(&self, key: &MarketDataKey) -> Result<Option<MarketDataRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .filter(|stored| stored.is_active)
            .map(StoredRecord::materialize))
    }

    async fn find_stale_by_key(
        &self,
        key: &MarketDataKey,
        max_age: Duration,
    ) -> Result<Option<MarketDataRecord>> {
        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .filter(|stored| stored.record.is_within(now, max_age))
            .map(StoredRecord::materialize))
    }

    async fn upsert(&self, record: &MarketDataRecord) -> Result<()> {
        let key = record.key();
        let mut records = self.records.write().await;

        let stored = records.entry(key).or_insert_with(|| StoredRecord {
            record: record.clone(),
            sales: HashMap::new(),
            is_active: true,
        });

        stored.record = MarketDataRecord {
            comparable_sales: Vec::new(),
            ..record.clone()
        };
        stored.is_active = true;
        for sale in &record.comparable_sales {
            stored.sales.insert(sale.id.clone(), sale.clone());
        }

        Ok(())
    }

    async fn deactivate(&self, key: &MarketDataKey) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(match records.get_mut(key) {
            Some(stored) if stored.is_active => {
                stored.is_active = false;
                true
            }
            _ => false,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
