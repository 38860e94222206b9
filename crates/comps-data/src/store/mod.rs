//! 영속 저장소 레이어.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::Duration;
use comps_core::{MarketDataKey, MarketDataRecord};

use crate::error::Result;

/// 시장 데이터 영속 저장소.
///
/// 레코드는 `(location, property_type, period)` 복합 키로 식별되고,
/// 비교 매매는 매매 ID로 식별됩니다.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// 활성 레코드를 조회합니다 (신선도 판단은 호출자 몫).
    async fn find_by_key(&self, key: &MarketDataKey) -> Result<Option<MarketDataRecord>>;

    /// `max_age` 이내의 레코드를 활성 여부와 무관하게 조회합니다.
    async fn find_stale_by_key(
        &self,
        key: &MarketDataKey,
        max_age: Duration,
    ) -> Result<Option<MarketDataRecord>>;

    /// 복합 키 기준으로 생성 또는 교체하고, 비교 매매를 ID 기준으로 upsert합니다.
    async fn upsert(&self, record: &MarketDataRecord) -> Result<()>;

    /// 레코드를 비활성화합니다 (soft delete).
    async fn deactivate(&self, key: &MarketDataKey) -> Result<bool>;

    /// 저장소 연결 상태 확인.
    async fn health_check(&self) -> Result<bool>;
}
