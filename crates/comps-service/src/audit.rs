//! 조회 감사(audit) 훅.
//!
//! 성공한 조회마다 한 번 호출되며, 개인정보 없이 키와 비교 매매 개수만 전달합니다.
//! 훅 실패는 조회 결과에 영향을 주지 않습니다.

use async_trait::async_trait;
use comps_core::{DataPeriod, MarketDataRecord, RetrievalSource};
use serde::Serialize;
use tracing::info;

/// 감사 이벤트.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalAuditEvent {
    /// 정규화된 지역명
    pub location: String,
    /// 매물 유형
    pub property_type: String,
    /// 집계 기간
    pub period: DataPeriod,
    /// 응답에 포함된 비교 매매 개수
    pub comparable_sale_count: usize,
}

impl RetrievalAuditEvent {
    /// 레코드에서 이벤트 생성.
    pub fn from_record(record: &MarketDataRecord) -> Self {
        Self {
            location: record.location.clone(),
            property_type: record.property_type.clone(),
            period: record.data_period,
            comparable_sale_count: record.comparable_sales.len(),
        }
    }
}

/// 감사 이벤트 수신자.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// 이벤트를 전달합니다.
    async fn emit(
        &self,
        event: RetrievalAuditEvent,
        source: RetrievalSource,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// 이벤트를 `tracing` 로그로 남기는 기본 구현.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(
        &self,
        event: RetrievalAuditEvent,
        source: RetrievalSource,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            target: "comps::audit",
            location = %event.location,
            property_type = %event.property_type,
            period = %event.period,
            comparable_sale_count = event.comparable_sale_count,
            source = %source,
            "Market data retrieved"
        );
        Ok(())
    }
}
