//! 조회 요청 및 응답 타입.

use serde::{Deserialize, Serialize};

use crate::domain::market_data::MarketDataRecord;
use crate::error::{CoreError, CoreResult};
use crate::types::{DataPeriod, MarketDataKey};

/// 요청에서 생략된 필드에 적용되는 기본값.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDefaults {
    /// 기본 매물 유형
    pub property_type: String,
    /// 기본 집계 기간
    pub period: DataPeriod,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            property_type: "house".to_string(),
            period: DataPeriod::SixMonths,
        }
    }
}

/// 시장 데이터 조회 요청.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataRequest {
    /// 지역명 (필수)
    pub location: String,
    /// 매물 유형 (생략 시 "house")
    #[serde(default)]
    pub property_type: Option<String>,
    /// 집계 기간 (생략 시 6개월)
    #[serde(default)]
    pub period: Option<DataPeriod>,
}

impl MarketDataRequest {
    /// 지역명만 지정한 요청을 생성합니다.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    /// 매물 유형을 지정합니다.
    pub fn with_property_type(mut self, property_type: impl Into<String>) -> Self {
        self.property_type = Some(property_type.into());
        self
    }

    /// 집계 기간을 지정합니다.
    pub fn with_period(mut self, period: DataPeriod) -> Self {
        self.period = Some(period);
        self
    }

    /// 요청을 검증하고 정규화된 복합 키를 반환합니다.
    ///
    /// 지역명이 비어있으면 `CoreError::InvalidInput`을 반환합니다.
    /// 빈 매물 유형은 생략된 것으로 취급합니다.
    pub fn validate(&self, defaults: &RequestDefaults) -> CoreResult<MarketDataKey> {
        if self.location.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "location must not be empty".to_string(),
            ));
        }

        let property_type = self
            .property_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&defaults.property_type);

        let period = self.period.unwrap_or(defaults.period);

        Ok(MarketDataKey::new(&self.location, property_type, period))
    }
}

/// 응답 데이터가 어느 계층에서 왔는지 나타냅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    /// 핫 캐시 적중
    HotCache,
    /// 저장소의 신선한 레코드
    Store,
    /// 업스트림에서 새로 가져옴
    Origin,
    /// 업스트림 실패 후 오래된 레코드로 대체
    Stale,
}

impl RetrievalSource {
    /// 응답의 `cached` 플래그 값.
    pub fn is_cached(&self) -> bool {
        matches!(self, RetrievalSource::HotCache | RetrievalSource::Stale)
    }
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalSource::HotCache => write!(f, "hot_cache"),
            RetrievalSource::Store => write!(f, "store"),
            RetrievalSource::Origin => write!(f, "origin"),
            RetrievalSource::Stale => write!(f, "stale"),
        }
    }
}

/// 시장 데이터 조회 응답.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataResponse {
    /// 시장 데이터 레코드
    #[serde(flatten)]
    pub record: MarketDataRecord,
    /// 캐시(핫 캐시 또는 오래된 대체 레코드)에서 제공되었는지 여부
    pub cached: bool,
    /// 제공 계층
    pub source: RetrievalSource,
}

impl MarketDataResponse {
    /// 레코드와 제공 계층으로 응답을 생성합니다.
    pub fn new(record: MarketDataRecord, source: RetrievalSource) -> Self {
        Self {
            record,
            cached: source.is_cached(),
            source,
        }
    }
}
