//! 시장 데이터 복합 키.
//!
//! 캐시와 저장소 모두 `(location, property_type, period)` 조합으로 레코드를 식별합니다.
//! 키를 만들 때 지역명과 매물 유형을 정규화하여 "Cape Town"과 " cape  town "이
//! 같은 레코드를 가리키도록 합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::DataPeriod;

/// 지역명 정규화: 앞뒤 공백 제거, 소문자 변환, 연속 공백 축약.
pub fn normalize_location(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 매물 유형 정규화.
pub fn normalize_property_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// 시장 데이터 복합 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketDataKey {
    /// 정규화된 지역명
    pub location: String,
    /// 정규화된 매물 유형
    pub property_type: String,
    /// 집계 기간
    pub period: DataPeriod,
}

impl MarketDataKey {
    /// 원시 입력에서 정규화된 키를 생성합니다.
    pub fn new(location: &str, property_type: &str, period: DataPeriod) -> Self {
        Self {
            location: normalize_location(location),
            property_type: normalize_property_type(property_type),
            period,
        }
    }

    /// 핫 캐시 키.
    pub fn cache_key(&self) -> String {
        format!(
            "market_data:{}:{}:{}",
            self.location, self.property_type, self.period
        )
    }
}

impl fmt::Display for MarketDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.location, self.property_type, self.period)
    }
}
