//! 시장 데이터 타입 및 구조체.
//!
//! - `MarketDataRecord` - 지역/매물 유형/기간별 시장 통계와 비교 매매 목록
//! - `ComparableSale` - 개별 비교 매매 거래

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{DataPeriod, MarketDataKey};

/// 레코드당 유지하는 비교 매매 최대 개수.
pub const MAX_COMPARABLE_SALES: usize = 20;

/// 비교 매매 거래.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparableSale {
    /// 데이터 소스가 부여한 고유 ID
    pub id: String,
    /// 주소
    pub address: String,
    /// 교외 지역
    pub suburb: String,
    /// 도시
    pub city: String,
    /// 매물 유형
    pub property_type: String,
    /// 침실 수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i32>,
    /// 욕실 수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<i32>,
    /// 건물 면적 (㎡)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Decimal>,
    /// 대지 면적 (㎡)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_size: Option<Decimal>,
    /// 매매가
    pub sale_price: Decimal,
    /// 매매일
    pub sale_date: DateTime<Utc>,
    /// 시장 체류 일수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_on_market: Option<i32>,
    /// 데이터 소스 태그
    pub source: String,
}

/// 지역/매물 유형/기간별 시장 데이터 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataRecord {
    /// 정규화된 지역명 (소문자)
    pub location: String,
    /// 매물 유형
    pub property_type: String,
    /// 집계 기간
    pub data_period: DataPeriod,
    /// 평균 가격
    pub average_price: Option<Decimal>,
    /// 중위 가격
    pub median_price: Option<Decimal>,
    /// ㎡당 가격
    pub price_per_sqm: Option<Decimal>,
    /// 전체 매물 수
    pub total_listings: Option<i32>,
    /// 거래 완료 매물 수
    pub sold_listings: Option<i32>,
    /// 평균 시장 체류 일수
    pub average_days_on_market: Option<i32>,
    /// 가격 추세 (예: "rising", "stable", "falling")
    pub price_trend: Option<String>,
    /// 추세 변동률 (%)
    pub trend_percentage: Option<Decimal>,
    /// 마지막 갱신 시각
    pub last_updated: DateTime<Utc>,
    /// 비교 매매 목록 (최신순)
    #[serde(default)]
    pub comparable_sales: Vec<ComparableSale>,
}

impl MarketDataRecord {
    /// 통계가 비어있는 새 레코드를 생성합니다.
    pub fn empty(key: &MarketDataKey, last_updated: DateTime<Utc>) -> Self {
        Self {
            location: key.location.clone(),
            property_type: key.property_type.clone(),
            data_period: key.period,
            average_price: None,
            median_price: None,
            price_per_sqm: None,
            total_listings: None,
            sold_listings: None,
            average_days_on_market: None,
            price_trend: None,
            trend_percentage: None,
            last_updated,
            comparable_sales: Vec::new(),
        }
    }

    /// 이 레코드의 복합 키.
    pub fn key(&self) -> MarketDataKey {
        MarketDataKey::new(&self.location, &self.property_type, self.data_period)
    }

    /// 기준 시각 대비 레코드 경과 시간.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_updated
    }

    /// 레코드가 `max_age` 이내인지 확인합니다 (경계 포함).
    pub fn is_within(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }

    /// 비교 매매 목록을 최신순으로 정렬하고 `limit`개로 자릅니다.
    ///
    /// 같은 ID가 중복되면 먼저 나온(더 최신) 항목만 남깁니다.
    pub fn normalize_comparable_sales(&mut self, limit: usize) {
        self.comparable_sales
            .sort_by(|a, b| b.sale_date.cmp(&a.sale_date));

        let mut seen = std::collections::HashSet::new();
        self.comparable_sales.retain(|sale| seen.insert(sale.id.clone()));
        self.comparable_sales.truncate(limit);
    }

    /// 비교 매매 ID 목록.
    pub fn comparable_sale_ids(&self) -> Vec<&str> {
        self.comparable_sales.iter().map(|s| s.id.as_str()).collect()
    }
}
