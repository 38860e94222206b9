//! 업스트림 시장 데이터 API 클라이언트.
//!
//! 업스트림 응답 형식:
//!
//! ```json
//! {
//!   "data": {
//!     "properties": [ { "id": "...", "salePrice": 3500000, "saleDate": "2024-05-01", ... } ],
//!     "marketStats": { "averagePrice": 4200000, "medianPrice": 3900000, ... }
//!   }
//! }
//! ```
//!
//! `properties` 또는 `marketStats`가 null이거나 없으면 빈 결과가 아니라
//! `OriginError::MalformedResponse`로 처리합니다.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use comps_core::{ComparableSale, MarketDataKey, MarketDataRecord};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::OriginConfig;
use crate::error::{OriginError, OriginResult};

/// 업스트림 시장 데이터 제공자 트레잇.
///
/// 테스트에서는 네트워크 없이 동작하는 구현으로 교체할 수 있습니다.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// 제공자 이름 (비교 매매 `source` 태그).
    fn name(&self) -> &str;

    /// 복합 키에 해당하는 시장 데이터를 가져옵니다.
    async fn fetch(&self, key: &MarketDataKey) -> OriginResult<MarketDataRecord>;

    /// 가벼운 연결 확인.
    async fn probe(&self) -> OriginResult<()>;
}

/// reqwest 기반 업스트림 클라이언트.
#[derive(Clone)]
pub struct HttpOriginClient {
    client: reqwest::Client,
    config: OriginConfig,
    api_key: SecretString,
}

impl HttpOriginClient {
    /// 설정으로 클라이언트를 생성합니다.
    pub fn new(config: OriginConfig) -> OriginResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self::with_client(config, client))
    }

    /// 미리 구성된 reqwest 클라이언트를 사용합니다.
    pub fn with_client(mut config: OriginConfig, client: reqwest::Client) -> Self {
        let api_key = SecretString::new(std::mem::take(&mut config.api_key).into());
        Self {
            client,
            config,
            api_key,
        }
    }

    /// 클라이언트 설정.
    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            request
        } else {
            request.bearer_auth(key)
        }
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    fn name(&self) -> &str {
        &self.config.source_name
    }

    #[instrument(skip(self), fields(origin = %self.config.source_name))]
    async fn fetch(&self, key: &MarketDataKey) -> OriginResult<MarketDataRecord> {
        let url = self.config.market_data_url();
        let limit = self.config.comparable_sales_limit.to_string();

        debug!(url = %url, "업스트림 시장 데이터 요청");

        let request = self
            .client
            .get(&url)
            .query(&[
                ("location", key.location.as_str()),
                ("propertyType", key.property_type.as_str()),
                ("period", key.period.as_str()),
                ("includeComparableSales", "true"),
                ("limit", limit.as_str()),
            ])
            .header("Accept", "application/json");

        let response = self.authorize(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let err = OriginError::from_status(status.as_u16(), &body, retry_after);
            warn!(status = status.as_u16(), kind = err.kind(), "업스트림 오류 응답");
            return Err(err);
        }

        let body = response.text().await?;
        parse_market_data(
            key,
            &body,
            &self.config.source_name,
            self.config.comparable_sales_limit,
            Utc::now(),
        )
    }

    #[instrument(skip(self), fields(origin = %self.config.source_name))]
    async fn probe(&self) -> OriginResult<()> {
        let request = self.client.get(self.config.health_url());
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(OriginError::from_status(status.as_u16(), &body, None))
        }
    }
}

// ==================== API 응답 DTO ====================

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    properties: Option<Vec<ApiProperty>>,
    market_stats: Option<ApiMarketStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMarketStats {
    average_price: Option<Decimal>,
    median_price: Option<Decimal>,
    price_per_sqm: Option<Decimal>,
    total_listings: Option<f64>,
    sold_listings: Option<f64>,
    average_days_on_market: Option<f64>,
    price_trend: Option<String>,
    trend_percentage: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProperty {
    id: Option<serde_json::Value>,
    address: Option<String>,
    suburb: Option<String>,
    city: Option<String>,
    property_type: Option<String>,
    bedrooms: Option<f64>,
    bathrooms: Option<f64>,
    size: Option<Decimal>,
    land_size: Option<Decimal>,
    #[serde(alias = "price")]
    sale_price: Option<Decimal>,
    sale_date: Option<String>,
    days_on_market: Option<f64>,
}

/// 업스트림 응답 본문을 시장 데이터 레코드로 변환합니다.
///
/// 가격, 매매일 또는 ID가 없는 매물은 비교 매매에서 제외합니다.
pub fn parse_market_data(
    key: &MarketDataKey,
    body: &str,
    source: &str,
    limit: usize,
    now: DateTime<Utc>,
) -> OriginResult<MarketDataRecord> {
    let envelope: ApiEnvelope = serde_json::from_str(body)?;

    let data = envelope
        .data
        .ok_or_else(|| OriginError::MalformedResponse("missing `data`".to_string()))?;
    let properties = data
        .properties
        .ok_or_else(|| OriginError::MalformedResponse("`properties` is null".to_string()))?;
    let stats = data
        .market_stats
        .ok_or_else(|| OriginError::MalformedResponse("`marketStats` is null".to_string()))?;

    let total = properties.len();
    let comparable_sales: Vec<ComparableSale> = properties
        .into_iter()
        .filter_map(|p| to_comparable_sale(p, key, source))
        .collect();

    if comparable_sales.len() < total {
        debug!(
            skipped = total - comparable_sales.len(),
            "가격/매매일이 없는 매물 제외"
        );
    }

    let mut record = MarketDataRecord {
        location: key.location.clone(),
        property_type: key.property_type.clone(),
        data_period: key.period,
        average_price: stats.average_price,
        median_price: stats.median_price,
        price_per_sqm: stats.price_per_sqm,
        total_listings: round_i32(stats.total_listings),
        sold_listings: round_i32(stats.sold_listings),
        average_days_on_market: round_i32(stats.average_days_on_market),
        price_trend: stats.price_trend,
        trend_percentage: stats.trend_percentage,
        last_updated: now,
        comparable_sales,
    };
    record.normalize_comparable_sales(limit);

    Ok(record)
}

fn to_comparable_sale(p: ApiProperty, key: &MarketDataKey, source: &str) -> Option<ComparableSale> {
    let id = match p.id? {
        serde_json::Value::String(s) if !s.trim().is_empty() => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let sale_price = p.sale_price?;
    let sale_date = p.sale_date.as_deref().and_then(parse_sale_date)?;

    Some(ComparableSale {
        id,
        address: p.address.unwrap_or_default(),
        suburb: p.suburb.unwrap_or_default(),
        city: p.city.unwrap_or_default(),
        property_type: p
            .property_type
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_else(|| key.property_type.clone()),
        bedrooms: round_i32(p.bedrooms),
        bathrooms: round_i32(p.bathrooms),
        size: p.size,
        land_size: p.land_size,
        sale_price,
        sale_date,
        days_on_market: round_i32(p.days_on_market),
        source: source.to_string(),
    })
}

/// RFC3339 또는 `YYYY-MM-DD` 형식의 매매일 파싱.
fn parse_sale_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn round_i32(value: Option<f64>) -> Option<i32> {
    value.filter(|v| v.is_finite()).map(|v| v.round() as i32)
}
