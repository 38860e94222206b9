//! 시장 데이터 집계 기간 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 시장 통계 집계 기간.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataPeriod {
    /// 최근 3개월
    #[serde(rename = "3months")]
    ThreeMonths,
    /// 최근 6개월 (기본값)
    #[default]
    #[serde(rename = "6months")]
    SixMonths,
    /// 최근 1년
    #[serde(rename = "1year")]
    OneYear,
}

impl DataPeriod {
    /// 기간의 개월 수를 반환합니다.
    pub fn months(&self) -> u32 {
        match self {
            DataPeriod::ThreeMonths => 3,
            DataPeriod::SixMonths => 6,
            DataPeriod::OneYear => 12,
        }
    }

    /// 업스트림 API와 저장소에서 사용하는 정규 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataPeriod::ThreeMonths => "3months",
            DataPeriod::SixMonths => "6months",
            DataPeriod::OneYear => "1year",
        }
    }

    /// 모든 기간 반환.
    pub fn all() -> [DataPeriod; 3] {
        [
            DataPeriod::ThreeMonths,
            DataPeriod::SixMonths,
            DataPeriod::OneYear,
        ]
    }
}

impl fmt::Display for DataPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "3months" | "3m" => Ok(DataPeriod::ThreeMonths),
            "6months" | "6m" => Ok(DataPeriod::SixMonths),
            "1year" | "1y" | "12months" => Ok(DataPeriod::OneYear),
            other => Err(CoreError::InvalidInput(format!(
                "Invalid period: {} (expected 3months, 6months or 1year)",
                other
            ))),
        }
    }
}
