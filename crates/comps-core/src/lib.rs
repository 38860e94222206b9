//! # Comps Core
//!
//! 시장 비교 매매(comparable sales) 조회 시스템의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 시장 데이터 레코드 및 비교 매매 구조체
//! - 조회 기간(`DataPeriod`)과 복합 키(`MarketDataKey`)
//! - 요청 검증 및 응답 타입
//! - 로깅 인프라

pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
