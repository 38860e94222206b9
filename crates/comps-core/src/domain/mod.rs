//! 시장 비교 매매 조회를 위한 도메인 모델.

mod market_data;
mod request;

pub use market_data::*;
pub use request::*;
