//! 시스템 전반에서 사용되는 공통 타입.

mod key;
mod period;

pub use key::*;
pub use period::*;
