//! iron-common - 通用工具库

pub mod retry;
pub mod utils;

pub use retry::*;
pub use utils::*;
