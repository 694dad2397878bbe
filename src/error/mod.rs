//! Flare Discovery 错误处理模块
//!
//! 配置错误是致命的，后端错误原样传递；"未找到"不属于错误。

pub mod discovery_error;

pub use discovery_error::{DiscoveryError, ErrorCategory, Result};
