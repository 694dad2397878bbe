//! 服务发现统一错误类型

use std::fmt;
use thiserror::Error;

/// 错误类别
///
/// - `Configuration`: 配置缺陷，需要运维介入，不会重试
/// - `Backend`: 后端（Consul、etcd 等）返回的错误，原样向上传递
/// - `Unavailable`: 已解析成功，但当前没有可用节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Backend,
    Unavailable,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Backend => "backend",
            ErrorCategory::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务发现错误
///
/// "未找到"（服务已下线、后端不支持指定环境）不是错误，
/// 解析接口用 `Ok(None)` 表示。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// 部署标识非法（如服务名为空）
    #[error("Invalid deployment identifier: {0}")]
    InvalidDeployment(String),

    /// 服务没有对应的发现配置
    #[error("Service '{service}' has no discovery configuration")]
    ServiceNotConfigured { service: String },

    /// 配置的发现源没有对应的后端
    #[error("Discovery Source '{source_type}' is not supported.")]
    UnsupportedSource { source_type: String },

    /// 后端配置不完整（如 config 源没有配置 hosts）
    #[error("Discovery for '{deployment}' is misconfigured: {reason}")]
    Misconfigured { deployment: String, reason: String },

    /// 读取配置文件失败
    #[error("Failed to load discovery config: {0}")]
    ConfigLoad(String),

    /// 解析配置文件失败
    #[error("Failed to parse discovery config: {0}")]
    ConfigParse(String),

    /// 后端错误（连接失败、请求失败、响应格式错误等）
    #[error("Discovery backend '{source_type}' failed: {message}")]
    Backend { source_type: String, message: String },

    /// 没有可用节点
    #[error("Service '{deployment}' is unreachable: {message}")]
    ServiceUnreachable { deployment: String, message: String },
}

impl DiscoveryError {
    pub fn invalid_deployment(reason: impl Into<String>) -> Self {
        DiscoveryError::InvalidDeployment(reason.into())
    }

    pub fn service_not_configured(service: impl Into<String>) -> Self {
        DiscoveryError::ServiceNotConfigured {
            service: service.into(),
        }
    }

    pub fn unsupported_source(source_type: impl Into<String>) -> Self {
        DiscoveryError::UnsupportedSource {
            source_type: source_type.into(),
        }
    }

    pub fn misconfigured(deployment: impl fmt::Display, reason: impl Into<String>) -> Self {
        DiscoveryError::Misconfigured {
            deployment: deployment.to_string(),
            reason: reason.into(),
        }
    }

    /// 包装后端错误
    pub fn backend(source_type: impl Into<String>, error: impl fmt::Display) -> Self {
        DiscoveryError::Backend {
            source_type: source_type.into(),
            message: error.to_string(),
        }
    }

    pub fn service_unreachable(deployment: impl fmt::Display, message: impl Into<String>) -> Self {
        DiscoveryError::ServiceUnreachable {
            deployment: deployment.to_string(),
            message: message.into(),
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            DiscoveryError::InvalidDeployment(_)
            | DiscoveryError::ServiceNotConfigured { .. }
            | DiscoveryError::UnsupportedSource { .. }
            | DiscoveryError::Misconfigured { .. }
            | DiscoveryError::ConfigLoad(_)
            | DiscoveryError::ConfigParse(_) => ErrorCategory::Configuration,
            DiscoveryError::Backend { .. } => ErrorCategory::Backend,
            DiscoveryError::ServiceUnreachable { .. } => ErrorCategory::Unavailable,
        }
    }

    /// 是否为配置错误（致命，不应重试）
    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        !self.is_configuration_error()
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::ConfigLoad(err.to_string())
    }
}

impl From<toml::de::Error> for DiscoveryError {
    fn from(err: toml::de::Error) -> Self {
        DiscoveryError::ConfigParse(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, DiscoveryError>;
