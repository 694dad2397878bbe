//! 部署标识

use std::fmt;

use crate::error::{DiscoveryError, Result};

/// 部署标识：服务名 + 可选环境
///
/// 没有环境的标识是"环境无关"的，作为各环境共用的兜底部署。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentIdentifier {
    service_name: String,
    environment: Option<String>,
}

impl DeploymentIdentifier {
    /// 创建指定环境的部署标识
    pub fn new(service_name: impl Into<String>, environment: Option<String>) -> Result<Self> {
        let service_name = service_name.into();
        if service_name.trim().is_empty() {
            return Err(DiscoveryError::invalid_deployment("service name must not be empty"));
        }
        if let Some(env) = &environment {
            if env.trim().is_empty() {
                return Err(DiscoveryError::invalid_deployment(format!(
                    "environment of '{}' must not be empty",
                    service_name
                )));
            }
        }

        Ok(Self {
            service_name,
            environment,
        })
    }

    /// 创建环境相关的部署标识
    pub fn with_environment(
        service_name: impl Into<String>,
        environment: impl Into<String>,
    ) -> Result<Self> {
        Self::new(service_name, Some(environment.into()))
    }

    /// 创建环境无关的部署标识
    pub fn environment_agnostic(service_name: impl Into<String>) -> Result<Self> {
        Self::new(service_name, None)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn is_environment_specific(&self) -> bool {
        self.environment.is_some()
    }

    /// 同一服务的环境无关标识
    pub fn to_environment_agnostic(&self) -> Self {
        Self {
            service_name: self.service_name.clone(),
            environment: None,
        }
    }
}

/// 格式：`service` 或 `service-environment`，同时也是后端注册中心里的服务名
impl fmt::Display for DeploymentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.environment {
            Some(env) => write!(f, "{}-{}", self.service_name, env),
            None => f.write_str(&self.service_name),
        }
    }
}
