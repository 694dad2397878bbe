//! 配置文件节点源
//!
//! 节点直接写在服务配置的 `hosts` 中，适合没有注册中心的环境。

use async_trait::async_trait;
use std::sync::Arc;

use crate::discovery::backend::NodeSource;
use crate::discovery::config::{BackendType, ConfigProvider};
use crate::discovery::identifier::DeploymentIdentifier;
use crate::discovery::node::Node;
use crate::error::{DiscoveryError, Result};

/// 配置文件节点源
///
/// 配置不区分环境，因此只对环境无关的部署标识可用。
/// 每次获取节点都读取最新配置，修改 `hosts` 无需重建。
pub struct ConfigNodeSource {
    deployment: DeploymentIdentifier,
    config: Arc<dyn ConfigProvider>,
}

impl ConfigNodeSource {
    pub fn new(deployment: DeploymentIdentifier, config: Arc<dyn ConfigProvider>) -> Self {
        Self { deployment, config }
    }
}

#[async_trait]
impl NodeSource for ConfigNodeSource {
    fn source_type(&self) -> &str {
        BackendType::Config.as_str()
    }

    fn supports_multiple_environments(&self) -> bool {
        false
    }

    fn was_undeployed(&self) -> bool {
        false
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        let config = self.config.get_config();
        let service = config
            .service(self.deployment.service_name())
            .ok_or_else(|| DiscoveryError::service_not_configured(self.deployment.service_name()))?;

        let hosts = service.hosts.as_deref().unwrap_or_default();
        let nodes = hosts
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| {
                host.parse::<Node>()
                    .map(|node| node.with_default_port(service.default_port))
                    .map_err(|e| DiscoveryError::misconfigured(&self.deployment, e))
            })
            .collect::<Result<Vec<_>>>()?;

        if nodes.is_empty() {
            return Err(DiscoveryError::misconfigured(
                &self.deployment,
                "no hosts configured for the config discovery source",
            ));
        }

        Ok(nodes)
    }

    fn shutdown(&self) {}
}
