//! 部署解析
//!
//! 把部署标识解析为已初始化的节点源和负载均衡器：
//! 读取配置 -> 选择后端 -> 初始化 -> 可用性判断 -> 构建负载均衡器。
//! 不可用时关闭节点源并返回 `None`，调用方可以换一个更宽泛的部署标识重试。

use std::sync::Arc;
use tracing::{debug, info};

use crate::discovery::backend::NodeSource;
use crate::discovery::config::{ConfigProvider, DiscoveryConfig};
use crate::discovery::identifier::DeploymentIdentifier;
use crate::discovery::load_balancer::{
    DefaultLoadBalancerFactory, LoadBalancer, LoadBalancerFactory, ReachabilityCheck,
};
use crate::discovery::registry::NodeSourceRegistry;
use crate::error::{DiscoveryError, Result};

/// 部署解析器
///
/// 不缓存任何结果：每次调用都读取一份最新的配置快照并创建新的节点源，
/// 后端选择、后端设置和负载均衡策略都来自这同一份快照。
/// 同一部署的并发调用互不影响。
pub struct DeploymentResolver {
    config: Arc<dyn ConfigProvider>,
    registry: Arc<NodeSourceRegistry>,
    load_balancer_factory: Arc<dyn LoadBalancerFactory>,
}

impl DeploymentResolver {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        registry: Arc<NodeSourceRegistry>,
        load_balancer_factory: Arc<dyn LoadBalancerFactory>,
    ) -> Self {
        Self {
            config,
            registry,
            load_balancer_factory,
        }
    }

    /// 使用内置后端和默认负载均衡器
    pub fn with_defaults(config: Arc<dyn ConfigProvider>) -> Self {
        let registry = NodeSourceRegistry::with_builtin_backends(config.clone());
        Self::new(
            config,
            Arc::new(registry),
            Arc::new(DefaultLoadBalancerFactory::new()),
        )
    }

    pub fn registry(&self) -> &NodeSourceRegistry {
        &self.registry
    }

    /// 解析节点源
    ///
    /// # 返回
    /// * `Ok(Some(_))` - 已初始化且可用，所有权交给调用方
    /// * `Ok(None)` - 部署已下线，或后端不支持指定环境
    /// * `Err` - 配置错误，或后端初始化失败（原样返回）
    pub async fn resolve_node_source(
        &self,
        deployment: &DeploymentIdentifier,
    ) -> Result<Option<Box<dyn NodeSource>>> {
        let config = self.config.get_config();
        self.resolve_node_source_with(&config, deployment).await
    }

    /// 解析负载均衡器，节点源的所有权转移给负载均衡器
    pub async fn resolve_load_balancer(
        &self,
        deployment: &DeploymentIdentifier,
        reachability_check: ReachabilityCheck,
    ) -> Result<Option<Arc<dyn LoadBalancer>>> {
        let config = self.config.get_config();
        self.resolve_load_balancer_with(&config, deployment, reachability_check)
            .await
    }

    /// 按环境回退解析负载均衡器
    ///
    /// 依次尝试：
    /// 1. `service` + `environment`
    /// 2. `service` + 配置中的 `environment_fallback_target`（与 1 不同时）
    /// 3. 环境无关的 `service`
    ///
    /// 所有步骤使用同一份配置快照。任何一步出错立即返回错误，全部不可用时返回 `Ok(None)`。
    pub async fn resolve_with_fallback(
        &self,
        service_name: &str,
        environment: Option<&str>,
        reachability_check: ReachabilityCheck,
    ) -> Result<Option<(DeploymentIdentifier, Arc<dyn LoadBalancer>)>> {
        let config = self.config.get_config();

        let mut deployments = Vec::with_capacity(3);
        if let Some(env) = environment {
            deployments.push(DeploymentIdentifier::with_environment(service_name, env)?);

            if let Some(fallback) = config.environment_fallback_target.as_deref() {
                if fallback != env {
                    deployments.push(DeploymentIdentifier::with_environment(service_name, fallback)?);
                }
            }
        }
        deployments.push(DeploymentIdentifier::environment_agnostic(service_name)?);

        for deployment in deployments {
            if let Some(load_balancer) = self
                .resolve_load_balancer_with(&config, &deployment, reachability_check.clone())
                .await?
            {
                return Ok(Some((deployment, load_balancer)));
            }
            debug!(deployment = %deployment, "Deployment not found, trying next fallback");
        }

        Ok(None)
    }

    async fn resolve_load_balancer_with(
        &self,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
        reachability_check: ReachabilityCheck,
    ) -> Result<Option<Arc<dyn LoadBalancer>>> {
        let Some(node_source) = self.resolve_node_source_with(config, deployment).await? else {
            return Ok(None);
        };

        Ok(Some(self.load_balancer_factory.create(
            config,
            deployment.clone(),
            node_source,
            reachability_check,
        )))
    }

    async fn resolve_node_source_with(
        &self,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
    ) -> Result<Option<Box<dyn NodeSource>>> {
        let node_source = self.create_node_source(config, deployment)?;

        {
            // 初始化失败、不可用、或调用被取消时都由 guard 关闭节点源
            let guard = ShutdownGuard::new(node_source.as_ref());

            node_source.init().await?;

            let specific_environment_unsupported =
                !node_source.supports_multiple_environments() && deployment.is_environment_specific();

            if node_source.was_undeployed() || specific_environment_unsupported {
                debug!(
                    deployment = %deployment,
                    source_type = node_source.source_type(),
                    was_undeployed = node_source.was_undeployed(),
                    specific_environment_unsupported,
                    "Deployment not available from node source"
                );
                return Ok(None);
            }

            guard.disarm();
        }

        info!(
            deployment = %deployment,
            source_type = node_source.source_type(),
            "✅ Node source resolved"
        );
        Ok(Some(node_source))
    }

    /// 按配置选出后端并创建节点源（不初始化）
    fn create_node_source(
        &self,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
    ) -> Result<Box<dyn NodeSource>> {
        let service = config
            .service(deployment.service_name())
            .ok_or_else(|| DiscoveryError::service_not_configured(deployment.service_name()))?;

        self.registry
            .create(&service.source, config, deployment)
            .ok_or_else(|| DiscoveryError::unsupported_source(&service.source))
    }
}

/// 作用域内持有节点源，离开作用域时除非已 `disarm` 否则调用 `shutdown()`
struct ShutdownGuard<'a> {
    node_source: &'a dyn NodeSource,
    armed: bool,
}

impl<'a> ShutdownGuard<'a> {
    fn new(node_source: &'a dyn NodeSource) -> Self {
        Self {
            node_source,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.node_source.shutdown();
        }
    }
}
