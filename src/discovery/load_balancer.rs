//! 负载均衡模块
//!
//! 负载均衡器持有已初始化的节点源，按策略为每个请求选择一个节点，
//! 并对调用方报告不可达的节点进行后台探测。

use futures::future::BoxFuture;
use rand::Rng;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::backend::NodeSource;
use crate::discovery::config::{DiscoveryConfig, LoadBalanceStrategy};
use crate::discovery::identifier::DeploymentIdentifier;
use crate::discovery::node::Node;
use crate::error::{DiscoveryError, Result};

/// 可达性检查
///
/// 由调用方提供，返回 `Ok(())` 表示节点可达。
pub type ReachabilityCheck = Arc<dyn Fn(Node) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// 从异步闭包构造可达性检查
pub fn reachability_check<F, Fut>(check: F) -> ReachabilityCheck
where
    F: Fn(Node) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |node| Box::pin(check(node)))
}

/// 总是认为节点可达
pub fn always_reachable() -> ReachabilityCheck {
    reachability_check(|_node| async { Ok(()) })
}

/// 负载均衡器 trait
pub trait LoadBalancer: Send + Sync {
    /// 所服务的部署
    fn deployment(&self) -> &DeploymentIdentifier;

    /// 选择一个节点
    ///
    /// `routing_key` 只在一致性哈希策略下使用。
    fn try_get_node(&self, routing_key: Option<&str>) -> Result<Node>;

    /// 报告节点不可达，节点会被排除直到可达性检查通过
    fn report_unreachable(&self, node: &Node);

    /// 关闭负载均衡器及其持有的节点源
    fn shutdown(&self);
}

/// 负载均衡器工厂
pub trait LoadBalancerFactory: Send + Sync {
    /// 节点源的所有权转移给返回的负载均衡器
    ///
    /// `config` 是创建节点源时使用的同一份配置快照。
    fn create(
        &self,
        config: &DiscoveryConfig,
        deployment: DeploymentIdentifier,
        node_source: Box<dyn NodeSource>,
        reachability_check: ReachabilityCheck,
    ) -> Arc<dyn LoadBalancer>;
}

/// 默认负载均衡器
pub struct NodeLoadBalancer {
    deployment: DeploymentIdentifier,
    node_source: Box<dyn NodeSource>,
    reachability_check: ReachabilityCheck,
    strategy: LoadBalanceStrategy,
    retry_interval: Duration,
    round_robin_index: AtomicUsize,
    unreachable: Arc<Mutex<HashSet<Node>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl NodeLoadBalancer {
    pub fn new(
        deployment: DeploymentIdentifier,
        node_source: Box<dyn NodeSource>,
        reachability_check: ReachabilityCheck,
        strategy: LoadBalanceStrategy,
        retry_interval: Duration,
    ) -> Self {
        Self {
            deployment,
            node_source,
            reachability_check,
            strategy,
            retry_interval,
            round_robin_index: AtomicUsize::new(0),
            unreachable: Arc::new(Mutex::new(HashSet::new())),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn node_source(&self) -> &dyn NodeSource {
        self.node_source.as_ref()
    }

    pub fn strategy(&self) -> LoadBalanceStrategy {
        self.strategy
    }

    /// 当前被标记为不可达的节点
    pub fn unreachable_nodes(&self) -> Vec<Node> {
        self.lock_unreachable().iter().cloned().collect()
    }

    fn lock_unreachable(&self) -> std::sync::MutexGuard<'_, HashSet<Node>> {
        self.unreachable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn select<'a>(&self, nodes: &[&'a Node], routing_key: Option<&str>) -> &'a Node {
        let index = match self.strategy {
            LoadBalanceStrategy::RoundRobin => {
                self.round_robin_index.fetch_add(1, Ordering::Relaxed) % nodes.len()
            }
            LoadBalanceStrategy::Random => rand::thread_rng().gen_range(0..nodes.len()),
            LoadBalanceStrategy::ConsistentHash => {
                let mut hasher = DefaultHasher::new();
                routing_key.unwrap_or("").hash(&mut hasher);
                (hasher.finish() as usize) % nodes.len()
            }
        };
        nodes[index]
    }

    fn spawn_reachability_monitor(&self, node: Node) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                deployment = %self.deployment,
                node = %node,
                "⚠️ Cannot monitor unreachable node: tokio runtime not available"
            );
            return;
        };

        let check = self.reachability_check.clone();
        let unreachable = self.unreachable.clone();
        let shutdown = self.shutdown.clone();
        let retry_interval = self.retry_interval;
        let deployment = self.deployment.clone();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(retry_interval) => {}
                }

                let result = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = check(node.clone()) => result,
                };

                match result {
                    Ok(()) => {
                        unreachable
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .remove(&node);
                        info!(deployment = %deployment, node = %node, "✅ Node is reachable again");
                        break;
                    }
                    Err(e) => {
                        debug!(
                            deployment = %deployment,
                            node = %node,
                            error = %e,
                            "Node is still unreachable"
                        );
                    }
                }
            }
        });
    }
}

impl LoadBalancer for NodeLoadBalancer {
    fn deployment(&self) -> &DeploymentIdentifier {
        &self.deployment
    }

    fn try_get_node(&self, routing_key: Option<&str>) -> Result<Node> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DiscoveryError::service_unreachable(
                &self.deployment,
                "load balancer was shut down",
            ));
        }

        let mut nodes = self.node_source.nodes()?;
        if nodes.is_empty() {
            return Err(DiscoveryError::service_unreachable(
                &self.deployment,
                format!(
                    "no nodes were discovered by the '{}' source",
                    self.node_source.source_type()
                ),
            ));
        }
        // 排序后选择结果不依赖后端返回顺序
        nodes.sort_by(|a, b| (&a.hostname, a.port).cmp(&(&b.hostname, b.port)));

        let unreachable = self.lock_unreachable();
        let reachable: Vec<&Node> = nodes.iter().filter(|n| !unreachable.contains(*n)).collect();
        if reachable.is_empty() {
            return Err(DiscoveryError::service_unreachable(
                &self.deployment,
                format!("all {} nodes are unreachable", nodes.len()),
            ));
        }

        Ok(self.select(&reachable, routing_key).clone())
    }

    fn report_unreachable(&self, node: &Node) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let newly_marked = self.lock_unreachable().insert(node.clone());
        if newly_marked {
            warn!(deployment = %self.deployment, node = %node, "⚠️ Node marked as unreachable");
            self.spawn_reachability_monitor(node.clone());
        }
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        self.node_source.shutdown();
        info!(deployment = %self.deployment, "🛑 Load balancer shut down");
    }
}

impl Drop for NodeLoadBalancer {
    fn drop(&mut self) {
        LoadBalancer::shutdown(self);
    }
}

/// 默认负载均衡器工厂，策略和探测间隔取自解析时的配置快照
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLoadBalancerFactory;

impl DefaultLoadBalancerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancerFactory for DefaultLoadBalancerFactory {
    fn create(
        &self,
        config: &DiscoveryConfig,
        deployment: DeploymentIdentifier,
        node_source: Box<dyn NodeSource>,
        reachability_check: ReachabilityCheck,
    ) -> Arc<dyn LoadBalancer> {
        Arc::new(NodeLoadBalancer::new(
            deployment,
            node_source,
            reachability_check,
            config.load_balance,
            config.reachability_retry(),
        ))
    }
}
