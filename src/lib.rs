//! Flare Discovery
//!
//! 部署解析层：按配置选择服务发现后端（节点源），负责其初始化与释放，
//! 并构建负载均衡器。支持环境回退：指定环境不可用时返回 `None`，
//! 由调用方（或 `DeploymentResolver::resolve_with_fallback`）尝试更宽泛的部署。

pub mod discovery;
pub mod error;
pub mod telemetry;

// Re-exports
pub use discovery::{
    BackendType, ConfigProvider, DefaultLoadBalancerFactory, DeploymentIdentifier,
    DeploymentResolver, DiscoveryConfig, LoadBalanceStrategy, LoadBalancer, LoadBalancerFactory,
    Node, NodeSource, NodeSourceFactory, NodeSourceRegistry, ReachabilityCheck,
    ServiceDiscoveryConfig, SharedConfigProvider, StaticConfigProvider, always_reachable,
    reachability_check,
};
pub use error::{DiscoveryError, ErrorCategory, Result};
pub use telemetry::init_tracing;
