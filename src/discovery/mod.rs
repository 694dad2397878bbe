//! 部署解析与服务发现模块
//!
//! 根据配置为部署选择节点源（consul、etcd、config、local），
//! 初始化后包装为负载均衡器；部署不可用时返回 `None`，由调用方回退到更宽泛的部署。

pub mod backend;
pub mod config;
pub mod identifier;
pub mod load_balancer;
pub mod node;
pub mod registry;
pub mod resolver;

pub use backend::{
    ConfigNodeSource, ConsulNodeSource, EtcdNodeSource, LocalNodeSource, NodeSource,
};
pub use config::{
    BackendType, ConfigProvider, ConsulSettings, DiscoveryConfig, EtcdSettings,
    LoadBalanceStrategy, LocalSettings, ServiceDiscoveryConfig, SharedConfigProvider,
    StaticConfigProvider,
};
pub use identifier::DeploymentIdentifier;
pub use load_balancer::{
    DefaultLoadBalancerFactory, LoadBalancer, LoadBalancerFactory, NodeLoadBalancer,
    ReachabilityCheck, always_reachable, reachability_check,
};
pub use node::Node;
pub use registry::{BuiltinNodeSourceFactory, NodeSourceFactory, NodeSourceRegistry};
pub use resolver::DeploymentResolver;
