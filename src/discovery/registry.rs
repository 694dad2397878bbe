//! 节点源注册表
//!
//! 启动时构建 `类型名 -> 工厂` 的索引，按配置中的 `source` 选择后端。

use std::collections::HashMap;
use std::sync::Arc;

use crate::discovery::backend::{
    ConfigNodeSource, ConsulNodeSource, EtcdNodeSource, LocalNodeSource, NodeSource,
};
use crate::discovery::config::{BackendType, ConfigProvider, DiscoveryConfig};
use crate::discovery::identifier::DeploymentIdentifier;

/// 节点源工厂
///
/// `create` 只构造实例，不能做 I/O 或阻塞操作，连接工作留给 `NodeSource::init`。
/// 后端设置必须取自传入的配置快照，即选择后端时使用的同一份配置。
pub trait NodeSourceFactory: Send + Sync {
    /// 后端类型名，与配置中的 `source` 大小写不敏感匹配
    fn source_type(&self) -> &str;

    fn create(
        &self,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
    ) -> Box<dyn NodeSource>;
}

/// 内置后端工厂
///
/// `config` 只交给 config 后端，用于在 `nodes()` 时读取最新的 `hosts`。
pub struct BuiltinNodeSourceFactory {
    backend: BackendType,
    config: Arc<dyn ConfigProvider>,
}

impl BuiltinNodeSourceFactory {
    pub fn new(backend: BackendType, config: Arc<dyn ConfigProvider>) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> BackendType {
        self.backend
    }
}

impl NodeSourceFactory for BuiltinNodeSourceFactory {
    fn source_type(&self) -> &str {
        self.backend.as_str()
    }

    fn create(
        &self,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
    ) -> Box<dyn NodeSource> {
        match self.backend {
            BackendType::Consul => Box::new(ConsulNodeSource::new(
                deployment.clone(),
                config.consul.clone(),
            )),
            BackendType::Etcd => Box::new(EtcdNodeSource::new(
                deployment.clone(),
                config.etcd.clone(),
            )),
            BackendType::Config => Box::new(ConfigNodeSource::new(
                deployment.clone(),
                self.config.clone(),
            )),
            BackendType::Local => {
                let default_port = config
                    .service(deployment.service_name())
                    .and_then(|service| service.default_port);
                Box::new(LocalNodeSource::new(
                    config.local.hostname.clone(),
                    default_port,
                ))
            }
        }
    }
}

/// 节点源注册表
#[derive(Default)]
pub struct NodeSourceRegistry {
    factories: Vec<Arc<dyn NodeSourceFactory>>,
    index: HashMap<String, usize>,
}

impl NodeSourceRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册所有内置后端（consul、etcd、config、local）
    pub fn with_builtin_backends(config: Arc<dyn ConfigProvider>) -> Self {
        let mut registry = Self::new();
        for backend in BackendType::ALL {
            registry.register(Arc::new(BuiltinNodeSourceFactory::new(
                backend,
                config.clone(),
            )));
        }
        registry
    }

    /// 注册工厂；同名（大小写不敏感）的工厂会被替换，保留原顺序
    pub fn register(&mut self, factory: Arc<dyn NodeSourceFactory>) -> &mut Self {
        let key = normalize(factory.source_type());
        match self.index.get(&key) {
            Some(&position) => self.factories[position] = factory,
            None => {
                self.index.insert(key, self.factories.len());
                self.factories.push(factory);
            }
        }
        self
    }

    /// 链式注册
    pub fn with_factory(mut self, factory: Arc<dyn NodeSourceFactory>) -> Self {
        self.register(factory);
        self
    }

    /// 已注册的后端类型名（按注册顺序）
    pub fn source_types(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.source_type()).collect()
    }

    pub fn contains(&self, source_type: &str) -> bool {
        self.index.contains_key(&normalize(source_type))
    }

    /// 为部署创建所有候选节点源（每个后端一个，均未初始化）
    pub fn create_candidates(
        &self,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
    ) -> Vec<Box<dyn NodeSource>> {
        self.factories
            .iter()
            .map(|factory| factory.create(config, deployment))
            .collect()
    }

    /// 只创建与 `source_type` 匹配的节点源
    pub fn create(
        &self,
        source_type: &str,
        config: &DiscoveryConfig,
        deployment: &DeploymentIdentifier,
    ) -> Option<Box<dyn NodeSource>> {
        self.index
            .get(&normalize(source_type))
            .map(|&position| self.factories[position].create(config, deployment))
    }
}

/// 只忽略大小写，前后空白视为不同的名字
fn normalize(source_type: &str) -> String {
    source_type.to_lowercase()
}
