//! 测试用的模拟节点源

#![allow(dead_code)]

use async_trait::async_trait;
use flare_discovery::{
    DeploymentIdentifier, DiscoveryConfig, DiscoveryError, Node, NodeSource, NodeSourceFactory,
    Result, ServiceDiscoveryConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 记录工厂和节点源的调用次数
#[derive(Debug, Default)]
pub struct Probe {
    pub created: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
}

impl Probe {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

/// 模拟节点源的行为
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub supports_multiple_environments: bool,
    pub was_undeployed: bool,
    pub init_error: Option<DiscoveryError>,
    /// init 永远挂起，用于测试取消
    pub hang_on_init: bool,
    pub nodes: Vec<Node>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            supports_multiple_environments: true,
            was_undeployed: false,
            init_error: None,
            hang_on_init: false,
            nodes: vec![Node::new("10.0.0.1", Some(8080))],
        }
    }
}

impl MockBehavior {
    pub fn single_environment() -> Self {
        Self {
            supports_multiple_environments: false,
            ..Default::default()
        }
    }

    pub fn undeployed() -> Self {
        Self {
            was_undeployed: true,
            ..Default::default()
        }
    }

    pub fn failing(error: DiscoveryError) -> Self {
        Self {
            init_error: Some(error),
            ..Default::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang_on_init: true,
            ..Default::default()
        }
    }
}

pub struct MockNodeSource {
    source_type: String,
    behavior: MockBehavior,
    probe: Arc<Probe>,
}

#[async_trait]
impl NodeSource for MockNodeSource {
    fn source_type(&self) -> &str {
        &self.source_type
    }

    fn supports_multiple_environments(&self) -> bool {
        self.behavior.supports_multiple_environments
    }

    fn was_undeployed(&self) -> bool {
        self.behavior.was_undeployed
    }

    async fn init(&self) -> Result<()> {
        self.probe.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.hang_on_init {
            std::future::pending::<()>().await;
        }
        match &self.behavior.init_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.behavior.nodes.clone())
    }

    fn shutdown(&self) {
        self.probe.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockFactory {
    source_type: String,
    behavior: MockBehavior,
    pub probe: Arc<Probe>,
}

impl MockFactory {
    pub fn new(source_type: &str, behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            source_type: source_type.to_string(),
            behavior,
            probe: Arc::new(Probe::default()),
        })
    }
}

impl NodeSourceFactory for MockFactory {
    fn source_type(&self) -> &str {
        &self.source_type
    }

    fn create(
        &self,
        _config: &DiscoveryConfig,
        _deployment: &DeploymentIdentifier,
    ) -> Box<dyn NodeSource> {
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockNodeSource {
            source_type: self.source_type.clone(),
            behavior: self.behavior.clone(),
            probe: self.probe.clone(),
        })
    }
}

/// 只包含一个服务的配置
pub fn config_with_source(service: &str, source: &str) -> DiscoveryConfig {
    DiscoveryConfig::default().with_service(service, ServiceDiscoveryConfig::with_source(source))
}

pub fn prod(service: &str) -> DeploymentIdentifier {
    DeploymentIdentifier::with_environment(service, "prod").expect("valid deployment")
}

pub fn agnostic(service: &str) -> DeploymentIdentifier {
    DeploymentIdentifier::environment_agnostic(service).expect("valid deployment")
}
