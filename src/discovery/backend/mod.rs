//! 节点源（服务发现后端）抽象和实现

pub mod config;
pub mod consul;
pub mod etcd;
pub mod local;

use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::discovery::node::Node;
use crate::error::Result;

pub use config::ConfigNodeSource;
pub use consul::ConsulNodeSource;
pub use etcd::EtcdNodeSource;
pub use local::LocalNodeSource;

/// 节点源 trait
///
/// 每个实例只负责一个部署的节点成员关系。生命周期：
/// 1. 由 `NodeSourceFactory` 创建（不做任何 I/O）
/// 2. `init()` 建立连接/订阅，完成后 `was_undeployed()` 与
///    `supports_multiple_environments()` 才有意义
/// 3. `shutdown()` 释放资源；`init()` 失败或只完成一半时也可以调用，可重复调用
///
/// 注意：由于需要动态分发（dyn），使用 async-trait
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// 后端类型名，如 "consul"
    fn source_type(&self) -> &str;

    /// 是否支持按环境区分部署
    ///
    /// 不支持时，只有环境无关的部署标识会被视为可用。
    fn supports_multiple_environments(&self) -> bool;

    /// 部署是否已下线（或从未部署）
    fn was_undeployed(&self) -> bool;

    /// 初始化：连接注册中心并加载首批节点
    async fn init(&self) -> Result<()>;

    /// 当前节点列表
    fn nodes(&self) -> Result<Vec<Node>>;

    /// 释放资源（停止后台监听）
    fn shutdown(&self);
}

/// 带后台监听的后端共享的节点状态
#[derive(Debug, Default)]
pub(crate) struct NodeState {
    nodes: RwLock<Vec<Node>>,
    was_undeployed: AtomicBool,
}

impl NodeState {
    pub(crate) fn nodes(&self) -> Vec<Node> {
        self.nodes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn set_nodes(&self, nodes: Vec<Node>) {
        let mut current = self
            .nodes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = nodes;
    }

    pub(crate) fn mark_undeployed(&self) {
        self.was_undeployed.store(true, Ordering::Release);
    }

    pub(crate) fn was_undeployed(&self) -> bool {
        self.was_undeployed.load(Ordering::Acquire)
    }
}
