//! 本机节点源，开发环境中把所有请求发往本机

use async_trait::async_trait;

use crate::discovery::backend::NodeSource;
use crate::discovery::config::BackendType;
use crate::discovery::node::Node;
use crate::error::Result;

pub struct LocalNodeSource {
    node: Node,
}

impl LocalNodeSource {
    pub fn new(hostname: impl Into<String>, default_port: Option<u16>) -> Self {
        Self {
            node: Node::new(hostname, default_port),
        }
    }
}

#[async_trait]
impl NodeSource for LocalNodeSource {
    fn source_type(&self) -> &str {
        BackendType::Local.as_str()
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
        Ok(vec![self.node.clone()])
    }

    fn shutdown(&self) {}
}
