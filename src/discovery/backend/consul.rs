//! Consul 节点源

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::backend::{NodeSource, NodeState};
use crate::discovery::config::{BackendType, ConsulSettings};
use crate::discovery::identifier::DeploymentIdentifier;
use crate::discovery::node::Node;
use crate::error::{DiscoveryError, Result};

const CONSUL: &str = "consul";

/// 两次阻塞查询之间的最小间隔，防止 index 未变化时空转
const MIN_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Consul 节点源
///
/// Consul 中的服务名即部署标识（`service` 或 `service-env`），因此支持多环境。
pub struct ConsulNodeSource {
    deployment: DeploymentIdentifier,
    settings: ConsulSettings,
    state: Arc<NodeState>,
    initialized: OnceCell<()>,
    shutdown: CancellationToken,
}

impl ConsulNodeSource {
    /// 创建新的 Consul 节点源（不发起任何请求）
    pub fn new(deployment: DeploymentIdentifier, settings: ConsulSettings) -> Self {
        Self {
            deployment,
            settings,
            state: Arc::new(NodeState::default()),
            initialized: OnceCell::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Consul 中注册的服务名
    pub fn service_name(&self) -> String {
        self.deployment.to_string()
    }

    async fn start(&self) -> Result<()> {
        let client = ConsulClient::new(&self.settings)?;
        let service_name = self.service_name();

        if !client.is_deployed(&service_name).await? {
            info!(service = %service_name, "Service is not deployed in Consul");
            self.state.mark_undeployed();
            return Ok(());
        }

        let (nodes, index) = client.health_nodes(&service_name, None).await?;
        info!(
            service = %service_name,
            nodes = nodes.len(),
            "✅ Consul node source initialized"
        );
        self.state.set_nodes(nodes);

        let watcher = ConsulWatcher {
            client,
            service_name,
            state: self.state.clone(),
            retry_interval: self.settings.retry_interval(),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(watcher.run(index));

        Ok(())
    }
}

#[async_trait]
impl NodeSource for ConsulNodeSource {
    fn source_type(&self) -> &str {
        BackendType::Consul.as_str()
    }

    fn supports_multiple_environments(&self) -> bool {
        true
    }

    fn was_undeployed(&self) -> bool {
        self.state.was_undeployed()
    }

    async fn init(&self) -> Result<()> {
        // 并发调用等待同一次初始化，失败后允许重试
        self.initialized.get_or_try_init(|| self.start()).await?;
        Ok(())
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.state.nodes())
    }

    fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(service = %self.deployment, "Consul node source shut down");
        }
        self.shutdown.cancel();
    }
}

impl Drop for ConsulNodeSource {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// `/v1/health/service/:service` 的响应条目
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    node: HealthNode,
    service: HealthService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthNode {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthService {
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: Option<u16>,
}

impl HealthEntry {
    /// 服务地址为空时使用节点地址
    fn into_node(self) -> Node {
        let hostname = if self.service.address.is_empty() {
            self.node.address
        } else {
            self.service.address
        };
        let port = self.service.port.filter(|port| *port != 0);
        Node::new(hostname, port)
    }
}

#[derive(Clone)]
struct ConsulClient {
    http: HttpClient,
    url: String,
    blocking_wait: String,
}

impl ConsulClient {
    fn new(settings: &ConsulSettings) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(settings.http_timeout())
            .build()
            .map_err(|e| DiscoveryError::backend(CONSUL, e))?;

        Ok(Self {
            http,
            url: settings.url.trim_end_matches('/').to_string(),
            blocking_wait: format!("{}s", settings.blocking_wait_secs),
        })
    }

    /// 服务是否存在于 Consul catalog 中（大小写不敏感）
    async fn is_deployed(&self, service_name: &str) -> Result<bool> {
        let url = format!("{}/v1/catalog/services", self.url);
        let services: HashMap<String, serde_json::Value> = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| DiscoveryError::backend(CONSUL, e))?
            .json()
            .await
            .map_err(|e| DiscoveryError::backend(CONSUL, e))?;

        Ok(services
            .keys()
            .any(|name| name.eq_ignore_ascii_case(service_name)))
    }

    /// 查询健康节点；传入 index 时为阻塞查询
    async fn health_nodes(
        &self,
        service_name: &str,
        index: Option<u64>,
    ) -> Result<(Vec<Node>, Option<u64>)> {
        let url = format!("{}/v1/health/service/{}", self.url, service_name);
        let mut query = vec![("passing", "true".to_string())];
        if let Some(index) = index {
            query.push(("index", index.to_string()));
            query.push(("wait", self.blocking_wait.clone()));
        }

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| DiscoveryError::backend(CONSUL, e))?;

        let new_index = resp
            .headers()
            .get("X-Consul-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let entries: Vec<HealthEntry> = resp
            .json()
            .await
            .map_err(|e| DiscoveryError::backend(CONSUL, e))?;

        let nodes = entries.into_iter().map(HealthEntry::into_node).collect();
        Ok((nodes, new_index))
    }
}

/// 后台阻塞查询任务
struct ConsulWatcher {
    client: ConsulClient,
    service_name: String,
    state: Arc<NodeState>,
    retry_interval: Duration,
    shutdown: CancellationToken,
}

impl ConsulWatcher {
    async fn run(self, mut index: Option<u64>) {
        loop {
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.poll(index) => result,
            };

            let delay = match result {
                Ok(new_index) => {
                    // index 回退时需要从头开始
                    let unchanged = new_index == index;
                    index = match (index, new_index) {
                        (Some(old), Some(new)) if new < old => None,
                        (_, new) => new,
                    };
                    if unchanged { MIN_WATCH_INTERVAL } else { Duration::ZERO }
                }
                Err(e) => {
                    warn!(
                        service = %self.service_name,
                        error = %e,
                        "⚠️ Failed to refresh Consul nodes"
                    );
                    self.retry_interval
                }
            };

            if !delay.is_zero() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        debug!(service = %self.service_name, "🛑 Consul watch task stopped");
    }

    async fn poll(&self, index: Option<u64>) -> Result<Option<u64>> {
        let (nodes, new_index) = self.client.health_nodes(&self.service_name, index).await?;

        if nodes.is_empty() && !self.client.is_deployed(&self.service_name).await? {
            if !self.state.was_undeployed() {
                info!(service = %self.service_name, "Service was undeployed from Consul");
            }
            self.state.mark_undeployed();
        }

        self.state.set_nodes(nodes);
        Ok(new_index)
    }
}
