//! etcd 节点源

use async_trait::async_trait;
use etcd_client::{Client, GetOptions, WatchOptions, WatchStream, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::backend::{NodeSource, NodeState};
use crate::discovery::config::{BackendType, EtcdSettings};
use crate::discovery::identifier::DeploymentIdentifier;
use crate::discovery::node::Node;
use crate::error::{DiscoveryError, Result};

const ETCD: &str = "etcd";

/// etcd 节点源
///
/// 节点以 JSON 形式存放在 `{namespace}/services/{deployment}/` 前缀下，
/// 每个键对应一个节点。前缀下没有任何键时视为服务已下线；
/// 键存在但值无法解析时只跳过该节点，不视为下线。
pub struct EtcdNodeSource {
    deployment: DeploymentIdentifier,
    settings: EtcdSettings,
    state: Arc<NodeState>,
    initialized: OnceCell<()>,
    shutdown: CancellationToken,
}

impl EtcdNodeSource {
    /// 创建新的 etcd 节点源（不建立连接）
    pub fn new(deployment: DeploymentIdentifier, settings: EtcdSettings) -> Self {
        Self {
            deployment,
            settings,
            state: Arc::new(NodeState::default()),
            initialized: OnceCell::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn key_prefix(&self) -> String {
        format!("{}/services/{}/", self.settings.namespace, self.deployment)
    }

    async fn start(&self) -> Result<()> {
        let mut client = Client::connect(&self.settings.endpoints, None)
            .await
            .map_err(|e| DiscoveryError::backend(ETCD, e))?;
        let prefix = self.key_prefix();

        let entries = load_prefix(&mut client, &prefix).await?;
        if entries.is_empty() {
            info!(prefix = %prefix, "Service is not deployed in etcd");
            self.state.mark_undeployed();
            return Ok(());
        }

        info!(
            prefix = %prefix,
            nodes = entries.nodes.len(),
            "✅ etcd node source initialized"
        );
        self.state.set_nodes(entries.nodes);

        let subscription = subscribe(&mut client, &prefix).await?;
        let watcher = EtcdWatcher {
            client,
            prefix,
            state: self.state.clone(),
            retry_interval: self.settings.retry_interval(),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(watcher.run(subscription));

        Ok(())
    }
}

#[async_trait]
impl NodeSource for EtcdNodeSource {
    fn source_type(&self) -> &str {
        BackendType::Etcd.as_str()
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
            debug!(service = %self.deployment, "etcd node source shut down");
        }
        self.shutdown.cancel();
    }
}

impl Drop for EtcdNodeSource {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 前缀下的键值
struct PrefixEntries {
    key_count: usize,
    nodes: Vec<Node>,
}

impl PrefixEntries {
    /// 前缀下没有任何键
    fn is_empty(&self) -> bool {
        self.key_count == 0
    }
}

async fn load_prefix(client: &mut Client, prefix: &str) -> Result<PrefixEntries> {
    let opts = GetOptions::new().with_prefix();
    let resp = client
        .get(prefix, Some(opts))
        .await
        .map_err(|e| DiscoveryError::backend(ETCD, e))?;

    let mut nodes = Vec::new();
    for kv in resp.kvs() {
        match serde_json::from_slice::<Node>(kv.value()) {
            Ok(node) => nodes.push(node),
            Err(e) => {
                warn!(
                    key = %String::from_utf8_lossy(kv.key()),
                    error = %e,
                    "Skipping malformed etcd node entry"
                );
            }
        }
    }

    Ok(PrefixEntries {
        key_count: resp.kvs().len(),
        nodes,
    })
}

async fn subscribe(client: &mut Client, prefix: &str) -> Result<(Watcher, WatchStream)> {
    let opts = WatchOptions::new().with_prefix();
    client
        .watch(prefix, Some(opts))
        .await
        .map_err(|e| DiscoveryError::backend(ETCD, e))
}

/// 后台 watch 任务
///
/// watch 流出错或被关闭时，等待 `retry_interval` 后重新订阅并重新加载前缀，
/// 只在 shutdown 时退出。
struct EtcdWatcher {
    client: Client,
    prefix: String,
    state: Arc<NodeState>,
    retry_interval: Duration,
    shutdown: CancellationToken,
}

impl EtcdWatcher {
    async fn run(mut self, initial: (Watcher, WatchStream)) {
        let mut subscription = Some(initial);

        loop {
            // watcher 必须存活，否则 watch 流会被关闭
            let (mut watcher, mut stream) = match subscription.take() {
                Some(subscription) => subscription,
                None => match self.resubscribe().await {
                    Ok(subscription) => subscription,
                    Err(e) => {
                        warn!(prefix = %self.prefix, error = %e, "⚠️ Failed to re-subscribe to etcd");
                        if self.wait_retry().await {
                            continue;
                        }
                        break;
                    }
                },
            };

            let stopped = self.consume(&mut stream).await;
            let _ = watcher.cancel().await;
            if stopped || !self.wait_retry().await {
                break;
            }
        }

        debug!(prefix = %self.prefix, "🛑 etcd watch task stopped");
    }

    /// 处理 watch 事件；返回 `true` 表示已 shutdown，`false` 表示流已断开
    async fn consume(&mut self, stream: &mut WatchStream) -> bool {
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => return true,
                message = stream.message() => message,
            };

            match message {
                Ok(Some(_)) => self.reload().await,
                Ok(None) => {
                    warn!(prefix = %self.prefix, "⚠️ etcd watch stream closed");
                    return false;
                }
                Err(e) => {
                    warn!(prefix = %self.prefix, error = %e, "⚠️ etcd watch failed");
                    return false;
                }
            }
        }
    }

    /// 先订阅再加载，断开期间的变化不会丢失
    async fn resubscribe(&mut self) -> Result<(Watcher, WatchStream)> {
        let subscription = subscribe(&mut self.client, &self.prefix).await?;
        info!(prefix = %self.prefix, "🔄 etcd watch re-subscribed");
        self.reload().await;
        Ok(subscription)
    }

    async fn reload(&mut self) {
        match load_prefix(&mut self.client, &self.prefix).await {
            Ok(entries) => {
                if entries.is_empty() {
                    if !self.state.was_undeployed() {
                        info!(prefix = %self.prefix, "Service was undeployed from etcd");
                    }
                    self.state.mark_undeployed();
                }
                self.state.set_nodes(entries.nodes);
            }
            Err(e) => {
                warn!(prefix = %self.prefix, error = %e, "⚠️ Failed to reload etcd nodes");
            }
        }
    }

    /// 等待重试间隔；期间被 shutdown 时返回 `false`
    async fn wait_retry(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.retry_interval) => true,
        }
    }
}
