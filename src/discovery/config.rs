//! 服务发现配置

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::Result;

/// 服务发现配置
///
/// ```toml
/// environment_fallback_target = "prod"
/// load_balance = "round_robin"
///
/// [consul]
/// url = "http://localhost:8500"
///
/// [services.billing]
/// source = "Consul"
///
/// [services.legacy-gateway]
/// source = "Config"
/// hosts = "10.0.0.1:8080,10.0.0.2:8080"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 每个服务的发现配置，键为服务名
    pub services: HashMap<String, ServiceDiscoveryConfig>,

    /// Consul 后端配置
    pub consul: ConsulSettings,

    /// etcd 后端配置
    pub etcd: EtcdSettings,

    /// local 后端配置
    pub local: LocalSettings,

    /// 负载均衡策略
    pub load_balance: LoadBalanceStrategy,

    /// 不可达节点的重新探测间隔（秒）
    pub reachability_retry_secs: u64,

    /// 指定环境找不到服务时，回退尝试的环境（如 "prod"）
    pub environment_fallback_target: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            services: HashMap::new(),
            consul: ConsulSettings::default(),
            etcd: EtcdSettings::default(),
            local: LocalSettings::default(),
            load_balance: LoadBalanceStrategy::default(),
            reachability_retry_secs: 5,
            environment_fallback_target: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DiscoveryConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// 添加服务配置
    pub fn with_service(
        mut self,
        service_name: impl Into<String>,
        service: ServiceDiscoveryConfig,
    ) -> Self {
        self.services.insert(service_name.into(), service);
        self
    }

    pub fn service(&self, service_name: &str) -> Option<&ServiceDiscoveryConfig> {
        self.services.get(service_name)
    }

    pub fn reachability_retry(&self) -> Duration {
        Duration::from_secs(self.reachability_retry_secs)
    }
}

/// 单个服务的发现配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDiscoveryConfig {
    /// 发现源类型（大小写不敏感）：consul, etcd, config, local
    #[serde(default = "default_source")]
    pub source: String,

    /// config 源使用的节点列表，逗号分隔的 `host[:port]`
    #[serde(default)]
    pub hosts: Option<String>,

    /// 节点未携带端口时使用的默认端口
    #[serde(default)]
    pub default_port: Option<u16>,
}

fn default_source() -> String {
    BackendType::Consul.as_str().to_string()
}

impl Default for ServiceDiscoveryConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            hosts: None,
            default_port: None,
        }
    }
}

impl ServiceDiscoveryConfig {
    /// 指定发现源
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// 设置节点列表
    pub fn with_hosts(mut self, hosts: impl Into<String>) -> Self {
        self.hosts = Some(hosts.into());
        self
    }

    /// 设置默认端口
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = Some(port);
        self
    }
}

/// Consul 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsulSettings {
    /// Consul agent 地址
    pub url: String,

    /// 阻塞查询的最长等待时间（秒）
    pub blocking_wait_secs: u64,

    /// HTTP 请求超时（秒），需大于阻塞等待时间
    pub http_timeout_secs: u64,

    /// 监听失败后的重试间隔（秒）
    pub retry_interval_secs: u64,
}

impl Default for ConsulSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8500".to_string(),
            blocking_wait_secs: 30,
            http_timeout_secs: 40,
            retry_interval_secs: 5,
        }
    }
}

impl ConsulSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// etcd 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EtcdSettings {
    /// etcd endpoints
    pub endpoints: Vec<String>,

    /// 键前缀命名空间，键格式为 `{namespace}/services/{deployment}/{node}`
    pub namespace: String,

    /// watch 断开后重新订阅的间隔（秒）
    pub retry_interval_secs: u64,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:2379".to_string()],
            namespace: "flare".to_string(),
            retry_interval_secs: 5,
        }
    }
}

impl EtcdSettings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// local 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalSettings {
    pub hostname: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
        }
    }
}

/// 内置后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Consul,
    Etcd,
    Config,
    Local,
}

impl BackendType {
    pub const ALL: [BackendType; 4] = [
        BackendType::Consul,
        BackendType::Etcd,
        BackendType::Config,
        BackendType::Local,
    ];

    /// 后端类型名，即配置中 `source` 的取值
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Consul => "consul",
            BackendType::Etcd => "etcd",
            BackendType::Config => "config",
            BackendType::Local => "local",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BackendType::ALL
            .into_iter()
            .find(|backend| backend.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown backend type: {}", s))
    }
}

/// 负载均衡策略
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    /// 轮询
    #[default]
    RoundRobin,
    /// 随机
    Random,
    /// 一致性哈希（按路由键）
    ConsistentHash,
}

impl std::str::FromStr for LoadBalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(LoadBalanceStrategy::RoundRobin),
            "random" => Ok(LoadBalanceStrategy::Random),
            "consistent_hash" | "consistenthash" => Ok(LoadBalanceStrategy::ConsistentHash),
            _ => Err(format!("Unknown load balance strategy: {}", s)),
        }
    }
}

/// 配置提供者
///
/// 每次调用返回一份完整快照，解析过程只读取一次，避免前后两次读取到不同版本。
pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Arc<DiscoveryConfig>;
}

impl<F> ConfigProvider for F
where
    F: Fn() -> Arc<DiscoveryConfig> + Send + Sync,
{
    fn get_config(&self) -> Arc<DiscoveryConfig> {
        self()
    }
}

/// 固定配置
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: Arc<DiscoveryConfig>,
}

impl StaticConfigProvider {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_config(&self) -> Arc<DiscoveryConfig> {
        self.config.clone()
    }
}

/// 可热更新的配置
///
/// 更新以整份快照替换，正在进行的解析继续使用旧快照。
#[derive(Debug, Default)]
pub struct SharedConfigProvider {
    current: RwLock<Arc<DiscoveryConfig>>,
}

impl SharedConfigProvider {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// 替换当前配置
    pub fn update(&self, config: DiscoveryConfig) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::new(config);
    }

    /// 从文件重新加载配置，失败时保留旧配置
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = DiscoveryConfig::load_from_file(path)?;
        self.update(config);
        tracing::info!("🔄 Discovery config reloaded");
        Ok(())
    }
}

impl ConfigProvider for SharedConfigProvider {
    fn get_config(&self) -> Arc<DiscoveryConfig> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
