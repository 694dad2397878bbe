//! 节点定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 后端发现的一个服务节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    /// 主机名或 IP
    pub hostname: String,

    /// 端口（可选，未提供时由调用方使用服务默认端口）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Node {
    /// 创建新的节点
    pub fn new(hostname: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// 没有端口时使用默认端口
    pub fn with_default_port(mut self, default_port: Option<u16>) -> Self {
        if self.port.is_none() {
            self.port = default_port;
        }
        self
    }

    /// 转换为 HTTP URL
    pub fn to_http_url(&self) -> String {
        format!("http://{}", self)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.hostname, port),
            None => f.write_str(&self.hostname),
        }
    }
}

/// 解析 `host` 或 `host:port`
impl FromStr for Node {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty host".to_string());
        }

        match s.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(format!("missing hostname in '{}'", s));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|e| format!("invalid port in '{}': {}", s, e))?;
                Ok(Node::new(host, Some(port)))
            }
            None => Ok(Node::new(s, None)),
        }
    }
}
