//! iron-config - 配置加载库

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// nsqd 节点配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// nsqd HTTP 地址（host:port）
    pub host: String,
    /// 所属分区
    #[serde(default)]
    pub partition: Option<u32>,
}

impl NodeConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            partition: None,
        }
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }
}

/// NSQ 配置
#[derive(Debug, Clone, Deserialize)]
pub struct NsqConfig {
    /// topic 前缀，未显式映射的 topic 解析为 `{prefix}_{topic}`
    #[serde(default)]
    pub topic_prefix: Option<String>,
    /// 逻辑 topic -> 实际 topic 的显式映射
    #[serde(default)]
    pub topic_mapping: HashMap<String, String>,
    /// 默认节点列表
    pub nodes: Vec<NodeConfig>,
    /// 按实际 topic 覆盖的节点列表
    #[serde(default)]
    pub routes: HashMap<String, Vec<NodeConfig>>,
    /// HTTP 请求超时（毫秒）
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// 单条消息最大字节数（nsqd 默认 --max-msg-size）
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// 发布时是否自动生成 trace ID
    #[serde(default = "default_stamp_trace_id")]
    pub stamp_trace_id: bool,
}

fn default_http_timeout_ms() -> u64 {
    3000
}

fn default_max_message_bytes() -> usize {
    1024 * 1024
}

fn default_stamp_trace_id() -> bool {
    true
}

impl NsqConfig {
    pub fn new(nodes: Vec<NodeConfig>) -> Self {
        Self {
            topic_prefix: None,
            topic_mapping: HashMap::new(),
            nodes,
            routes: HashMap::new(),
            http_timeout_ms: default_http_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
            stamp_trace_id: default_stamp_trace_id(),
        }
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    pub fn with_topic_mapping(mut self, topic: impl Into<String>, actual: impl Into<String>) -> Self {
        self.topic_mapping.insert(topic.into(), actual.into());
        self
    }

    pub fn with_route(mut self, topic: impl Into<String>, nodes: Vec<NodeConfig>) -> Self {
        self.routes.insert(topic.into(), nodes);
        self
    }

    /// 解析实际 topic 名称
    pub fn parse_topic_name(&self, topic: &str) -> String {
        if let Some(actual) = self.topic_mapping.get(topic) {
            return actual.clone();
        }
        match &self.topic_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}_{}", prefix, topic),
            _ => topic.to_string(),
        }
    }

    /// 获取 topic 对应的节点（优先使用路由覆盖）
    pub fn nodes_for(&self, topic: &str) -> &[NodeConfig] {
        self.routes
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or(self.nodes.as_slice())
    }

    /// HTTP 超时
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid("nsq.nodes must not be empty".to_string()));
        }
        let mut all_nodes = self.nodes.iter().chain(self.routes.values().flatten());
        if let Some(node) = all_nodes.find(|n| n.host.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "nsq node host must not be empty: {:?}",
                node
            )));
        }
        if let Some((topic, _)) = self.routes.iter().find(|(_, nodes)| nodes.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "nsq.routes.{} must list at least one node",
                topic
            )));
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "nsq.http_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "nsq.max_message_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub nsq: NsqConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl QueueConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("IRON_").split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 Figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.nsq.validate()?;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
