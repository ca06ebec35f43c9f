//! 调用方传入的发布/订阅选项
//!
//! 这一层不提供默认值，缺少字段即为校验错误

use std::time::Duration;

use iron_errors::{QueueError, QueueResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 发布选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    /// 失败后的最大重试次数
    pub max_retry: u32,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
}

impl PublishOptions {
    pub fn new(max_retry: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_retry,
            retry_delay_ms,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// 从松散的选项表构建
    pub fn from_map(map: &Map<String, Value>) -> QueueResult<Self> {
        from_option_map(map, "publish")
    }
}

/// 订阅选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// 订阅的分区，`None` 表示全部分区（字段本身必须出现）
    #[serde(deserialize_with = "Option::deserialize")]
    pub sub_partition: Option<u32>,
    /// 回调返回 Ack 后是否自动 finish
    pub auto_delete: bool,
    /// 是否顺序消费
    pub sub_ordered: bool,
    /// 单次订阅持续的秒数
    pub keep_seconds: u64,
    /// 连续失败的最大重试次数
    pub max_retry: u32,
    /// 重试间隔（毫秒）
    pub retry_delay: u64,
}

impl SubscribeOptions {
    pub fn new(keep_seconds: u64, max_retry: u32, retry_delay: u64) -> Self {
        Self {
            sub_partition: None,
            auto_delete: true,
            sub_ordered: false,
            keep_seconds,
            max_retry,
            retry_delay,
        }
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.sub_partition = Some(partition);
        self
    }

    pub fn with_auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.sub_ordered = ordered;
        self
    }

    pub fn keep(&self) -> Duration {
        Duration::from_secs(self.keep_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    /// 订阅段必须有持续时间
    pub fn validate(&self) -> QueueResult<()> {
        if self.keep_seconds == 0 {
            return Err(QueueError::validation("keep_seconds must be greater than zero"));
        }
        Ok(())
    }

    /// 从松散的选项表构建
    pub fn from_map(map: &Map<String, Value>) -> QueueResult<Self> {
        let options: Self = from_option_map(map, "subscribe")?;
        options.validate()?;
        Ok(options)
    }
}

fn from_option_map<T: DeserializeOwned>(map: &Map<String, Value>, kind: &str) -> QueueResult<T> {
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|e| QueueError::validation(format!("invalid {} options: {}", kind, e)))
}
