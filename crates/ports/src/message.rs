//! 消息、消费结果与消费回调

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use iron_errors::QueueResult;
use serde::de::DeserializeOwned;

/// 默认 channel 名称
pub const DEFAULT_CHANNEL: &str = "default";

/// 一条投递给消费者的消息
///
/// 除 trace ID 只能设置一次外，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: String,
    timestamp: i64,
    attempts: u16,
    payload: Vec<u8>,
    trace_id: Option<String>,
}

impl Message {
    pub fn new(id: impl Into<String>, timestamp: i64, attempts: u16, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            attempts,
            payload,
            trace_id: None,
        }
    }

    /// 设置 trace ID（已存在时保持原值）
    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        if self.trace_id.is_none() {
            self.trace_id = trace_id;
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 传输层时间戳（纳秒）
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn attempts(&self) -> u16 {
        self.attempts
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// UTF-8 视图
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// 按 JSON 解析消息体
    pub fn parse_payload<T: DeserializeOwned>(&self) -> QueueResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// 消费回调的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 处理完成
    Ack,
    /// 延迟 `delay_ms` 毫秒后重新投递
    Requeue { delay_ms: u64 },
}

impl Disposition {
    /// 延迟若干秒后重新投递
    pub fn later(seconds: u64) -> Self {
        Self::Requeue {
            delay_ms: seconds.saturating_mul(1000),
        }
    }

    /// 立即重新投递
    pub fn retry() -> Self {
        Self::Requeue { delay_ms: 1 }
    }

    pub fn is_requeue(&self) -> bool {
        matches!(self, Self::Requeue { .. })
    }

    pub fn requeue_delay(&self) -> Option<Duration> {
        match self {
            Self::Ack => None,
            Self::Requeue { delay_ms } => Some(Duration::from_millis(*delay_ms)),
        }
    }

    /// 指标标签
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Requeue { .. } => "requeue",
        }
    }
}

/// 订阅目标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicChannel {
    pub topic: String,
    pub channel: String,
}

impl TopicChannel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

impl From<&str> for TopicChannel {
    fn from(topic: &str) -> Self {
        Self::new(topic)
    }
}

impl From<String> for TopicChannel {
    fn from(topic: String) -> Self {
        Self::new(topic)
    }
}

impl From<(&str, &str)> for TopicChannel {
    fn from((topic, channel): (&str, &str)) -> Self {
        Self::new(topic).with_channel(channel)
    }
}

/// 消费回调
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Disposition;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Disposition> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Disposition {
        (self)(message).await
    }
}
