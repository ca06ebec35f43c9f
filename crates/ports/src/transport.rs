//! 传输层接口
//!
//! 发布端与订阅端的具体实现由适配器提供

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iron_errors::QueueResult;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{Disposition, RawPublishResult};

/// broker 节点
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    /// nsqd HTTP 地址（host:port）
    pub host: String,
    pub partition: Option<u32>,
}

impl Node {
    pub fn new(host: impl Into<String>, partition: Option<u32>) -> Self {
        Self {
            host: host.into(),
            partition,
        }
    }
}

/// 待发送的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub trace_id: Option<String>,
}

/// 编码后的发布内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Single(OutboundMessage),
    Batch(Vec<OutboundMessage>),
}

impl OutboundPayload {
    pub fn messages(&self) -> &[OutboundMessage] {
        match self {
            Self::Single(message) => std::slice::from_ref(message),
            Self::Batch(messages) => messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }
}

/// 传输层投递的原始消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    /// 纳秒时间戳
    pub timestamp: i64,
    pub attempts: u16,
    pub body: Vec<u8>,
    pub trace_id: Option<String>,
}

/// 一次订阅请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub nodes: Vec<Node>,
    /// 解析后的实际 topic
    pub topic: String,
    pub channel: String,
    pub auto_delete: bool,
    pub ordered: bool,
}

/// 一次订阅运行的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 达到持续时间
    Elapsed,
    /// 被 stop 中止
    Stopped,
}

/// 传输层消息回调
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, message: InboundMessage) -> Disposition;
}

/// 发布端
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 发布单条或批量消息
    ///
    /// 节点明确拒绝时返回失败结果；所有节点都无法连接时返回传输错误
    async fn publish(&self, topic: &str, payload: &OutboundPayload) -> QueueResult<RawPublishResult>;

    /// 查询节点上 topic 的统计
    async fn node_stats(&self, host: &str, topic: &str) -> QueueResult<Value>;

    /// 探测节点是否存活
    async fn ping(&self, host: &str) -> QueueResult<()>;
}

/// 订阅端
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// 订阅并按顺序把消息交给 handler，最多持续 `keep`
    ///
    /// `cancel` 触发后尽快返回 `RunOutcome::Stopped`
    async fn consume(
        &self,
        request: SubscribeRequest,
        keep: Duration,
        handler: Arc<dyn InboundHandler>,
        cancel: CancellationToken,
    ) -> QueueResult<RunOutcome>;

    /// finish 一条仍在途的消息
    async fn delete_message(&self, message_id: &str) -> QueueResult<bool>;

    /// 释放订阅资源
    async fn close(&self) -> QueueResult<()>;
}
