//! topic 解析、消息编解码与节点路由

use async_trait::async_trait;
use iron_errors::QueueResult;

use crate::{InboundMessage, Message, Node, OutboundPayload};

/// 逻辑 topic -> 实际 topic
pub trait TopicNameResolver: Send + Sync {
    fn resolve(&self, topic: &str) -> String;
}

/// 消息编解码
pub trait MessageCodec: Send + Sync {
    fn encode_one(&self, topic: &str, payload: Vec<u8>) -> QueueResult<OutboundPayload>;

    fn encode_batch(&self, topic: &str, payloads: Vec<Vec<u8>>) -> QueueResult<OutboundPayload>;

    fn decode(&self, message: InboundMessage) -> Message;
}

/// 节点路由
#[async_trait]
pub trait NodeRouter: Send + Sync {
    /// 发布节点（按优先顺序）
    async fn publish_nodes(&self, topic: &str) -> QueueResult<Vec<Node>>;

    /// 订阅节点，`partition` 为 `None` 时返回全部分区
    async fn subscribe_nodes(&self, topic: &str, partition: Option<u32>) -> QueueResult<Vec<Node>>;
}
