//! 消息编解码

use iron_common::new_trace_id;
use iron_config::NsqConfig;
use iron_errors::{QueueError, QueueResult};
use iron_ports::{InboundMessage, Message, MessageCodec, OutboundMessage, OutboundPayload};

/// 默认编解码器
///
/// 消息体原样传输，发布时校验大小并可生成 trace ID
#[derive(Debug, Clone)]
pub struct DefaultMessageCodec {
    max_message_bytes: usize,
    stamp_trace_id: bool,
}

impl DefaultMessageCodec {
    pub fn new(max_message_bytes: usize, stamp_trace_id: bool) -> Self {
        Self {
            max_message_bytes,
            stamp_trace_id,
        }
    }

    pub fn from_config(config: &NsqConfig) -> Self {
        Self::new(config.max_message_bytes, config.stamp_trace_id)
    }

    fn outbound(&self, topic: &str, body: Vec<u8>) -> QueueResult<OutboundMessage> {
        if body.is_empty() {
            return Err(QueueError::validation(format!(
                "empty message for topic {}",
                topic
            )));
        }
        if body.len() > self.max_message_bytes {
            return Err(QueueError::validation(format!(
                "message for topic {} is {} bytes, limit is {}",
                topic,
                body.len(),
                self.max_message_bytes
            )));
        }
        Ok(OutboundMessage {
            body,
            trace_id: self.stamp_trace_id.then(new_trace_id),
        })
    }
}

impl Default for DefaultMessageCodec {
    fn default() -> Self {
        Self::new(1024 * 1024, true)
    }
}

impl MessageCodec for DefaultMessageCodec {
    fn encode_one(&self, topic: &str, payload: Vec<u8>) -> QueueResult<OutboundPayload> {
        Ok(OutboundPayload::Single(self.outbound(topic, payload)?))
    }

    fn encode_batch(&self, topic: &str, payloads: Vec<Vec<u8>>) -> QueueResult<OutboundPayload> {
        if payloads.is_empty() {
            return Err(QueueError::validation(format!(
                "empty batch for topic {}",
                topic
            )));
        }
        let messages = payloads
            .into_iter()
            .map(|body| self.outbound(topic, body))
            .collect::<QueueResult<Vec<_>>>()?;
        Ok(OutboundPayload::Batch(messages))
    }

    fn decode(&self, message: InboundMessage) -> Message {
        Message::new(message.id, message.timestamp, message.attempts, message.body)
            .with_trace_id(message.trace_id)
    }
}
