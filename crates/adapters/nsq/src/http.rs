//! nsqd HTTP 发布端
//!
//! 使用 nsqd 的 HTTP 接口：`/pub`、`/mpub`、`/stats`、`/ping`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iron_errors::{QueueError, QueueResult};
use iron_ports::{NodeRouter, OutboundMessage, OutboundPayload, Publisher, RawPublishResult};
use serde_json::Value;
use tracing::{debug, warn};

/// 构建 HTTP 客户端
pub fn build_http_client(timeout: Duration) -> QueueResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| QueueError::config(format!("Failed to build nsqd HTTP client: {}", e)))
}

/// 拼接节点地址，未带 scheme 时使用 http
pub fn endpoint(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, path)
    } else {
        format!("http://{}{}", host, path)
    }
}

/// `/mpub?binary=true` 的请求体
///
/// 4 字节大端消息数，之后每条消息为 4 字节大端长度加消息体
pub fn encode_mpub_body(messages: &[OutboundMessage]) -> QueueResult<Vec<u8>> {
    let size = 4 + messages.iter().map(|m| 4 + m.body.len()).sum::<usize>();
    let mut body = Vec::with_capacity(size);
    body.extend_from_slice(&frame_len(messages.len(), "message count")?);
    for message in messages {
        body.extend_from_slice(&frame_len(message.body.len(), "message size")?);
        body.extend_from_slice(&message.body);
    }
    Ok(body)
}

fn frame_len(len: usize, what: &str) -> QueueResult<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| QueueError::codec(format!("{} {} exceeds mpub frame limit", what, len)))
}

/// nsqd HTTP Publisher
pub struct NsqdHttpPublisher {
    client: reqwest::Client,
    router: Arc<dyn NodeRouter>,
}

impl NsqdHttpPublisher {
    pub fn new(router: Arc<dyn NodeRouter>, timeout: Duration) -> QueueResult<Self> {
        Ok(Self::with_client(build_http_client(timeout)?, router))
    }

    /// 复用已有的 HTTP 客户端
    pub fn with_client(client: reqwest::Client, router: Arc<dyn NodeRouter>) -> Self {
        Self { client, router }
    }

    fn publish_request(
        &self,
        host: &str,
        topic: &str,
        payload: &OutboundPayload,
        body: &[u8],
    ) -> reqwest::RequestBuilder {
        let request = match payload {
            OutboundPayload::Single(_) => self
                .client
                .post(endpoint(host, "/pub"))
                .query(&[("topic", topic)]),
            OutboundPayload::Batch(_) => self
                .client
                .post(endpoint(host, "/mpub"))
                .query(&[("topic", topic), ("binary", "true")]),
        };
        request.body(body.to_vec())
    }
}

#[async_trait]
impl Publisher for NsqdHttpPublisher {
    async fn publish(&self, topic: &str, payload: &OutboundPayload) -> QueueResult<RawPublishResult> {
        let nodes = self.router.publish_nodes(topic).await?;
        if nodes.is_empty() {
            return Ok(RawPublishResult::indeterminate());
        }
        let body = match payload {
            OutboundPayload::Single(message) => message.body.clone(),
            OutboundPayload::Batch(messages) => encode_mpub_body(messages)?,
        };

        let mut errors = Vec::new();
        let mut reached = false;

        for node in &nodes {
            match self.publish_request(&node.host, topic, payload, &body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        topic = topic,
                        host = %node.host,
                        count = payload.len(),
                        trace_ids = ?payload.messages().iter().filter_map(|m| m.trace_id.as_deref()).collect::<Vec<_>>(),
                        "Message published"
                    );
                    return Ok(RawPublishResult::success());
                }
                Ok(response) => {
                    reached = true;
                    let status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    warn!(topic = topic, host = %node.host, status, "nsqd rejected publish");
                    errors.push(format!("{}: {} {}", node.host, status, text.trim()));
                }
                Err(e) => {
                    warn!(topic = topic, host = %node.host, error = %e, "nsqd publish request failed");
                    errors.push(format!("{}: {}", node.host, e));
                }
            }
        }

        if reached {
            Ok(RawPublishResult::failure(errors))
        } else {
            Err(QueueError::transport(errors.join("|")))
        }
    }

    async fn node_stats(&self, host: &str, topic: &str) -> QueueResult<Value> {
        let response = self
            .client
            .get(endpoint(host, "/stats"))
            .query(&[("format", "json"), ("topic", topic)])
            .send()
            .await
            .map_err(|e| QueueError::transport(format!("{}: {}", host, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::unavailable(format!(
                "{}: stats returned {}",
                host,
                status.as_u16()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| QueueError::codec(format!("{}: invalid stats body: {}", host, e)))
    }

    async fn ping(&self, host: &str) -> QueueResult<()> {
        let response = self
            .client
            .get(endpoint(host, "/ping"))
            .send()
            .await
            .map_err(|e| QueueError::transport(format!("{}: {}", host, e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(QueueError::unavailable(format!(
                "{}: ping returned {}",
                host,
                response.status().as_u16()
            )))
        }
    }
}
