//! NSQ 队列适配器
//!
//! 组合 topic 解析、编解码、路由、实例管理和重试编排，对外提供
//! push / bulk / pop / stop / delete / later / retry / close / stats

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use iron_config::NsqConfig;
use iron_errors::{QueueError, QueueResult};
use iron_ports::{
    Disposition, InboundHandler, InboundMessage, InstanceRegistry, MessageCodec, MessageHandler,
    NodeRouter, OutboundPayload, PublishOptions, PublishResult, QueueAdapter, RawPublishResult,
    RetryOrchestrator, SegmentSignal, StatsReport, SubscribeOptions, SubscribeRequest,
    TopicChannel, TopicNameResolver,
};
use iron_telemetry::{DELIVERY_TOTAL, PUBLISH_TOTAL};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::DefaultMessageCodec;
use crate::ha::HaOrchestrator;
use crate::health::{check_nodes, HealthCheckResult};
use crate::memory::MemoryBroker;
use crate::registry::InstanceMgr;
use crate::resolver::ConfigTopicResolver;
use crate::router::StaticRouter;

/// 把传输层原始结果归一化为发布结果
///
/// 失败时记录一条带 topic 的 error 日志；结果未知时不记录
pub fn make_pub_result(topic: &str, raw: &RawPublishResult) -> PublishResult {
    let result = PublishResult::from_raw(raw);
    if result.is_failure() {
        error!(topic = topic, errors = %result.error_message, "Publish failed");
    }
    metrics::counter!(
        PUBLISH_TOTAL,
        "topic" => topic.to_string(),
        "outcome" => result.outcome()
    )
    .increment(1);
    result
}

/// 正在进行的一次 pop
struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
}

/// NSQ 队列适配器
pub struct NsqQueueAdapter {
    resolver: Arc<dyn TopicNameResolver>,
    codec: Arc<dyn MessageCodec>,
    router: Arc<dyn NodeRouter>,
    registry: Arc<dyn InstanceRegistry>,
    orchestrator: Arc<dyn RetryOrchestrator>,
    running: Mutex<Option<ActiveRun>>,
    next_run: AtomicU64,
}

impl NsqQueueAdapter {
    pub fn builder() -> NsqQueueAdapterBuilder {
        NsqQueueAdapterBuilder::default()
    }

    /// 使用 nsqd HTTP 发布端
    pub fn from_config(config: &NsqConfig) -> QueueResult<Self> {
        config
            .validate()
            .map_err(|e| QueueError::config(e.to_string()))?;
        let shared = Arc::new(config.clone());
        let router: Arc<dyn NodeRouter> = Arc::new(StaticRouter::new(shared.clone()));
        let registry = InstanceMgr::nsqd_http(config, router.clone())?;

        Self::builder()
            .resolver(Arc::new(ConfigTopicResolver::new(shared)))
            .codec(Arc::new(DefaultMessageCodec::from_config(config)))
            .router(router)
            .registry(Arc::new(registry))
            .build()
    }

    /// 使用内存 broker 作为发布端和订阅端
    pub fn in_memory(config: &NsqConfig, broker: Arc<MemoryBroker>) -> QueueResult<Self> {
        let shared = Arc::new(config.clone());
        Self::builder()
            .resolver(Arc::new(ConfigTopicResolver::new(shared.clone())))
            .codec(Arc::new(DefaultMessageCodec::from_config(config)))
            .router(Arc::new(StaticRouter::new(shared)))
            .registry(Arc::new(InstanceMgr::in_memory(broker)))
            .build()
    }

    /// 序列化为 JSON 后发布
    pub async fn push_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
        options: &PublishOptions,
    ) -> PublishResult {
        match serde_json::to_vec(value) {
            Ok(body) => self.push(topic, body, options).await,
            Err(e) => make_pub_result(topic, &failure(QueueError::from(e))),
        }
    }

    /// 批量序列化为 JSON 后发布
    pub async fn bulk_json<T: Serialize>(
        &self,
        topic: &str,
        values: &[T],
        options: &PublishOptions,
    ) -> PublishResult {
        match values
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(bodies) => self.bulk(topic, bodies, options).await,
            Err(e) => make_pub_result(topic, &failure(QueueError::from(e))),
        }
    }

    /// ping topic 的所有发布节点
    pub async fn health(&self, topic: &str) -> HealthCheckResult {
        let resolved = self.resolver.resolve(topic);
        let nodes = match self.router.publish_nodes(&resolved).await {
            Ok(nodes) => nodes,
            Err(e) => return HealthCheckResult::unavailable(e.to_string()),
        };
        match self.registry.publisher(&resolved).await {
            Ok(publisher) => check_nodes(publisher.as_ref(), &nodes).await,
            Err(e) => HealthCheckResult::unavailable(e.to_string()),
        }
    }

    /// `topic` 为调用方的逻辑 topic，用作重试 key 和日志；`resolved` 用于实际发布
    async fn publish(
        &self,
        topic: &str,
        resolved: &str,
        encoded: QueueResult<OutboundPayload>,
        options: &PublishOptions,
    ) -> PublishResult {
        let payload = match encoded {
            Ok(payload) => payload,
            Err(e) => return make_pub_result(topic, &failure(e)),
        };

        let registry = &self.registry;
        let payload = &payload;
        let attempt = move || {
            async move {
                let publisher = registry.publisher(resolved).await?;
                publisher.publish(resolved, payload).await
            }
            .boxed()
        };

        let raw = self
            .orchestrator
            .run_publish_retrying(topic, options.max_retry, options.retry_delay(), &attempt)
            .await
            .unwrap_or_else(failure);
        make_pub_result(topic, &raw)
    }

    /// 登记新的运行并返回其令牌，之前的令牌不再受 stop 影响
    fn begin_run(&self) -> (u64, CancellationToken) {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *self.running.lock() = Some(ActiveRun {
            id,
            cancel: cancel.clone(),
        });
        (id, cancel)
    }

    fn end_run(&self, id: u64) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|run| run.id == id) {
            running.take();
            self.registry.release_subscriber();
        }
    }
}

fn failure(e: QueueError) -> RawPublishResult {
    RawPublishResult::failure(vec![e.to_string()])
}

#[async_trait]
impl QueueAdapter for NsqQueueAdapter {
    async fn push(&self, topic: &str, message: Vec<u8>, options: &PublishOptions) -> PublishResult {
        let resolved = self.resolver.resolve(topic);
        let encoded = self.codec.encode_one(&resolved, message);
        self.publish(topic, &resolved, encoded, options).await
    }

    async fn bulk(
        &self,
        topic: &str,
        messages: Vec<Vec<u8>>,
        options: &PublishOptions,
    ) -> PublishResult {
        let resolved = self.resolver.resolve(topic);
        let encoded = self.codec.encode_batch(&resolved, messages);
        self.publish(topic, &resolved, encoded, options).await
    }

    async fn pop(
        &self,
        target: TopicChannel,
        handler: Arc<dyn MessageHandler>,
        options: &SubscribeOptions,
    ) -> QueueResult<String> {
        options.validate()?;
        let resolved = self.resolver.resolve(&target.topic);
        let identity = format!("{}-{}", resolved, target.channel);
        let inbound: Arc<dyn InboundHandler> = Arc::new(Delivery {
            codec: self.codec.clone(),
            handler,
            identity: identity.clone(),
        });

        info!(subscription = %identity, partition = ?options.sub_partition, "Subscribing");

        let (run_id, cancel) = self.begin_run();
        let options = *options;
        let router = &self.router;
        let registry = &self.registry;
        let topic = resolved.as_str();
        let channel = target.channel.as_str();
        let key = identity.as_str();
        let inbound = &inbound;
        let run_cancel = &cancel;
        let segment = move |keep: Duration| {
            async move {
                let nodes = router.subscribe_nodes(topic, options.sub_partition).await?;
                let subscriber = registry.subscriber(topic).await?;
                let request = SubscribeRequest {
                    nodes,
                    topic: topic.to_string(),
                    channel: channel.to_string(),
                    auto_delete: options.auto_delete,
                    ordered: options.sub_ordered,
                };
                let outcome = subscriber
                    .consume(request, keep, inbound.clone(), run_cancel.clone())
                    .await?;
                debug!(subscription = key, ?outcome, "Subscribe segment finished");
                Ok::<_, QueueError>(SegmentSignal::Continue)
            }
            .boxed()
        };

        let result = self
            .orchestrator
            .run_subscribe_retrying(
                key,
                options.keep(),
                options.max_retry,
                options.retry_delay(),
                cancel.clone(),
                &segment,
            )
            .await;
        self.end_run(run_id);
        result?;

        info!(subscription = %identity, "Subscription ended");
        Ok(identity)
    }

    async fn stop(&self) -> QueueResult<()> {
        if let Some(run) = self.running.lock().as_ref() {
            run.cancel.cancel();
            info!("Subscriber stop requested");
        }
        Ok(())
    }

    async fn delete(&self, message_id: &str) -> QueueResult<bool> {
        match self.registry.active_subscriber() {
            Some(subscriber) => subscriber.delete_message(message_id).await,
            None => Ok(false),
        }
    }

    async fn close(&self) -> QueueResult<()> {
        if let Some(run) = self.running.lock().take() {
            run.cancel.cancel();
        }
        self.registry.close_subscribers().await
    }

    async fn stats(&self, topic: &str) -> StatsReport {
        let resolved = self.resolver.resolve(topic);
        let mut report = StatsReport::new();

        let nodes = match self.router.publish_nodes(&resolved).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(topic = %resolved, error = %e, "Failed to resolve nodes for stats");
                return report;
            }
        };
        let publisher = match self.registry.publisher(&resolved).await {
            Ok(publisher) => publisher,
            Err(e) => {
                warn!(topic = %resolved, error = %e, "Failed to get publisher for stats");
                return report;
            }
        };

        for node in nodes {
            match publisher.node_stats(&node.host, &resolved).await {
                Ok(stats) => report.push(node.host, Ok(stats)),
                Err(e) => {
                    warn!(topic = %resolved, host = %node.host, error = %e, "Failed to query node stats");
                    report.push(node.host, Err(e.to_string()));
                }
            }
        }
        report
    }
}

/// 把传输层消息解码后交给用户回调
struct Delivery {
    codec: Arc<dyn MessageCodec>,
    handler: Arc<dyn MessageHandler>,
    identity: String,
}

#[async_trait]
impl InboundHandler for Delivery {
    async fn on_message(&self, message: InboundMessage) -> Disposition {
        let message = self.codec.decode(message);
        let id = message.id().to_string();
        let disposition = self.handler.handle(message).await;
        debug!(subscription = %self.identity, message_id = %id, ?disposition, "Message handled");
        metrics::counter!(
            DELIVERY_TOTAL,
            "subscription" => self.identity.clone(),
            "disposition" => disposition.as_str()
        )
        .increment(1);
        disposition
    }
}

/// NsqQueueAdapter 构建器
#[derive(Default)]
pub struct NsqQueueAdapterBuilder {
    resolver: Option<Arc<dyn TopicNameResolver>>,
    codec: Option<Arc<dyn MessageCodec>>,
    router: Option<Arc<dyn NodeRouter>>,
    registry: Option<Arc<dyn InstanceRegistry>>,
    orchestrator: Option<Arc<dyn RetryOrchestrator>>,
}

impl NsqQueueAdapterBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn TopicNameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn router(mut self, router: Arc<dyn NodeRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn InstanceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn orchestrator(mut self, orchestrator: Arc<dyn RetryOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// 构建适配器，codec 与 orchestrator 未设置时使用默认实现
    pub fn build(self) -> QueueResult<NsqQueueAdapter> {
        Ok(NsqQueueAdapter {
            resolver: self
                .resolver
                .ok_or_else(|| QueueError::config("topic resolver is required"))?,
            codec: self
                .codec
                .unwrap_or_else(|| Arc::new(DefaultMessageCodec::default())),
            router: self
                .router
                .ok_or_else(|| QueueError::config("node router is required"))?,
            registry: self
                .registry
                .ok_or_else(|| QueueError::config("instance registry is required"))?,
            orchestrator: self
                .orchestrator
                .unwrap_or_else(|| Arc::new(HaOrchestrator::new())),
            running: Mutex::new(None),
            next_run: AtomicU64::new(0),
        })
    }
}
