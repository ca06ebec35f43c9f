//! 适配器端到端行为：内存 broker 与手写 mock 协作者

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iron_adapter_nsq::{
    ConfigTopicResolver, InstanceMgr, MemoryBroker, NsqQueueAdapter, PublisherFactory,
    StaticRouter,
};
use iron_config::{NodeConfig, NsqConfig};
use iron_errors::{QueueError, QueueResult};
use iron_ports::{
    Disposition, InstanceRegistry, Message, MessageHandler, Node, NodeRouter, OutboundPayload,
    PublishAttempt, PublishOptions, Publisher, QueueAdapter, RawPublishResult, RetryOrchestrator,
    Subscriber, SubscribeOptions, SubscribeSegment, TopicChannel,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ---------------------------------------------------------------------------
// 辅助
// ---------------------------------------------------------------------------

fn config() -> NsqConfig {
    NsqConfig::new(vec![NodeConfig::new("127.0.0.1:4151").with_partition(0)]).with_topic_prefix("test")
}

fn pub_options() -> PublishOptions {
    PublishOptions::new(2, 1)
}

fn sub_options(auto_delete: bool) -> SubscribeOptions {
    SubscribeOptions::new(5, 1, 10).with_auto_delete(auto_delete)
}

fn memory_adapter() -> (Arc<NsqQueueAdapter>, Arc<MemoryBroker>) {
    let broker = MemoryBroker::shared();
    let adapter = NsqQueueAdapter::in_memory(&config(), broker.clone()).unwrap();
    (Arc::new(adapter), broker)
}

async fn pop_with_timeout(
    adapter: &NsqQueueAdapter,
    target: impl Into<TopicChannel>,
    handler: Arc<dyn MessageHandler>,
    options: &SubscribeOptions,
) -> QueueResult<String> {
    timeout(Duration::from_secs(5), adapter.pop(target.into(), handler, options))
        .await
        .expect("pop did not finish in time")
}

/// 按顺序返回预设的发布结果
struct ScriptedPublisher {
    calls: AtomicUsize,
    script: Mutex<VecDeque<QueueResult<RawPublishResult>>>,
}

impl ScriptedPublisher {
    fn new(script: Vec<QueueResult<RawPublishResult>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, _topic: &str, _payload: &OutboundPayload) -> QueueResult<RawPublishResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RawPublishResult::success()))
    }

    async fn node_stats(&self, host: &str, topic: &str) -> QueueResult<Value> {
        if host.starts_with("bad") {
            return Err(QueueError::transport(format!("{}: connection refused", host)));
        }
        Ok(json!({"host": host, "topic": topic}))
    }

    async fn ping(&self, host: &str) -> QueueResult<()> {
        if host.starts_with("bad") {
            return Err(QueueError::transport(format!("{}: connection refused", host)));
        }
        Ok(())
    }
}

fn mock_adapter(publisher: Arc<ScriptedPublisher>, hosts: &[&str]) -> NsqQueueAdapter {
    let config = Arc::new(
        NsqConfig::new(hosts.iter().map(|h| NodeConfig::new(*h)).collect()).with_topic_prefix("test"),
    );
    let factory: PublisherFactory =
        Arc::new(move |_topic: &str| Ok::<_, QueueError>(publisher.clone() as Arc<dyn Publisher>));

    NsqQueueAdapter::builder()
        .resolver(Arc::new(ConfigTopicResolver::new(config.clone())))
        .router(Arc::new(StaticRouter::new(config)))
        .registry(Arc::new(InstanceMgr::new(factory)))
        .build()
        .unwrap()
}

/// 只记录 key，不执行订阅
#[derive(Default)]
struct RecordingOrchestrator {
    publish_keys: Mutex<Vec<String>>,
    subscribe_keys: Mutex<Vec<String>>,
}

#[async_trait]
impl RetryOrchestrator for RecordingOrchestrator {
    async fn run_publish_retrying(
        &self,
        key: &str,
        _max_retry: u32,
        _delay: Duration,
        attempt: &PublishAttempt<'_>,
    ) -> QueueResult<RawPublishResult> {
        self.publish_keys.lock().push(key.to_string());
        attempt().await
    }

    async fn run_subscribe_retrying(
        &self,
        key: &str,
        _keep: Duration,
        _max_retry: u32,
        _delay: Duration,
        _cancel: CancellationToken,
        _segment: &SubscribeSegment<'_>,
    ) -> QueueResult<()> {
        self.subscribe_keys.lock().push(key.to_string());
        Ok(())
    }
}

struct FailingRouter;

#[async_trait]
impl NodeRouter for FailingRouter {
    async fn publish_nodes(&self, topic: &str) -> QueueResult<Vec<Node>> {
        Err(QueueError::not_found(format!("no nodes for {}", topic)))
    }

    async fn subscribe_nodes(&self, topic: &str, _partition: Option<u32>) -> QueueResult<Vec<Node>> {
        Err(QueueError::not_found(format!("no nodes for {}", topic)))
    }
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(Level, Option<String>)>>>);

impl Captured {
    fn errors(&self) -> Vec<Option<String>> {
        self.0
            .lock()
            .iter()
            .filter(|(level, _)| *level == Level::ERROR)
            .map(|(_, topic)| topic.clone())
            .collect()
    }
}

struct TopicField(Option<String>);

impl Visit for TopicField {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "topic" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "topic" {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for Captured {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut topic = TopicField(None);
        event.record(&mut topic);
        self.0.lock().push((*event.metadata().level(), topic.0));
    }
}

// ---------------------------------------------------------------------------
// 发布
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_push_retries_transport_errors() {
    let publisher = ScriptedPublisher::new(vec![
        Err(QueueError::transport("connection refused")),
        Err(QueueError::transport("connection refused")),
    ]);
    let adapter = mock_adapter(publisher.clone(), &["n1:4151"]);

    let result = adapter.push("orders", b"hello".to_vec(), &pub_options()).await;
    assert!(result.is_success());
    assert_eq!(publisher.calls(), 3);
}

#[tokio::test]
async fn test_push_exhausted_becomes_failure_result_and_logs_once() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

    let publisher = ScriptedPublisher::new(
        (0..3)
            .map(|_| Err(QueueError::transport("connection refused")))
            .collect(),
    );
    let adapter = mock_adapter(publisher.clone(), &["n1:4151"]);

    let result = adapter.push("orders", b"hello".to_vec(), &pub_options()).await;
    assert_eq!(result.error_code, 1);
    assert!(result.error_message.contains("connection refused"));
    assert_eq!(publisher.calls(), 3);
    assert_eq!(captured.errors(), vec![Some("orders".to_string())]);
}

#[tokio::test]
async fn test_rejected_publish_is_not_retried() {
    let publisher = ScriptedPublisher::new(vec![Ok(RawPublishResult::failure(vec![
        "n1:4151: 400 BAD_TOPIC".into(),
        "n2:4151: 400 BAD_TOPIC".into(),
    ]))]);
    let adapter = mock_adapter(publisher.clone(), &["n1:4151", "n2:4151"]);

    let result = adapter.push("orders", b"hello".to_vec(), &pub_options()).await;
    assert_eq!(result.error_code, 1);
    assert_eq!(result.error_message, "n1:4151: 400 BAD_TOPIC|n2:4151: 400 BAD_TOPIC");
    assert_eq!(publisher.calls(), 1);
}

#[tokio::test]
async fn test_indeterminate_publish_is_unknown_and_silent() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

    let publisher = ScriptedPublisher::new(vec![Ok(RawPublishResult::indeterminate())]);
    let adapter = mock_adapter(publisher, &["n1:4151"]);

    let result = adapter.bulk("orders", vec![b"a".to_vec()], &pub_options()).await;
    assert_eq!(result.error_code, -1);
    assert!(result.error_message.is_empty());
    assert!(captured.errors().is_empty());
}

#[tokio::test]
async fn test_encode_failure_becomes_failure_result() {
    let publisher = ScriptedPublisher::new(vec![]);
    let adapter = mock_adapter(publisher.clone(), &["n1:4151"]);

    let result = adapter.push("orders", Vec::new(), &pub_options()).await;
    assert_eq!(result.error_code, 1);
    assert!(result.error_message.contains("empty message"));
    assert_eq!(publisher.calls(), 0);

    let result = adapter.bulk("orders", Vec::new(), &pub_options()).await;
    assert!(result.error_message.contains("empty batch"));
}

#[tokio::test]
async fn test_publish_key_is_logical_topic() {
    let orchestrator = Arc::new(RecordingOrchestrator::default());
    let broker = MemoryBroker::shared();
    let config = Arc::new(config());
    let adapter = NsqQueueAdapter::builder()
        .resolver(Arc::new(ConfigTopicResolver::new(config.clone())))
        .router(Arc::new(StaticRouter::new(config)))
        .registry(Arc::new(InstanceMgr::in_memory(broker.clone())))
        .orchestrator(orchestrator.clone())
        .build()
        .unwrap();

    assert!(adapter.push("orders", b"x".to_vec(), &pub_options()).await.is_success());
    assert_eq!(*orchestrator.publish_keys.lock(), vec!["orders"]);
    // 实际发布使用解析后的 topic
    assert_eq!(broker.backlog("test_orders"), 1);
    assert_eq!(broker.backlog("orders"), 0);
}

// ---------------------------------------------------------------------------
// 订阅
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pop_identity_keys_orchestrator() {
    let orchestrator = Arc::new(RecordingOrchestrator::default());
    let config = Arc::new(config());
    let adapter = NsqQueueAdapter::builder()
        .resolver(Arc::new(ConfigTopicResolver::new(config.clone())))
        .router(Arc::new(StaticRouter::new(config)))
        .registry(Arc::new(InstanceMgr::in_memory(MemoryBroker::shared())))
        .orchestrator(orchestrator.clone())
        .build()
        .unwrap();
    let handler: Arc<dyn MessageHandler> = Arc::new(|_message: Message| async { Disposition::Ack });

    let first = adapter
        .pop("topicA".into(), handler.clone(), &sub_options(true))
        .await
        .unwrap();
    let second = adapter
        .pop(("topicA", "chanX").into(), handler, &sub_options(true))
        .await
        .unwrap();

    assert_eq!(first, "test_topicA-default");
    assert_eq!(second, "test_topicA-chanX");
    assert_eq!(
        *orchestrator.subscribe_keys.lock(),
        vec!["test_topicA-default", "test_topicA-chanX"]
    );
}

#[tokio::test]
async fn test_push_then_pop_in_order() {
    let (adapter, broker) = memory_adapter();

    for body in ["a", "b", "c"] {
        let result = adapter.push("orders", body.as_bytes().to_vec(), &pub_options()).await;
        assert!(result.is_success());
    }
    assert_eq!(broker.backlog("test_orders"), 3);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let adapter = adapter.clone();
        let seen = seen.clone();
        move |message: Message| {
            let adapter = adapter.clone();
            let seen = seen.clone();
            async move {
                let count = {
                    let mut seen = seen.lock();
                    seen.push(message.payload_str().unwrap_or_default().to_string());
                    seen.len()
                };
                if count == 3 {
                    adapter.stop().await.unwrap();
                }
                Disposition::Ack
            }
        }
    };

    let identity = pop_with_timeout(&adapter, "orders", Arc::new(handler), &sub_options(true))
        .await
        .unwrap();

    assert_eq!(identity, "test_orders-default");
    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    assert_eq!(broker.depth("test_orders", "default"), 0);
    assert_eq!(broker.in_flight("test_orders", "default"), 0);
}

#[tokio::test]
async fn test_retry_redelivers_with_more_attempts() {
    let (adapter, _broker) = memory_adapter();
    adapter.push("orders", b"job".to_vec(), &pub_options()).await;

    let seen = Arc::new(Mutex::new(Vec::<(String, u16)>::new()));
    let handler = {
        let adapter = adapter.clone();
        let seen = seen.clone();
        move |message: Message| {
            let adapter = adapter.clone();
            let seen = seen.clone();
            async move {
                seen.lock().push((message.id().to_string(), message.attempts()));
                if message.attempts() == 1 {
                    adapter.retry()
                } else {
                    adapter.stop().await.unwrap();
                    Disposition::Ack
                }
            }
        }
    };

    pop_with_timeout(&adapter, "orders", Arc::new(handler), &sub_options(true))
        .await
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, seen[1].0);
    assert_eq!((seen[0].1, seen[1].1), (1, 2));
}

#[tokio::test]
async fn test_manual_delete_finishes_message() {
    let (adapter, broker) = memory_adapter();
    adapter.push("orders", b"job".to_vec(), &pub_options()).await;

    let deleted = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let adapter = adapter.clone();
        let deleted = deleted.clone();
        move |message: Message| {
            let adapter = adapter.clone();
            let deleted = deleted.clone();
            async move {
                let removed = adapter.delete(message.id()).await.unwrap();
                deleted.lock().push((message.id().to_string(), removed));
                adapter.stop().await.unwrap();
                Disposition::Ack
            }
        }
    };

    pop_with_timeout(&adapter, "orders", Arc::new(handler), &sub_options(false))
        .await
        .unwrap();

    let (id, removed) = deleted.lock()[0].clone();
    assert!(removed);
    assert_eq!(broker.in_flight("test_orders", "default"), 0);
    assert!(!adapter.delete(&id).await.unwrap());
}

#[tokio::test]
async fn test_json_helpers_round_trip() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        sku: String,
    }

    let (adapter, _broker) = memory_adapter();
    let orders = vec![
        Order { id: 1, sku: "a-1".into() },
        Order { id: 2, sku: "b-2".into() },
    ];
    assert!(adapter.bulk_json("orders", &orders, &pub_options()).await.is_success());
    assert!(adapter
        .push_json("orders", &Order { id: 3, sku: "c-3".into() }, &pub_options())
        .await
        .is_success());

    let received = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let adapter = adapter.clone();
        let received = received.clone();
        move |message: Message| {
            let adapter = adapter.clone();
            let received = received.clone();
            async move {
                let order: Order = message.parse_payload().unwrap();
                let done = {
                    let mut received = received.lock();
                    received.push(order);
                    received.len() == 3
                };
                if done {
                    adapter.stop().await.unwrap();
                }
                Disposition::Ack
            }
        }
    };

    pop_with_timeout(&adapter, ("orders", "billing"), Arc::new(handler), &sub_options(true))
        .await
        .unwrap();

    let ids: Vec<u64> = received.lock().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_pop_gives_up_when_partition_has_no_node() {
    let (adapter, _broker) = memory_adapter();
    let handler: Arc<dyn MessageHandler> = Arc::new(|_message: Message| async { Disposition::Ack });
    let options = SubscribeOptions::new(1, 1, 1).with_partition(9);

    let err = pop_with_timeout(&adapter, "orders", handler, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}

#[tokio::test]
async fn test_close_requeues_in_flight_after_pop() {
    let (adapter, broker) = memory_adapter();
    adapter.push("orders", b"one".to_vec(), &pub_options()).await;

    let handler = {
        let adapter = adapter.clone();
        move |_message: Message| {
            let adapter = adapter.clone();
            async move {
                adapter.stop().await.unwrap();
                Disposition::Ack
            }
        }
    };
    let handler: Arc<dyn MessageHandler> = Arc::new(handler);

    // auto_delete 关闭，消息停留在途
    pop_with_timeout(&adapter, "orders", handler.clone(), &sub_options(false))
        .await
        .unwrap();
    assert_eq!(broker.in_flight("test_orders", "default"), 1);

    adapter.close().await.unwrap();
    assert_eq!(broker.in_flight("test_orders", "default"), 0);
    assert_eq!(broker.depth("test_orders", "default"), 1);

    pop_with_timeout(&adapter, "orders", handler, &sub_options(true))
        .await
        .unwrap();
    assert_eq!(broker.depth("test_orders", "default"), 0);
}

#[tokio::test]
async fn test_stop_does_not_leak_into_next_pop() {
    let (adapter, broker) = memory_adapter();
    adapter.push("orders", b"first".to_vec(), &pub_options()).await;

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let adapter = adapter.clone();
        let delivered = delivered.clone();
        move |message: Message| {
            let adapter = adapter.clone();
            let delivered = delivered.clone();
            async move {
                delivered.lock().push(message.payload_str().unwrap_or_default().to_string());
                adapter.stop().await.unwrap();
                Disposition::Ack
            }
        }
    };
    let handler: Arc<dyn MessageHandler> = Arc::new(handler);

    pop_with_timeout(&adapter, "orders", handler.clone(), &sub_options(true))
        .await
        .unwrap();

    // 没有进行中的订阅时 stop 不产生任何效果
    adapter.stop().await.unwrap();
    assert!(!adapter.delete("0123456789abcdef").await.unwrap());

    adapter.push("orders", b"second".to_vec(), &pub_options()).await;
    pop_with_timeout(&adapter, "orders", handler, &sub_options(true))
        .await
        .unwrap();

    assert_eq!(*delivered.lock(), vec!["first", "second"]);
    assert_eq!(broker.depth("test_orders", "default"), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn test_pop_rejects_zero_keep_seconds() {
    let (adapter, _broker) = memory_adapter();
    let handler: Arc<dyn MessageHandler> = Arc::new(|_message: Message| async { Disposition::Ack });

    let err = pop_with_timeout(&adapter, "orders", handler, &SubscribeOptions::new(0, 1, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

/// 前几次获取订阅端失败，之后委托给内存实现
struct FlakyRegistry {
    inner: InstanceMgr,
    failures_left: AtomicUsize,
    subscriber_calls: AtomicUsize,
}

#[async_trait]
impl InstanceRegistry for FlakyRegistry {
    async fn publisher(&self, topic: &str) -> QueueResult<Arc<dyn Publisher>> {
        self.inner.publisher(topic).await
    }

    async fn subscriber(&self, topic: &str) -> QueueResult<Arc<dyn Subscriber>> {
        self.subscriber_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(QueueError::unavailable(format!("subscriber for {} not ready", topic)));
        }
        self.inner.subscriber(topic).await
    }

    fn active_subscriber(&self) -> Option<Arc<dyn Subscriber>> {
        self.inner.active_subscriber()
    }

    fn release_subscriber(&self) {
        self.inner.release_subscriber()
    }

    async fn close_subscribers(&self) -> QueueResult<()> {
        self.inner.close_subscribers().await
    }
}

#[tokio::test]
async fn test_pop_retries_subscriber_acquisition() {
    let broker = MemoryBroker::shared();
    let registry = Arc::new(FlakyRegistry {
        inner: InstanceMgr::in_memory(broker.clone()),
        failures_left: AtomicUsize::new(2),
        subscriber_calls: AtomicUsize::new(0),
    });
    let config = Arc::new(config());
    let adapter = Arc::new(
        NsqQueueAdapter::builder()
            .resolver(Arc::new(ConfigTopicResolver::new(config.clone())))
            .router(Arc::new(StaticRouter::new(config)))
            .registry(registry.clone())
            .build()
            .unwrap(),
    );
    adapter.push("orders", b"job".to_vec(), &pub_options()).await;

    let handler = {
        let adapter = adapter.clone();
        move |_message: Message| {
            let adapter = adapter.clone();
            async move {
                adapter.stop().await.unwrap();
                Disposition::Ack
            }
        }
    };

    // max_retry = 2，前两次失败后第三次成功
    let options = SubscribeOptions::new(5, 2, 1);
    pop_with_timeout(&adapter, "orders", Arc::new(handler), &options)
        .await
        .unwrap();

    assert_eq!(registry.subscriber_calls.load(Ordering::SeqCst), 3);
    assert_eq!(broker.depth("test_orders", "default"), 0);
}

#[tokio::test]
async fn test_stop_and_delete_without_subscriber() {
    let (adapter, _broker) = memory_adapter();
    adapter.stop().await.unwrap();
    assert!(!adapter.delete("0123456789abcdef").await.unwrap());
    adapter.close().await.unwrap();
}

#[tokio::test]
async fn test_later_and_retry_are_distinct() {
    let (adapter, _broker) = memory_adapter();
    assert_eq!(adapter.later(5), Disposition::Requeue { delay_ms: 5000 });
    assert_eq!(adapter.retry(), Disposition::Requeue { delay_ms: 1 });
    assert_ne!(adapter.later(5), adapter.retry());
}

// ---------------------------------------------------------------------------
// 统计与健康检查
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stats_collects_every_node() {
    let publisher = ScriptedPublisher::new(vec![]);
    let adapter = mock_adapter(publisher, &["n1:4151", "bad-n2:4151", "n3:4151"]);

    let report = adapter.stats("orders").await;
    assert_eq!(report.len(), 3);
    assert_eq!(
        report.get("n1:4151").unwrap().as_ref().unwrap()["topic"],
        "test_orders"
    );
    assert!(report.get("bad-n2:4151").unwrap().is_err());
    assert!(report.get("n3:4151").unwrap().is_ok());

    let prefix = report.successful_prefix();
    assert_eq!(prefix.len(), 1);
    assert_eq!(prefix[0].0, "n1:4151");
}

#[tokio::test]
async fn test_stats_never_fails_on_routing_error() {
    let adapter = NsqQueueAdapter::builder()
        .resolver(Arc::new(ConfigTopicResolver::new(Arc::new(config()))))
        .router(Arc::new(FailingRouter))
        .registry(Arc::new(InstanceMgr::in_memory(MemoryBroker::shared())))
        .build()
        .unwrap();

    assert!(adapter.stats("orders").await.is_empty());
    assert!(!adapter.health("orders").await.healthy);
}

#[tokio::test]
async fn test_memory_stats_and_health() {
    let (adapter, _broker) = memory_adapter();
    adapter.push("orders", b"x".to_vec(), &pub_options()).await;

    let report = adapter.stats("orders").await;
    let stats = report.get("127.0.0.1:4151").unwrap().as_ref().unwrap();
    assert_eq!(stats["topics"][0]["topic_name"], "test_orders");
    assert_eq!(stats["topics"][0]["depth"], 1);

    let health = adapter.health("orders").await;
    assert!(health.healthy);
    assert_eq!(health.nodes.len(), 1);
}

#[tokio::test]
async fn test_health_reports_unreachable_node() {
    let publisher = ScriptedPublisher::new(vec![]);
    let adapter = mock_adapter(publisher, &["n1:4151", "bad-n2:4151"]);

    let health = adapter.health("orders").await;
    assert!(!health.healthy);
    let unhealthy: Vec<_> = health.unhealthy_nodes().map(|n| n.host.as_str()).collect();
    assert_eq!(unhealthy, vec!["bad-n2:4151"]);
}

#[tokio::test]
#[ignore] // 需要 nsqd 实例
async fn test_nsqd_http_publish_and_stats() {
    let adapter = NsqQueueAdapter::from_config(&config()).unwrap();

    let result = adapter.push("iron_it", b"hello".to_vec(), &pub_options()).await;
    assert!(result.is_success(), "{}", result.error_message);

    let report = adapter.stats("iron_it").await;
    assert_eq!(report.failure_count(), 0);
    assert!(adapter.health("iron_it").await.healthy);
}
