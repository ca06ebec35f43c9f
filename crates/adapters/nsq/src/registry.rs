//! 传输实例管理
//!
//! 发布端按 topic 懒加载并缓存；订阅端由外部注入，交出后记为活跃实例，
//! 订阅结束时取消活跃标记，直到 close 才真正释放

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use iron_config::NsqConfig;
use iron_errors::{QueueError, QueueResult};
use iron_ports::{InstanceRegistry, NodeRouter, Publisher, Subscriber};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::http::{build_http_client, NsqdHttpPublisher};
use crate::memory::MemoryBroker;

/// 按实际 topic 创建发布端
pub type PublisherFactory = Arc<dyn Fn(&str) -> QueueResult<Arc<dyn Publisher>> + Send + Sync>;

/// 实例管理器
pub struct InstanceMgr {
    factory: PublisherFactory,
    publishers: RwLock<HashMap<String, Arc<dyn Publisher>>>,
    subscriber: Option<Arc<dyn Subscriber>>,
    active: RwLock<Option<Arc<dyn Subscriber>>>,
    opened: RwLock<Option<Arc<dyn Subscriber>>>,
}

impl InstanceMgr {
    pub fn new(factory: PublisherFactory) -> Self {
        Self {
            factory,
            publishers: RwLock::new(HashMap::new()),
            subscriber: None,
            active: RwLock::new(None),
            opened: RwLock::new(None),
        }
    }

    /// 设置订阅端
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// nsqd HTTP 发布端，所有 topic 共用一个 HTTP 客户端
    pub fn nsqd_http(config: &NsqConfig, router: Arc<dyn NodeRouter>) -> QueueResult<Self> {
        let client = build_http_client(config.http_timeout())?;
        let factory: PublisherFactory = Arc::new(move |topic: &str| {
            debug!(topic = topic, "Creating nsqd HTTP publisher");
            let publisher = NsqdHttpPublisher::with_client(client.clone(), router.clone());
            Ok::<_, QueueError>(Arc::new(publisher) as Arc<dyn Publisher>)
        });
        Ok(Self::new(factory))
    }

    /// 发布端和订阅端都使用同一个内存 broker
    pub fn in_memory(broker: Arc<MemoryBroker>) -> Self {
        let publisher = broker.clone();
        let factory: PublisherFactory =
            Arc::new(move |_topic: &str| Ok::<_, QueueError>(publisher.clone() as Arc<dyn Publisher>));
        Self::new(factory).with_subscriber(broker)
    }

    /// 已缓存的发布端数量
    pub fn cached_publishers(&self) -> usize {
        self.publishers.read().len()
    }
}

#[async_trait]
impl InstanceRegistry for InstanceMgr {
    async fn publisher(&self, topic: &str) -> QueueResult<Arc<dyn Publisher>> {
        if let Some(publisher) = self.publishers.read().get(topic) {
            return Ok(publisher.clone());
        }

        let created = (self.factory)(topic)?;
        let mut publishers = self.publishers.write();
        Ok(publishers
            .entry(topic.to_string())
            .or_insert(created)
            .clone())
    }

    async fn subscriber(&self, topic: &str) -> QueueResult<Arc<dyn Subscriber>> {
        let subscriber = self.subscriber.clone().ok_or_else(|| {
            QueueError::config(format!("no subscriber transport configured for topic {}", topic))
        })?;
        *self.active.write() = Some(subscriber.clone());
        *self.opened.write() = Some(subscriber.clone());
        Ok(subscriber)
    }

    fn active_subscriber(&self) -> Option<Arc<dyn Subscriber>> {
        self.active.read().clone()
    }

    fn release_subscriber(&self) {
        self.active.write().take();
    }

    async fn close_subscribers(&self) -> QueueResult<()> {
        self.active.write().take();
        let opened = self.opened.write().take();
        if let Some(subscriber) = opened {
            subscriber.close().await?;
            info!("Subscriber closed");
        }
        Ok(())
    }
}
