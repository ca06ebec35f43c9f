//! 传输实例注册表

use std::sync::Arc;

use async_trait::async_trait;
use iron_errors::QueueResult;

use crate::{Publisher, Subscriber};

/// 持有按 topic 缓存的发布端以及当前活跃的订阅端
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    async fn publisher(&self, topic: &str) -> QueueResult<Arc<dyn Publisher>>;

    /// 获取订阅端并标记为活跃
    async fn subscriber(&self, topic: &str) -> QueueResult<Arc<dyn Subscriber>>;

    fn active_subscriber(&self) -> Option<Arc<dyn Subscriber>>;

    /// 订阅结束后取消活跃标记，实例保持打开直到 `close_subscribers`
    fn release_subscriber(&self);

    async fn close_subscribers(&self) -> QueueResult<()>;
}
