//! 重试编排接口

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use iron_errors::QueueResult;
use tokio_util::sync::CancellationToken;

use crate::RawPublishResult;

/// 一次订阅运行结束后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSignal {
    Continue,
    Done,
}

/// 一次发布尝试
pub type PublishAttempt<'a> =
    dyn Fn() -> BoxFuture<'a, QueueResult<RawPublishResult>> + Send + Sync + 'a;

/// 一次订阅运行，参数为本次持续时间
pub type SubscribeSegment<'a> =
    dyn Fn(Duration) -> BoxFuture<'a, QueueResult<SegmentSignal>> + Send + Sync + 'a;

#[async_trait]
pub trait RetryOrchestrator: Send + Sync {
    /// 执行发布，可重试错误最多重试 `max_retry` 次
    async fn run_publish_retrying(
        &self,
        key: &str,
        max_retry: u32,
        delay: Duration,
        attempt: &PublishAttempt<'_>,
    ) -> QueueResult<RawPublishResult>;

    /// 循环执行订阅运行，直到结束信号、取消或连续失败超过 `max_retry`
    async fn run_subscribe_retrying(
        &self,
        key: &str,
        keep: Duration,
        max_retry: u32,
        delay: Duration,
        cancel: CancellationToken,
        segment: &SubscribeSegment<'_>,
    ) -> QueueResult<()>;
}
