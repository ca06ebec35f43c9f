//! 重试编排
//!
//! 发布：固定间隔重试可重试错误，共 `max_retry + 1` 次尝试。
//! 订阅：按段循环运行，连续失败超过 `max_retry` 后返回错误，随时响应取消

use std::time::Duration;

use async_trait::async_trait;
use iron_common::{with_conditional_retry, RetryConfig};
use iron_errors::{QueueError, QueueResult};
use iron_ports::{
    PublishAttempt, RawPublishResult, RetryOrchestrator, SegmentSignal, SubscribeSegment,
};
use iron_telemetry::SUBSCRIBE_RETRY_TOTAL;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 默认编排器
#[derive(Debug, Clone, Copy, Default)]
pub struct HaOrchestrator;

impl HaOrchestrator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RetryOrchestrator for HaOrchestrator {
    async fn run_publish_retrying(
        &self,
        key: &str,
        max_retry: u32,
        delay: Duration,
        attempt: &PublishAttempt<'_>,
    ) -> QueueResult<RawPublishResult> {
        let config = RetryConfig::fixed(max_retry, delay);
        with_conditional_retry(&config, key, || attempt(), QueueError::is_retryable).await
    }

    async fn run_subscribe_retrying(
        &self,
        key: &str,
        keep: Duration,
        max_retry: u32,
        delay: Duration,
        cancel: CancellationToken,
        segment: &SubscribeSegment<'_>,
    ) -> QueueResult<()> {
        let mut failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(key = key, "Subscribe loop cancelled");
                return Ok(());
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(key = key, "Subscribe loop cancelled during segment");
                    return Ok(());
                }
                result = segment(keep) => result,
            };

            match result {
                Ok(SegmentSignal::Continue) => {
                    failures = 0;
                    // 段可能立即完成，让出调度以便 stop 和定时器得以运行
                    tokio::task::yield_now().await;
                }
                Ok(SegmentSignal::Done) => return Ok(()),
                Err(e) => {
                    failures += 1;
                    if failures > max_retry {
                        error!(
                            key = key,
                            failures,
                            error = %e,
                            "Subscribe failed, retries exhausted"
                        );
                        return Err(e);
                    }

                    warn!(
                        key = key,
                        failures,
                        max_retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Subscribe segment failed, retrying"
                    );
                    metrics::counter!(SUBSCRIBE_RETRY_TOTAL, "key" => key.to_string()).increment(1);

                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
