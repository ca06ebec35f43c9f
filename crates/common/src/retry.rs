//! 通用重试机制模块
//!
//! 固定间隔重试，供编排器复用

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// 重试配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 两次尝试之间的间隔
    pub delay: Duration,
}

impl RetryConfig {
    /// 固定间隔重试：`max_retry` 次重试，即最多 `max_retry + 1` 次尝试
    pub fn fixed(max_retry: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_retry.saturating_add(1),
            delay,
        }
    }
}

/// 带条件重试的异步操作执行器
///
/// 只有当 `should_retry` 返回 true 时才会重试；`max_attempts` 为 0 时仍执行一次
pub async fn with_conditional_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                let is_last_attempt = attempt + 1 >= max_attempts;

                if !should_retry(&e) {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                    return Err(e);
                }

                if is_last_attempt {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Operation failed, no more retries"
                    );
                    return Err(e);
                }

                let delay = config.delay;
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
