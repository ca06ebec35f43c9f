//! iron-telemetry - 可观测性库

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 发布结果计数器
pub const PUBLISH_TOTAL: &str = "iron_queue_publish_total";
/// 投递消息计数器
pub const DELIVERY_TOTAL: &str = "iron_queue_delivery_total";
/// 订阅重试计数器
pub const SUBSCRIBE_RETRY_TOTAL: &str = "iron_queue_subscribe_retry_total";

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 按配置选择日志格式
pub fn init_from_config(log_level: &str, json: bool) {
    if json {
        init_tracing_json(log_level);
    } else {
        init_tracing(log_level);
    }
}

/// 初始化 Prometheus metrics
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(PUBLISH_TOTAL, "Publish results by topic and outcome");
    metrics::describe_counter!(DELIVERY_TOTAL, "Messages delivered to consumers by disposition");
    metrics::describe_counter!(SUBSCRIBE_RETRY_TOTAL, "Failed subscribe segments that were retried");

    Ok(handle)
}
