//! nsqd 健康检查模块
//!
//! 逐个 ping 发布节点，所有节点可达才视为健康

use std::time::Instant;

use iron_ports::{Node, Publisher};
use serde::Serialize;
use tracing::{debug, error};

/// 单个节点的检查结果
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub host: String,
    pub healthy: bool,
    /// 延迟（毫秒）
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// 健康检查结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    /// 是否健康
    pub healthy: bool,
    pub nodes: Vec<NodeHealth>,
    /// 无法开始检查时的错误（例如路由失败）
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            nodes: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn unhealthy_nodes(&self) -> impl Iterator<Item = &NodeHealth> {
        self.nodes.iter().filter(|n| !n.healthy)
    }
}

/// 依次 ping 节点
pub async fn check_nodes(publisher: &dyn Publisher, nodes: &[Node]) -> HealthCheckResult {
    let mut results = Vec::with_capacity(nodes.len());

    for node in nodes {
        let start = Instant::now();
        match publisher.ping(&node.host).await {
            Ok(()) => {
                let latency = start.elapsed().as_millis() as u64;
                debug!(host = %node.host, latency_ms = latency, "nsqd health check passed");
                results.push(NodeHealth {
                    host: node.host.clone(),
                    healthy: true,
                    latency_ms: Some(latency),
                    error: None,
                });
            }
            Err(e) => {
                error!(host = %node.host, error = %e, "nsqd health check failed");
                results.push(NodeHealth {
                    host: node.host.clone(),
                    healthy: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    HealthCheckResult {
        healthy: !results.is_empty() && results.iter().all(|n| n.healthy),
        nodes: results,
        error: None,
    }
}
