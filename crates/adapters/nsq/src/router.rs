//! 静态节点路由

use std::sync::Arc;

use async_trait::async_trait;
use iron_config::{NodeConfig, NsqConfig};
use iron_errors::{QueueError, QueueResult};
use iron_ports::{Node, NodeRouter};

/// 从配置读取节点，路由表按实际 topic 覆盖默认节点
#[derive(Debug, Clone)]
pub struct StaticRouter {
    config: Arc<NsqConfig>,
}

impl StaticRouter {
    pub fn new(config: Arc<NsqConfig>) -> Self {
        Self { config }
    }

    fn nodes(&self, topic: &str) -> impl Iterator<Item = Node> + '_ {
        self.config.nodes_for(topic).iter().map(to_node)
    }
}

fn to_node(node: &NodeConfig) -> Node {
    Node::new(node.host.clone(), node.partition)
}

#[async_trait]
impl NodeRouter for StaticRouter {
    async fn publish_nodes(&self, topic: &str) -> QueueResult<Vec<Node>> {
        let nodes: Vec<Node> = self.nodes(topic).collect();
        if nodes.is_empty() {
            return Err(QueueError::not_found(format!(
                "no nsqd node configured for topic {}",
                topic
            )));
        }
        Ok(nodes)
    }

    async fn subscribe_nodes(&self, topic: &str, partition: Option<u32>) -> QueueResult<Vec<Node>> {
        let nodes: Vec<Node> = self
            .nodes(topic)
            .filter(|node| partition.is_none() || node.partition == partition)
            .collect();
        if nodes.is_empty() {
            return Err(QueueError::not_found(format!(
                "no nsqd node for topic {} partition {:?}",
                topic, partition
            )));
        }
        Ok(nodes)
    }
}
