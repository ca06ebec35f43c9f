//! 基于配置的 topic 名称解析

use std::sync::Arc;

use iron_config::NsqConfig;
use iron_ports::TopicNameResolver;

/// 按配置的映射表和前缀解析 topic
#[derive(Debug, Clone)]
pub struct ConfigTopicResolver {
    config: Arc<NsqConfig>,
}

impl ConfigTopicResolver {
    pub fn new(config: Arc<NsqConfig>) -> Self {
        Self { config }
    }
}

impl TopicNameResolver for ConfigTopicResolver {
    fn resolve(&self, topic: &str) -> String {
        self.config.parse_topic_name(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iron_config::NodeConfig;

    #[test]
    fn test_resolve_prefers_mapping() {
        let config = NsqConfig::new(vec![NodeConfig::new("127.0.0.1:4151")])
            .with_topic_prefix("staging")
            .with_topic_mapping("legacy", "legacy_v1");
        let resolver = ConfigTopicResolver::new(Arc::new(config));

        assert_eq!(resolver.resolve("orders"), "staging_orders");
        assert_eq!(resolver.resolve("legacy"), "legacy_v1");
    }
}
