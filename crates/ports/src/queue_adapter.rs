//! 队列适配器 trait 定义

use std::sync::Arc;

use async_trait::async_trait;
use iron_errors::QueueResult;

use crate::{
    Disposition, MessageHandler, PublishOptions, PublishResult, StatsReport, SubscribeOptions,
    TopicChannel,
};

/// 带重试的发布/订阅适配器
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// 发布一条消息，失败只体现在结果码里
    async fn push(&self, topic: &str, message: Vec<u8>, options: &PublishOptions) -> PublishResult;

    /// 批量发布
    async fn bulk(
        &self,
        topic: &str,
        messages: Vec<Vec<u8>>,
        options: &PublishOptions,
    ) -> PublishResult;

    /// 订阅并阻塞到循环结束，返回订阅标识 `"<topic>-<channel>"`
    async fn pop(
        &self,
        target: TopicChannel,
        handler: Arc<dyn MessageHandler>,
        options: &SubscribeOptions,
    ) -> QueueResult<String>;

    /// 停止当前订阅
    async fn stop(&self) -> QueueResult<()>;

    /// finish 一条消息
    async fn delete(&self, message_id: &str) -> QueueResult<bool>;

    /// 延迟 `seconds` 秒后重新投递
    fn later(&self, seconds: u64) -> Disposition {
        Disposition::later(seconds)
    }

    /// 立即重新投递
    fn retry(&self) -> Disposition {
        Disposition::retry()
    }

    /// 释放订阅资源
    async fn close(&self) -> QueueResult<()>;

    /// 逐节点收集统计，从不失败
    async fn stats(&self, topic: &str) -> StatsReport;
}
