//! adapter-nsq - NSQ 队列适配器
//!
//! 提供带重试的发布/订阅能力：
//! - 消息发布（单条、批量、JSON）
//! - 消息订阅（分段运行、连续失败重试、stop/close）
//! - 延迟重投、手动 finish
//! - 节点统计与健康检查
//! - nsqd HTTP 发布端与内存 broker

mod adapter;
mod codec;
mod ha;
mod health;
mod http;
mod memory;
mod registry;
mod resolver;
mod router;

pub use adapter::*;
pub use codec::*;
pub use ha::*;
pub use health::*;
pub use http::*;
pub use memory::*;
pub use registry::*;
pub use resolver::*;
pub use router::*;
