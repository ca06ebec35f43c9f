//! ports - 抽象 trait 层
//!
//! 定义队列适配器的领域类型以及所有协作者接口

mod message;
mod options;
mod publish;
mod queue_adapter;
mod registry;
mod retry;
mod routing;
mod transport;

pub use message::*;
pub use options::*;
pub use publish::*;
pub use queue_adapter::*;
pub use registry::*;
pub use retry::*;
pub use routing::*;
pub use transport::*;
