//! 通用工具函数

use uuid::Uuid;

/// 生成新的 trace ID（UUID v7，时间有序）
pub fn new_trace_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// 生成 NSQ 风格的消息 ID（16 位十六进制）
pub fn new_message_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
