//! iron-errors - 统一错误处理
//!
//! 队列适配器各层共用的错误类型

use thiserror::Error;

/// 可重试的错误特征（小写匹配）
pub const RETRYABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "timed out",
    "timeout",
    "temporarily unavailable",
    "broken pipe",
    "econnrefused",
    "econnreset",
    "etimedout",
    "no route to host",
];

/// 队列错误类型
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否值得重试
    ///
    /// 传输层错误总是可重试；其余错误仅在消息命中网络类特征时重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Unavailable(msg) | Self::Internal(msg) => is_retryable_message(msg),
            _ => false,
        }
    }

    /// 错误类别（用于日志和指标标签）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config",
            Self::Transport(_) => "transport",
            Self::Codec(_) => "codec",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// 判断错误信息是否属于可重试的网络错误
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Result 类型别名
pub type QueueResult<T> = Result<T, QueueError>;
