//! 发布结果与节点统计

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 发布成功
pub const CODE_SUCCESS: i32 = 0;
/// 传输层报告失败
pub const CODE_FAILURE: i32 = 1;
/// 结果未知
pub const CODE_UNKNOWN: i32 = -1;

/// 传输层返回的原始发布结果
///
/// 两个字段都可能缺失，此时结果无法判定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPublishResult {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl RawPublishResult {
    pub fn success() -> Self {
        Self {
            success: Some(true),
            errors: None,
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: Some(false),
            errors: Some(errors),
        }
    }

    /// 无法判定的结果
    pub fn indeterminate() -> Self {
        Self::default()
    }
}

/// 归一化后的发布结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// 0 成功，1 失败，-1 未知
    pub error_code: i32,
    /// 失败时为 `|` 连接的错误信息
    pub error_message: String,
}

impl PublishResult {
    pub fn success() -> Self {
        Self {
            error_code: CODE_SUCCESS,
            error_message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error_code: CODE_FAILURE,
            error_message: message.into(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            error_code: CODE_UNKNOWN,
            error_message: String::new(),
        }
    }

    /// 按原始结果归一化（不记录日志）
    pub fn from_raw(raw: &RawPublishResult) -> Self {
        if raw.success == Some(true) {
            return Self::success();
        }
        match &raw.errors {
            Some(errors) if !errors.is_empty() => Self::failure(errors.join("|")),
            _ => Self::unknown(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == CODE_SUCCESS
    }

    pub fn is_failure(&self) -> bool {
        self.error_code == CODE_FAILURE
    }

    pub fn is_unknown(&self) -> bool {
        self.error_code == CODE_UNKNOWN
    }

    /// 指标标签
    pub fn outcome(&self) -> &'static str {
        match self.error_code {
            CODE_SUCCESS => "success",
            CODE_FAILURE => "failure",
            _ => "unknown",
        }
    }
}

/// 单个节点的统计结果
pub type NodeStats = Result<Value, String>;

/// 按节点顺序收集的统计报告
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsReport {
    entries: Vec<(String, NodeStats)>,
}

impl StatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个节点的结果，同一 host 重复记录时覆盖原值
    pub fn push(&mut self, host: impl Into<String>, stats: NodeStats) {
        let host = host.into();
        match self.entries.iter_mut().find(|(h, _)| *h == host) {
            Some(entry) => entry.1 = stats,
            None => self.entries.push((host, stats)),
        }
    }

    pub fn get(&self, host: &str) -> Option<&NodeStats> {
        self.entries
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, stats)| stats)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeStats)> {
        self.entries.iter().map(|(host, stats)| (host.as_str(), stats))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(host, _)| host.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|(_, stats)| stats.is_err()).count()
    }

    /// 第一个失败节点之前的成功结果
    pub fn successful_prefix(&self) -> Vec<(&str, &Value)> {
        self.entries
            .iter()
            .map_while(|(host, stats)| stats.as_ref().ok().map(|value| (host.as_str(), value)))
            .collect()
    }

    pub fn into_map(self) -> HashMap<String, NodeStats> {
        self.entries.into_iter().collect()
    }
}
