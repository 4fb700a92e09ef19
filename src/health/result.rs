//! 聚合结果数据结构
//!
//! 定义系统级检查结果、系统状态以及状态聚合规则

use crate::health::state::{AvailabilityStatus, CheckState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一次查询的聚合结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerResult {
    /// 系统整体状态（正常或异常）
    pub status: AvailabilityStatus,
    /// 各检查的详细状态，禁用详情时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, CheckState>>,
}

impl CheckerResult {
    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 从JSON字符串创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 系统级状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckerState {
    /// 系统整体状态
    pub status: AvailabilityStatus,
    /// 最后一次状态变化时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_at: Option<DateTime<Utc>>,
    /// 计算时各检查的状态快照
    #[serde(default)]
    pub check_states: BTreeMap<String, CheckState>,
}

/// 聚合各检查状态：任一检查异常则系统异常，否则正常
///
/// 从未执行过的检查（`Unknown`）不会单独导致系统异常。
pub fn aggregate_status<'a, I>(statuses: I) -> AvailabilityStatus
where
    I: IntoIterator<Item = &'a AvailabilityStatus>,
{
    if statuses.into_iter().any(AvailabilityStatus::is_down) {
        AvailabilityStatus::Down
    } else {
        AvailabilityStatus::Up
    }
}
