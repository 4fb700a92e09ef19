//! 检查状态机
//!
//! 单个检查的运行时状态以及从探针结果到可用性状态的迁移规则。
//!
//! ```text
//! Unknown ──成功──▶ Up ◀──成功── Down
//!    │                │            ▲
//!    └──达到阈值的失败──┴──达到阈值的失败┘
//! ```
//!
//! 未达到阈值的失败只累加计数，状态保持不变，避免抖动。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// 可用性状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    /// 尚未执行过检查
    #[default]
    Unknown,
    /// 正常
    Up,
    /// 异常
    Down,
}

impl std::fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvailabilityStatus::Up => write!(f, "正常"),
            AvailabilityStatus::Down => write!(f, "异常"),
            AvailabilityStatus::Unknown => write!(f, "未知"),
        }
    }
}

impl AvailabilityStatus {
    /// 判断状态是否为健康
    pub fn is_up(&self) -> bool {
        matches!(self, AvailabilityStatus::Up)
    }

    /// 判断状态是否为异常
    pub fn is_down(&self) -> bool {
        matches!(self, AvailabilityStatus::Down)
    }
}

/// 失败容忍策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// 连续失败多少次后判定为异常（至少为1）
    pub max_contiguous_fails: u32,
    /// 持续失败多长时间后判定为异常，0 表示禁用
    pub max_time_in_error: Duration,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_contiguous_fails: 1,
            max_time_in_error: Duration::ZERO,
        }
    }
}

impl FailurePolicy {
    /// 根据当前失败计数和首次失败时间判断是否达到异常阈值
    fn is_exceeded(&self, contiguous_fails: u32, first_failure: Option<Instant>, now: Instant) -> bool {
        if contiguous_fails >= self.max_contiguous_fails {
            return true;
        }

        match first_failure {
            Some(first) if !self.max_time_in_error.is_zero() => {
                now.saturating_duration_since(first) >= self.max_time_in_error
            }
            _ => false,
        }
    }
}

/// 单个检查的运行时状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckState {
    /// 当前状态
    pub status: AvailabilityStatus,
    /// 连续失败次数
    pub contiguous_fails: u32,
    /// 本轮失败开始的时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure_at: Option<DateTime<Utc>>,
    /// 最后检测时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// 最后成功时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    /// 最后失败时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    /// 最后一次失败的错误信息，成功时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 首次失败的单调时钟时间，用于计算持续失败时长
    #[serde(skip)]
    pub(crate) first_failure_instant: Option<Instant>,
}

impl CheckState {
    /// 根据探针结果计算下一个状态
    ///
    /// # 参数
    /// * `outcome` - 探针结果，失败时携带（已截断的）错误信息
    /// * `policy` - 失败容忍策略
    /// * `now` - 单调时钟当前时间
    /// * `wall` - 墙上时钟当前时间
    ///
    /// # 返回
    /// * `CheckState` - 新状态，原状态不变
    pub fn transition(
        &self,
        outcome: Result<(), String>,
        policy: &FailurePolicy,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> CheckState {
        let mut next = self.clone();
        next.last_checked_at = Some(wall);

        match outcome {
            Ok(()) => {
                next.status = AvailabilityStatus::Up;
                next.contiguous_fails = 0;
                next.first_failure_at = None;
                next.first_failure_instant = None;
                next.last_success_at = Some(wall);
                next.error = None;
            }
            Err(message) => {
                next.contiguous_fails = next.contiguous_fails.saturating_add(1);
                if next.first_failure_instant.is_none() {
                    next.first_failure_instant = Some(now);
                    next.first_failure_at = Some(wall);
                }
                next.last_failure_at = Some(wall);
                next.error = Some(message);

                if policy.is_exceeded(next.contiguous_fails, next.first_failure_instant, now) {
                    next.status = AvailabilityStatus::Down;
                }
            }
        }

        next
    }
}

/// 按字符截断错误信息
pub(crate) fn truncate_message(message: String, max_len: Option<usize>) -> String {
    match max_len {
        Some(max) if message.chars().count() > max => message.chars().take(max).collect(),
        _ => message,
    }
}
