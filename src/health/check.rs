//! 检查定义
//!
//! 一个检查 = 名称 + 探针 + 失败容忍策略 + 拦截器 + 调度方式。
//! 注册到 `Checker` 之后不可再修改。

use crate::error::RegistrationError;
use crate::health::context::CheckContext;
use crate::health::interceptor::Interceptor;
use crate::health::listener::ComponentStatusListener;
use crate::health::probe::{probe_fn, Probe};
use crate::health::state::{CheckState, FailurePolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 检查的调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// 仅在查询时执行（结果受缓存控制）
    #[default]
    OnDemand,
    /// 启动后先等待 `initial_delay`，之后每隔 `interval` 执行一次
    Periodic {
        initial_delay: Duration,
        interval: Duration,
    },
}

impl Schedule {
    /// 是否为周期检查
    pub fn is_periodic(&self) -> bool {
        matches!(self, Schedule::Periodic { .. })
    }
}

/// 单个检查的定义
#[derive(Clone)]
pub struct Check {
    pub(crate) name: String,
    pub(crate) probe: Arc<dyn Probe>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) policy: FailurePolicy,
    pub(crate) interceptors: Vec<Interceptor>,
    pub(crate) status_listener: Option<ComponentStatusListener>,
    pub(crate) schedule: Schedule,
}

impl Check {
    /// 创建新的检查定义
    ///
    /// # 参数
    /// * `name` - 检查名称，在同一个 `Checker` 内唯一
    /// * `probe` - 探针实现
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            probe,
            timeout: None,
            policy: FailurePolicy::default(),
            interceptors: Vec::new(),
            status_listener: None,
            schedule: Schedule::OnDemand,
        }
    }

    /// 用异步闭包作为探针创建检查
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, probe_fn(f))
    }

    /// 设置检查专属超时时间，未设置时使用全局超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 设置连续失败阈值
    pub fn with_max_contiguous_fails(mut self, max: u32) -> Self {
        self.policy.max_contiguous_fails = max;
        self
    }

    /// 设置持续失败时长阈值，0 表示禁用
    pub fn with_max_time_in_error(mut self, duration: Duration) -> Self {
        self.policy.max_time_in_error = duration;
        self
    }

    /// 追加一个拦截器（先添加的位于外层）
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// 设置组件状态监听器
    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CheckContext, &str, &CheckState) + Send + Sync + 'static,
    {
        let listener: ComponentStatusListener = Arc::new(listener);
        self.status_listener = Some(listener);
        self
    }

    /// 设置调度方式
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// 检查名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 调度方式
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// 失败容忍策略
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// 注册时的结构性校验
    pub(crate) fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.trim().is_empty() {
            return Err(RegistrationError::EmptyName);
        }

        if self.policy.max_contiguous_fails == 0 {
            return Err(RegistrationError::InvalidThreshold {
                name: self.name.clone(),
            });
        }

        if matches!(self.timeout, Some(t) if t.is_zero()) {
            return Err(RegistrationError::InvalidTimeout {
                name: self.name.clone(),
            });
        }

        if let Schedule::Periodic { interval, .. } = self.schedule {
            if interval.is_zero() {
                return Err(RegistrationError::InvalidInterval {
                    name: self.name.clone(),
                });
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .field("interceptors", &self.interceptors.len())
            .field("has_status_listener", &self.status_listener.is_some())
            .field("schedule", &self.schedule)
            .finish()
    }
}
