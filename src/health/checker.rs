//! 健康检查器模块
//!
//! `Checker` 是对外的查询入口：汇总所有检查的状态，计算系统状态，
//! 并负责结果缓存、中间件链和周期检查的生命周期。

use crate::error::{panic_message, RegistrationError};
use crate::health::check::{Check, Schedule};
use crate::health::context::CheckContext;
use crate::health::interceptor::{chain_middlewares, middleware_fn, Middleware, MiddlewareFunc};
use crate::health::listener::{notify_system, SystemStatusListener};
use crate::health::result::{aggregate_status, CheckerResult, CheckerState};
use crate::health::scheduler::{CheckRunner, PeriodicScheduler, RunCompleted};
use crate::health::state::CheckState;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// 默认全局超时时间
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// 默认结果缓存时长
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(1);
/// 默认错误信息最大长度
pub const DEFAULT_MAX_ERROR_MESSAGE_LENGTH: usize = 500;
/// 默认最大并发检测数
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 16;

/// 缓存的查询结果
struct CachedResult {
    result: CheckerResult,
    expires_at: Instant,
}

/// 检查器内部共享状态
struct CheckerInner {
    /// 按名称排序的检查执行器
    runners: BTreeMap<String, Arc<CheckRunner>>,
    /// 并发控制信号量
    semaphore: Arc<Semaphore>,
    /// 系统状态
    system: Mutex<CheckerState>,
    /// 查询结果缓存，只在读取和写入时短暂加锁
    cache: Mutex<Option<CachedResult>>,
    /// 重新计算互斥，并发查询共享同一次计算
    refresh: tokio::sync::Mutex<()>,
    cache_duration: Duration,
    details_enabled: bool,
    status_listener: Option<SystemStatusListener>,
    scheduler: PeriodicScheduler,
}

impl CheckerInner {
    /// 查询链的最内层：执行按需检查、聚合、缓存
    ///
    /// 按需检查不占用周期任务的并发许可，一次查询的耗时不超过其中最长的检查超时。
    /// 执行检查和通知监听器期间不持有缓存锁。
    async fn compute(&self, ctx: CheckContext) -> CheckerResult {
        if let Some(result) = self.cached() {
            return result;
        }

        let _refresh = self.refresh.lock().await;
        // 等待期间其他查询可能已经完成计算
        if let Some(result) = self.cached() {
            return result;
        }

        let on_demand = self
            .runners
            .values()
            .filter(|runner| !runner.schedule().is_periodic())
            .map(|runner| runner.execute(None, &ctx));
        join_all(on_demand).await;

        let system = self.update_system_state(&ctx);
        let result = self.to_result(system);

        if !self.cache_duration.is_zero() {
            *self.cache.lock() = Some(CachedResult {
                result: result.clone(),
                expires_at: Instant::now() + self.cache_duration,
            });
        }

        result
    }

    /// 未过期的缓存结果
    fn cached(&self) -> Option<CheckerResult> {
        let cache = self.cache.lock();
        let cached = cache.as_ref()?;
        if Instant::now() < cached.expires_at {
            debug!("返回缓存的健康检查结果");
            Some(cached.result.clone())
        } else {
            None
        }
    }

    fn to_result(&self, system: CheckerState) -> CheckerResult {
        CheckerResult {
            status: system.status,
            details: self.details_enabled.then_some(system.check_states),
        }
    }

    /// 不执行检查，直接由当前各检查状态组装结果
    fn snapshot_result(&self) -> CheckerResult {
        let check_states: BTreeMap<String, CheckState> = self
            .runners
            .iter()
            .map(|(name, runner)| (name.clone(), runner.state()))
            .collect();
        let status = aggregate_status(check_states.values().map(|state| &state.status));
        CheckerResult {
            status,
            details: self.details_enabled.then_some(check_states),
        }
    }

    /// 根据当前各检查状态重新计算系统状态，状态变化时通知系统监听器
    fn update_system_state(&self, ctx: &CheckContext) -> CheckerState {
        let (snapshot, previous) = {
            let mut system = self.system.lock();
            let check_states: BTreeMap<String, CheckState> = self
                .runners
                .iter()
                .map(|(name, runner)| (name.clone(), runner.state()))
                .collect();
            let status = aggregate_status(check_states.values().map(|state| &state.status));
            let previous = system.status;

            system.check_states = check_states;
            if status != previous {
                system.status = status;
                system.last_transition_at = Some(Utc::now());
            }
            (system.clone(), previous)
        };

        if snapshot.status != previous {
            info!("系统状态变化: {} -> {}", previous, snapshot.status);
            if let Some(listener) = &self.status_listener {
                notify_system(listener, ctx, &snapshot);
            }
        }

        snapshot
    }
}

/// 健康检查器
///
/// 可以廉价克隆，所有克隆共享同一组检查和状态。
#[derive(Clone)]
pub struct Checker {
    inner: Arc<CheckerInner>,
    query: MiddlewareFunc,
}

impl Checker {
    /// 创建构建器
    pub fn builder() -> CheckerBuilder {
        CheckerBuilder::new()
    }

    /// 执行一次健康查询
    ///
    /// 缓存未过期时直接返回缓存结果；否则执行所有按需检查并重新聚合。
    /// 周期检查不会在查询中执行，只读取其最近一次结果。
    pub async fn check(&self) -> CheckerResult {
        self.check_with_context(CheckContext::new()).await
    }

    /// 使用指定上下文执行健康查询
    ///
    /// 中间件 panic 时记录日志，并返回由当前各检查状态组装的结果。
    pub async fn check_with_context(&self, ctx: CheckContext) -> CheckerResult {
        match AssertUnwindSafe((self.query)(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                error!("中间件链崩溃: {}", panic_message(panic.as_ref()));
                self.inner.snapshot_result()
            }
        }
    }

    /// 获取单个检查的当前状态
    pub fn check_state(&self, name: &str) -> Option<CheckState> {
        self.inner.runners.get(name).map(|runner| runner.state())
    }

    /// 获取系统状态快照（不触发检查）
    pub fn state(&self) -> CheckerState {
        self.inner.system.lock().clone()
    }

    /// 已注册的检查名称（按名称排序）
    pub fn check_names(&self) -> Vec<String> {
        self.inner.runners.keys().cloned().collect()
    }

    /// 启动周期检查，重复调用无副作用
    ///
    /// # 返回
    /// * `Result<(), RegistrationError>` - 当前线程没有 tokio 运行时时失败
    pub fn start(&self) -> Result<(), RegistrationError> {
        let weak: Weak<CheckerInner> = Arc::downgrade(&self.inner);
        let on_complete: RunCompleted = Arc::new(move |ctx: &CheckContext| {
            if let Some(inner) = weak.upgrade() {
                inner.update_system_state(ctx);
            }
        });

        self.inner
            .scheduler
            .start(self.inner.runners.values(), &self.inner.semaphore, on_complete)
    }

    /// 停止周期检查并等待正在执行的检查完成
    ///
    /// 停止后可以再次调用 `start`。
    pub async fn stop(&self) {
        self.inner.scheduler.stop().await;
    }

    /// 周期检查是否已启动
    pub fn is_started(&self) -> bool {
        self.inner.scheduler.is_running()
    }
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("checks", &self.inner.runners.keys().collect::<Vec<_>>())
            .field("cache_duration", &self.inner.cache_duration)
            .field("details_enabled", &self.inner.details_enabled)
            .field("started", &self.is_started())
            .finish()
    }
}

/// 检查器构建器
pub struct CheckerBuilder {
    timeout: Duration,
    cache_duration: Duration,
    max_error_message_length: Option<usize>,
    details_enabled: bool,
    autostart: bool,
    status_listener: Option<SystemStatusListener>,
    middlewares: Vec<Middleware>,
    max_concurrent_checks: usize,
    checks: Vec<Check>,
}

impl Default for CheckerBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cache_duration: DEFAULT_CACHE_DURATION,
            max_error_message_length: Some(DEFAULT_MAX_ERROR_MESSAGE_LENGTH),
            details_enabled: true,
            autostart: true,
            status_listener: None,
            middlewares: Vec::new(),
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            checks: Vec::new(),
        }
    }
}

impl CheckerBuilder {
    /// 创建默认配置的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置全局超时时间，作用于未设置专属超时的检查
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 设置结果缓存时长
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    /// 禁用结果缓存，每次查询都执行按需检查
    pub fn with_disabled_cache(self) -> Self {
        self.with_cache_duration(Duration::ZERO)
    }

    /// 设置错误信息最大长度（按字符计）
    pub fn with_max_error_message_length(mut self, length: usize) -> Self {
        self.max_error_message_length = Some(length);
        self
    }

    /// 结果中不包含各检查的详细状态
    pub fn with_disabled_details(mut self) -> Self {
        self.details_enabled = false;
        self
    }

    /// 构建后不自动启动周期检查
    pub fn with_disabled_autostart(mut self) -> Self {
        self.autostart = false;
        self
    }

    /// 设置系统状态监听器
    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CheckContext, &CheckerState) + Send + Sync + 'static,
    {
        let listener: SystemStatusListener = Arc::new(listener);
        self.status_listener = Some(listener);
        self
    }

    /// 追加一个中间件（先添加的位于外层）
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// 设置周期检查的最大并发数，查询触发的按需检查不受限制
    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max;
        self
    }

    /// 注册一个检查（保持其自身的调度方式）
    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// 注册一个周期检查
    pub fn with_periodic_check(self, initial_delay: Duration, interval: Duration, check: Check) -> Self {
        self.with_check(check.with_schedule(Schedule::Periodic {
            initial_delay,
            interval,
        }))
    }

    /// 校验配置并构建检查器
    ///
    /// 未禁用自动启动时，会立即启动周期检查，此时需要在 tokio 运行时中调用。
    pub fn build(self) -> Result<Checker, RegistrationError> {
        if self.timeout.is_zero() {
            return Err(RegistrationError::InvalidGlobalTimeout);
        }
        if self.max_concurrent_checks == 0 {
            return Err(RegistrationError::InvalidConcurrency);
        }

        let mut runners = BTreeMap::new();
        for check in self.checks {
            check.validate()?;
            if runners.contains_key(check.name()) {
                return Err(RegistrationError::DuplicateCheck {
                    name: check.name().to_string(),
                });
            }
            let name = check.name().to_string();
            let runner = CheckRunner::new(check, self.timeout, self.max_error_message_length);
            runners.insert(name, Arc::new(runner));
        }

        let inner = Arc::new(CheckerInner {
            runners,
            semaphore: Arc::new(Semaphore::new(self.max_concurrent_checks)),
            system: Mutex::new(CheckerState::default()),
            cache: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
            cache_duration: self.cache_duration,
            details_enabled: self.details_enabled,
            status_listener: self.status_listener,
            scheduler: PeriodicScheduler::default(),
        });

        let base_inner = Arc::clone(&inner);
        let base = middleware_fn(move |ctx: CheckContext| {
            let inner = Arc::clone(&base_inner);
            async move { inner.compute(ctx).await }
        });
        let query = chain_middlewares(&self.middlewares, base);

        let checker = Checker { inner, query };
        info!("健康检查器构建完成，检查数量: {}", checker.inner.runners.len());

        if self.autostart {
            checker.start()?;
        }

        Ok(checker)
    }
}
