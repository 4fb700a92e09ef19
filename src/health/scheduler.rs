//! 检查执行与周期调度模块
//!
//! `CheckRunner` 负责单个检查的一次完整执行（并发许可、超时、崩溃捕获、
//! 拦截器链、状态迁移、监听器），`PeriodicScheduler` 负责周期检查的后台任务。

use crate::error::{ProbeError, RegistrationError};
use crate::health::check::{Check, Schedule};
use crate::health::context::CheckContext;
use crate::health::interceptor::{chain_interceptors, interceptor_fn, InterceptorFunc};
use crate::health::listener::notify_component;
use crate::health::probe::Probe;
use crate::health::state::{truncate_message, CheckState};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 周期检查每次执行完成后的回调，用于重新计算系统状态
pub(crate) type RunCompleted = Arc<dyn Fn(&CheckContext) + Send + Sync>;

/// 单个检查的执行器
pub(crate) struct CheckRunner {
    /// 检查定义
    check: Check,
    /// 组合好的拦截器链
    chain: InterceptorFunc,
    /// 当前状态
    state: RwLock<CheckState>,
    /// 同一检查的执行互斥
    run_lock: tokio::sync::Mutex<()>,
    /// 最内层步骤计算出的状态，拦截器无法篡改
    outcome: Arc<Mutex<Option<CheckState>>>,
    /// 错误信息最大长度
    max_error_message_length: Option<usize>,
}

impl CheckRunner {
    /// 创建执行器
    ///
    /// # 参数
    /// * `check` - 检查定义
    /// * `default_timeout` - 检查未设置超时时使用的全局超时
    /// * `max_error_message_length` - 错误信息最大长度，`None` 表示不截断
    pub(crate) fn new(
        check: Check,
        default_timeout: Duration,
        max_error_message_length: Option<usize>,
    ) -> Self {
        let outcome = Arc::new(Mutex::new(None));
        let innermost = probe_step(
            Arc::clone(&check.probe),
            check.timeout.unwrap_or(default_timeout),
            check.policy,
            max_error_message_length,
            Arc::clone(&outcome),
        );
        let chain = chain_interceptors(&check.interceptors, innermost);

        Self {
            check,
            chain,
            state: RwLock::new(CheckState::default()),
            run_lock: tokio::sync::Mutex::new(()),
            outcome,
            max_error_message_length,
        }
    }

    /// 检查名称
    pub(crate) fn name(&self) -> &str {
        self.check.name()
    }

    /// 调度方式
    pub(crate) fn schedule(&self) -> Schedule {
        self.check.schedule()
    }

    /// 当前状态快照
    pub(crate) fn state(&self) -> CheckState {
        self.state.read().clone()
    }

    /// 执行一次检查并发布新状态
    ///
    /// 同一检查的多次执行互斥。传入 `semaphore` 时先获取并发许可，
    /// 查询触发的按需执行不传入，不与周期任务争用许可。
    pub(crate) async fn execute(&self, semaphore: Option<&Semaphore>, ctx: &CheckContext) -> CheckState {
        let _run = self.run_lock.lock().await;

        // 获取信号量许可
        let _permit = match semaphore {
            Some(semaphore) => match semaphore.acquire().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!("获取并发许可失败，不受限执行: {}", self.name());
                    None
                }
            },
            None => None,
        };

        debug!("开始检测组件: {}", self.name());

        let previous = self.state();
        self.outcome.lock().take();

        // 探针超时只取消这个子上下文，监听器收到的仍是调用方的上下文
        let probe_ctx = ctx.child();
        let chained = AssertUnwindSafe((self.chain)(probe_ctx, self.name().to_string(), previous.clone()))
            .catch_unwind()
            .await;

        let recorded = self.outcome.lock().take();
        let next = match (chained, recorded) {
            (Ok(returned), Some(next)) => {
                if returned != next {
                    debug!("拦截器返回的状态已忽略: {}", self.name());
                }
                next
            }
            (Ok(_), None) => {
                warn!("拦截器未调用下一步，保留原状态: {}", self.name());
                previous.clone()
            }
            (Err(panic), recorded) => {
                let crash = ProbeError::from_panic(panic);
                error!("拦截器链崩溃: {}, {}", self.name(), crash);
                // 探针已执行时以其结果为准
                recorded.unwrap_or_else(|| {
                    let message = truncate_message(crash.to_string(), self.max_error_message_length);
                    previous.transition(Err(message), &self.check.policy, Instant::now(), Utc::now())
                })
            }
        };

        if next.status != previous.status {
            info!(
                "组件状态变化: {} {} -> {}",
                self.name(),
                previous.status,
                next.status
            );
            if let Some(listener) = &self.check.status_listener {
                notify_component(listener, ctx, self.name(), &next);
            }
        }

        *self.state.write() = next.clone();
        next
    }
}

impl std::fmt::Debug for CheckRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRunner")
            .field("check", &self.check)
            .field("state", &*self.state.read())
            .finish()
    }
}

/// 构造拦截器链最内层：调用探针并迁移状态
fn probe_step(
    probe: Arc<dyn Probe>,
    timeout: Duration,
    policy: crate::health::state::FailurePolicy,
    max_error_message_length: Option<usize>,
    outcome: Arc<Mutex<Option<CheckState>>>,
) -> InterceptorFunc {
    interceptor_fn(move |ctx: CheckContext, name: String, state: CheckState| {
        let probe = Arc::clone(&probe);
        let outcome = Arc::clone(&outcome);
        async move {
            let ctx = ctx.with_deadline(Instant::now() + timeout);
            let result = run_probe(probe.as_ref(), &ctx, timeout).await.map_err(|e| {
                let message = truncate_message(e.to_string(), max_error_message_length);
                warn!("组件检测失败: {}, {}", name, message);
                message
            });

            let next = state.transition(result, &policy, Instant::now(), Utc::now());
            *outcome.lock() = Some(next.clone());
            next
        }
    })
}

/// 在超时限制内调用探针，错误和 panic 都转换为 `ProbeError`
async fn run_probe(probe: &dyn Probe, ctx: &CheckContext, timeout: Duration) -> Result<(), ProbeError> {
    let call = AssertUnwindSafe(probe.check(ctx)).catch_unwind();

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(ProbeError::Failure(format!("{e:#}"))),
        Ok(Err(panic)) => Err(ProbeError::from_panic(panic)),
        Err(_) => {
            ctx.cancel();
            Err(ProbeError::Timeout(timeout))
        }
    }
}

/// 运行中的周期任务
struct RunningTasks {
    token: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

/// 周期检查调度器
#[derive(Default)]
pub(crate) struct PeriodicScheduler {
    running: Mutex<Option<RunningTasks>>,
}

impl PeriodicScheduler {
    /// 是否已启动
    pub(crate) fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// 为每个周期检查启动一个后台任务，重复调用无副作用
    pub(crate) fn start<'a>(
        &self,
        runners: impl IntoIterator<Item = &'a Arc<CheckRunner>>,
        semaphore: &Arc<Semaphore>,
        on_complete: RunCompleted,
    ) -> Result<(), RegistrationError> {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("周期调度器已在运行");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RegistrationError::NoRuntime)?;
        let token = CancellationToken::new();
        let mut handles = Vec::new();

        for runner in runners {
            if let Schedule::Periodic {
                initial_delay,
                interval,
            } = runner.schedule()
            {
                let task = runtime.spawn(run_periodic(
                    Arc::clone(runner),
                    Arc::clone(semaphore),
                    Arc::clone(&on_complete),
                    initial_delay,
                    interval,
                    token.clone(),
                ));
                handles.push((runner.name().to_string(), task));
            }
        }

        info!("周期调度器启动完成，周期检查数量: {}", handles.len());
        *running = Some(RunningTasks { token, handles });
        Ok(())
    }

    /// 停止所有周期任务并等待正在执行的检查结束
    pub(crate) async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        running.token.cancel();
        for (name, handle) in running.handles {
            if let Err(e) = handle.await {
                error!("周期检查任务异常退出 {}: {}", name, e);
            } else {
                debug!("停止任务: {}", name);
            }
        }

        info!("周期调度器已停止");
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        // 只能发出停止信号，无法等待任务结束
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

/// 周期检查任务主循环
///
/// 取消只在两次执行之间生效，正在执行的检查会运行完毕并发布结果。
async fn run_periodic(
    runner: Arc<CheckRunner>,
    semaphore: Arc<Semaphore>,
    on_complete: RunCompleted,
    initial_delay: Duration,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + initial_delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("启动周期检查任务: {}", runner.name());

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let ctx = CheckContext::new();
        runner.execute(Some(&semaphore), &ctx).await;
        on_complete(&ctx);
    }

    info!("周期检查任务已停止: {}", runner.name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::interceptor::Interceptor;
    use crate::health::state::AvailabilityStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runner(check: Check) -> CheckRunner {
        CheckRunner::new(check, Duration::from_secs(10), Some(500))
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&fail);
        let runner = runner(Check::from_fn("db", move |_ctx| {
            let fail = flag.load(Ordering::SeqCst);
            async move {
                if fail {
                    anyhow::bail!("connection refused")
                }
                Ok(())
            }
        }));
        let semaphore = Semaphore::new(1);

        let state = runner.execute(Some(&semaphore), &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Up);

        fail.store(true, Ordering::SeqCst);
        let state = runner.execute(Some(&semaphore), &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Down);
        assert_eq!(state.error.as_deref(), Some("connection refused"));
        assert_eq!(runner.state(), state);
    }

    #[tokio::test]
    async fn test_panicking_probe_becomes_failure() {
        let runner = runner(Check::from_fn("boom", |_ctx| async {
            if true {
                panic!("probe exploded");
            }
            Ok(())
        }));

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Down);
        assert_eq!(state.error.as_deref(), Some("检查崩溃: probe exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failure() {
        let runner = runner(
            Check::from_fn("slow", |_ctx| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .with_timeout(Duration::from_millis(200)),
        );

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Down);
        assert_eq!(state.error.as_deref(), Some("检查超时 (200ms)"));
    }

    #[tokio::test]
    async fn test_error_message_truncated() {
        let runner = CheckRunner::new(
            Check::from_fn("verbose", |_ctx| async { anyhow::bail!("abcdefghij") }),
            Duration::from_secs(10),
            Some(4),
        );

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.error.as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_interceptor_cannot_forge_state() {
        let forging: Interceptor = Arc::new(|next: InterceptorFunc| -> InterceptorFunc {
            interceptor_fn(move |ctx, name, state| {
                let next = Arc::clone(&next);
                async move {
                    let mut state = next(ctx, name, state).await;
                    state.status = AvailabilityStatus::Up;
                    state
                }
            })
        });
        let runner = runner(
            Check::from_fn("db", |_ctx| async { anyhow::bail!("down") }).with_interceptor(forging),
        );

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Down);
    }

    #[tokio::test]
    async fn test_short_circuit_interceptor_keeps_previous_state() {
        let probe_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&probe_calls);
        let skipping: Interceptor = Arc::new(|_next: InterceptorFunc| -> InterceptorFunc {
            interceptor_fn(|_ctx, _name, mut state: CheckState| async move {
                state.status = AvailabilityStatus::Down;
                state
            })
        });
        let runner = runner(
            Check::from_fn("db", move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .with_interceptor(skipping),
        );

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Unknown);
        assert_eq!(probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_component_listener_fires_once_per_transition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let runner = runner(
            Check::from_fn("db", |_ctx| async { anyhow::bail!("down") })
                .with_max_contiguous_fails(2)
                .with_status_listener(move |_ctx, _name, state| {
                    assert_eq!(state.status, AvailabilityStatus::Down);
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let semaphore = Semaphore::new(1);

        for _ in 0..5 {
            runner.execute(Some(&semaphore), &CheckContext::new()).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.state().contiguous_fails, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_scheduler_runs_and_stops() {
        let probe_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&probe_calls);
        let runner = Arc::new(runner(
            Check::from_fn("tick", move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .with_schedule(Schedule::Periodic {
                initial_delay: Duration::from_secs(1),
                interval: Duration::from_secs(5),
            }),
        ));
        let completions = Arc::new(AtomicUsize::new(0));
        let completed = Arc::clone(&completions);
        let on_complete: RunCompleted = Arc::new(move |_ctx: &CheckContext| {
            completed.fetch_add(1, Ordering::SeqCst);
        });

        let scheduler = PeriodicScheduler::default();
        scheduler
            .start([&runner], &Arc::new(Semaphore::new(4)), on_complete)
            .unwrap();
        assert!(scheduler.is_running());

        // t=1, 6, 11
        tokio::time::sleep(Duration::from_millis(11_500)).await;
        assert_eq!(probe_calls.load(Ordering::SeqCst), 3);
        assert_eq!(completions.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe_calls.load(Ordering::SeqCst), 3);
    }

    fn explode(_state: CheckState) -> CheckState {
        panic!("interceptor exploded")
    }

    fn panicking_interceptor(after_next: bool) -> Interceptor {
        Arc::new(move |next: InterceptorFunc| -> InterceptorFunc {
            interceptor_fn(move |ctx, name, state| {
                let next = Arc::clone(&next);
                async move {
                    let state = if after_next {
                        next(ctx, name, state).await
                    } else {
                        state
                    };
                    explode(state)
                }
            })
        })
    }

    #[tokio::test]
    async fn test_panicking_interceptor_before_next_becomes_failure() {
        let runner = runner(
            Check::from_fn("db", |_ctx| async { Ok(()) }).with_interceptor(panicking_interceptor(false)),
        );

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Down);
        assert_eq!(state.error.as_deref(), Some("检查崩溃: interceptor exploded"));
        assert_eq!(runner.state(), state);
    }

    #[tokio::test]
    async fn test_panicking_interceptor_after_next_keeps_probe_outcome() {
        let runner = runner(
            Check::from_fn("db", |_ctx| async { Ok(()) }).with_interceptor(panicking_interceptor(true)),
        );

        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Up);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_survives_panicking_interceptor() {
        let run_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&run_calls);
        let runner = Arc::new(runner(
            Check::from_fn("tick", move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .with_interceptor(panicking_interceptor(true))
            .with_schedule(Schedule::Periodic {
                initial_delay: Duration::ZERO,
                interval: Duration::from_secs(1),
            }),
        ));
        let on_complete: RunCompleted = Arc::new(|_ctx: &CheckContext| {});

        let scheduler = PeriodicScheduler::default();
        scheduler
            .start([&runner], &Arc::new(Semaphore::new(1)), on_complete)
            .unwrap();

        // t=0..10
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(run_calls.load(Ordering::SeqCst), 11);
        assert_eq!(runner.state().status, AvailabilityStatus::Up);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_context_not_cancelled_by_timeout() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let runner = runner(
            Check::from_fn("slow", |_ctx| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .with_timeout(Duration::from_millis(100))
            .with_status_listener(move |ctx, _name, _state| {
                sink.lock().push(ctx.is_cancelled());
            }),
        );

        let ctx = CheckContext::new();
        let state = runner.execute(None, &ctx).await;
        assert_eq!(state.error.as_deref(), Some("检查超时 (100ms)"));
        assert_eq!(*seen.lock(), vec![false]);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_semaphore_limits_only_when_given() {
        let runner = runner(Check::from_fn("db", |_ctx| async { Ok(()) }));
        let semaphore = Semaphore::new(1);
        let _held = semaphore.acquire().await.unwrap();

        // 许可被占用时按需执行不受影响
        let state = runner.execute(None, &CheckContext::new()).await;
        assert_eq!(state.status, AvailabilityStatus::Up);

        let limited = tokio::time::timeout(
            Duration::from_millis(50),
            runner.execute(Some(&semaphore), &CheckContext::new()),
        )
        .await;
        assert!(limited.is_err());
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let scheduler = PeriodicScheduler::default();
        let on_complete: RunCompleted = Arc::new(|_ctx: &CheckContext| {});
        let result = scheduler.start(
            std::iter::empty::<&Arc<CheckRunner>>(),
            &Arc::new(Semaphore::new(1)),
            on_complete,
        );
        assert_eq!(result, Err(RegistrationError::NoRuntime));
    }
}
