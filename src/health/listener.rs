//! 状态监听器
//!
//! 组件级监听器在单个检查状态变化时触发，系统级监听器在聚合状态变化时触发。
//! 监听器的 panic 会被捕获并记录，不会影响健康查询的调用方。

use crate::error::{panic_message, ListenerFault};
use crate::health::context::CheckContext;
use crate::health::result::CheckerState;
use crate::health::state::CheckState;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// 组件状态监听器：(上下文, 检查名称, 新状态)
pub type ComponentStatusListener = Arc<dyn Fn(&CheckContext, &str, &CheckState) + Send + Sync>;

/// 系统状态监听器：(上下文, 新系统状态)
pub type SystemStatusListener = Arc<dyn Fn(&CheckContext, &CheckerState) + Send + Sync>;

/// 调用组件监听器
pub(crate) fn notify_component(
    listener: &ComponentStatusListener,
    ctx: &CheckContext,
    name: &str,
    state: &CheckState,
) -> Option<ListenerFault> {
    isolate(name, || listener(ctx, name, state))
}

/// 调用系统监听器
pub(crate) fn notify_system(
    listener: &SystemStatusListener,
    ctx: &CheckContext,
    state: &CheckerState,
) -> Option<ListenerFault> {
    isolate("system", || listener(ctx, state))
}

fn isolate(label: &str, call: impl FnOnce()) -> Option<ListenerFault> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => None,
        Err(payload) => {
            let fault = ListenerFault {
                listener: label.to_string(),
                message: panic_message(payload.as_ref()),
            };
            error!("{}", fault);
            Some(fault)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::AvailabilityStatus;
    use parking_lot::Mutex;

    #[test]
    fn test_component_listener_receives_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: ComponentStatusListener = Arc::new(move |_ctx: &CheckContext, name: &str, state: &CheckState| {
            sink.lock().push((name.to_string(), state.status));
        });

        let state = CheckState {
            status: AvailabilityStatus::Down,
            ..Default::default()
        };
        let fault = notify_component(&listener, &CheckContext::new(), "database", &state);

        assert!(fault.is_none());
        assert_eq!(
            *seen.lock(),
            vec![("database".to_string(), AvailabilityStatus::Down)]
        );
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let listener: ComponentStatusListener = Arc::new(|_ctx: &CheckContext, _name: &str, _state: &CheckState| {
            panic!("listener exploded");
        });

        let fault = notify_component(
            &listener,
            &CheckContext::new(),
            "cache",
            &CheckState::default(),
        )
        .expect("panic should be reported as a fault");

        assert_eq!(fault.listener, "cache");
        assert_eq!(fault.message, "listener exploded");
    }

    #[test]
    fn test_panicking_system_listener_is_isolated() {
        let listener: SystemStatusListener = Arc::new(|_ctx: &CheckContext, state: &CheckerState| {
            panic!("system is {}", state.status);
        });

        let fault = notify_system(&listener, &CheckContext::new(), &CheckerState::default())
            .expect("panic should be reported as a fault");

        assert_eq!(fault.listener, "system");
        assert_eq!(fault.message, "system is 未知");
    }
}
