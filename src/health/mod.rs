//! 健康检测模块
//!
//! 提供检查定义、状态机、聚合查询、拦截器与中间件、周期调度功能

pub mod check;
pub mod checker;
pub mod context;
pub mod interceptor;
pub mod listener;
pub mod probe;
pub mod result;
pub mod scheduler;
pub mod state;

// 重新导出主要类型
pub use check::{Check, Schedule};
pub use checker::{Checker, CheckerBuilder};
pub use context::CheckContext;
pub use interceptor::{
    chain_interceptors, chain_middlewares, interceptor_fn, logging_interceptor, logging_middleware,
    middleware_fn, Interceptor, InterceptorFunc, Middleware, MiddlewareFunc,
};
pub use listener::{ComponentStatusListener, SystemStatusListener};
pub use probe::{probe_fn, HttpProbe, Probe};
pub use result::{aggregate_status, CheckerResult, CheckerState};
pub use state::{AvailabilityStatus, CheckState, FailurePolicy};
