//! 拦截器与中间件链
//!
//! 拦截器包装单个检查的探针调用，中间件包装整个系统查询。
//! 两者都是“接收下一步、返回同签名新函数”的装饰器，按配置顺序组合成洋葱结构：
//! 第一个配置的装饰器最先执行前置逻辑、最后执行后置逻辑。

use crate::health::context::CheckContext;
use crate::health::result::CheckerResult;
use crate::health::state::CheckState;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// 拦截器链中的一步：(上下文, 检查名称, 当前状态) -> 新状态
pub type InterceptorFunc =
    Arc<dyn Fn(CheckContext, String, CheckState) -> BoxFuture<'static, CheckState> + Send + Sync>;

/// 拦截器：包装下一步并返回新的一步
pub type Interceptor = Arc<dyn Fn(InterceptorFunc) -> InterceptorFunc + Send + Sync>;

/// 中间件链中的一步：上下文 -> 聚合结果
pub type MiddlewareFunc =
    Arc<dyn Fn(CheckContext) -> BoxFuture<'static, CheckerResult> + Send + Sync>;

/// 中间件：包装下一步并返回新的一步
pub type Middleware = Arc<dyn Fn(MiddlewareFunc) -> MiddlewareFunc + Send + Sync>;

/// 用异步闭包创建拦截器链中的一步
pub fn interceptor_fn<F, Fut>(f: F) -> InterceptorFunc
where
    F: Fn(CheckContext, String, CheckState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckState> + Send + 'static,
{
    Arc::new(
        move |ctx: CheckContext, name: String, state: CheckState| -> BoxFuture<'static, CheckState> {
            Box::pin(f(ctx, name, state))
        },
    )
}

/// 用异步闭包创建中间件链中的一步
pub fn middleware_fn<F, Fut>(f: F) -> MiddlewareFunc
where
    F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckerResult> + Send + 'static,
{
    Arc::new(move |ctx: CheckContext| -> BoxFuture<'static, CheckerResult> { Box::pin(f(ctx)) })
}

/// 按洋葱顺序组合拦截器，`interceptors[0]` 位于最外层
pub fn chain_interceptors(interceptors: &[Interceptor], innermost: InterceptorFunc) -> InterceptorFunc {
    interceptors
        .iter()
        .rev()
        .fold(innermost, |next, interceptor| interceptor(next))
}

/// 按洋葱顺序组合中间件，`middlewares[0]` 位于最外层
pub fn chain_middlewares(middlewares: &[Middleware], innermost: MiddlewareFunc) -> MiddlewareFunc {
    middlewares
        .iter()
        .rev()
        .fold(innermost, |next, middleware| middleware(next))
}

/// 记录每次检查开始和结束的拦截器
pub fn logging_interceptor() -> Interceptor {
    Arc::new(|next: InterceptorFunc| -> InterceptorFunc {
        interceptor_fn(move |ctx, name: String, state| {
            let next = Arc::clone(&next);
            async move {
                info!("开始检查组件: {}", name);
                let result = next(ctx, name.clone(), state).await;
                info!("组件检查完成: {} ({})", name, result.status);
                result
            }
        })
    })
}

/// 记录每次健康查询开始和结束的中间件
pub fn logging_middleware() -> Middleware {
    Arc::new(|next: MiddlewareFunc| -> MiddlewareFunc {
        middleware_fn(move |ctx| {
            let next = Arc::clone(&next);
            async move {
                info!("开始处理健康查询");
                let result = next(ctx).await;
                info!("健康查询处理完成 ({})", result.status);
                result
            }
        })
    })
}
