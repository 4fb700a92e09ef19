//! 检查上下文
//!
//! 每次探针调用、拦截器、中间件和监听器都会收到一个 `CheckContext`

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 检查执行上下文，携带取消令牌和可选的截止时间
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    /// 取消令牌，探针超时后会被取消
    token: CancellationToken,
    /// 截止时间（没有超时限制时为空）
    deadline: Option<Instant>,
}

impl CheckContext {
    /// 创建新的根上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生子上下文：父上下文取消时子上下文一并取消
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// 设置截止时间（取较早者）
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// 截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 是否已被取消
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待取消
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// 取消该上下文及其所有子上下文
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 底层取消令牌，便于探针把取消传递给自己派生的任务
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CheckContext::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_cancelling_child_leaves_parent() {
        let parent = CheckContext::new();
        let child = parent.child();
        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let ctx = CheckContext::new()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));

        let ctx = ctx.with_deadline(now + Duration::from_secs(1));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }
}
