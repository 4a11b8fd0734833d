//! 会话监管：每次连接尝试的取消令牌与代号
//!
//! 每次 start / 重连都会 begin() 一个新代号并派生新的子 token；旧代号的输出一律丢弃。
//! cancel() 只取消当前尝试，监管者本身可以继续使用。

use tokio_util::sync::CancellationToken;

/// 会话代号：区分被替代的旧尝试
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generation(u64);

/// 会话级生命周期管理：根 token、当前尝试的子 token 与代号
#[derive(Debug)]
pub struct SessionSupervisor {
    /// 控制器关闭时触发
    root: CancellationToken,
    current: CancellationToken,
    generation: u64,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        let root = CancellationToken::new();
        let current = root.child_token();
        Self {
            root,
            current,
            generation: 0,
        }
    }

    /// 开始一次新的连接尝试：取消上一次，返回新代号与其 token
    pub fn begin(&mut self) -> (Generation, CancellationToken) {
        self.current.cancel();
        self.generation += 1;
        self.current = self.root.child_token();
        (Generation(self.generation), self.current.clone())
    }

    /// 触发取消（用户 cancel）；之后到达的旧代号输出都会被视为过期
    pub fn cancel(&mut self) {
        self.current.cancel();
        self.generation += 1;
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.generation && !self.current.is_cancelled()
    }

    /// 关闭整个控制器
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_supersedes_previous() {
        let mut supervisor = SessionSupervisor::new();
        let (first, first_token) = supervisor.begin();
        let (second, second_token) = supervisor.begin();
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!supervisor.is_current(first));
        assert!(supervisor.is_current(second));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut supervisor = SessionSupervisor::new();
        let (generation, token) = supervisor.begin();
        supervisor.cancel();
        supervisor.cancel();
        assert!(token.is_cancelled());
        assert!(!supervisor.is_current(generation));
    }

    #[test]
    fn test_shutdown_cancels_current() {
        let mut supervisor = SessionSupervisor::new();
        let (_, token) = supervisor.begin();
        supervisor.shutdown();
        assert!(token.is_cancelled());
    }
}
