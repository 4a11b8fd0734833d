//! 错误恢复引擎
//!
//! 根据 StreamError 与本次调用已尝试的连接次数返回 RecoveryAction：瞬时故障按指数退避重连，
//! 达到上限或遇到不可重试的错误时终止。

use std::time::Duration;

use crate::config::RetrySection;
use crate::core::{RecoveryAction, StreamError};

/// 默认最多连接 3 次（首次 + 2 次重连）
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// 有上限的指数退避：第 n 次重连前等待 base_delay × 2^(n-1)
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_attempts: u32,
    base_delay: Duration,
}

impl RecoveryEngine {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(cfg: &RetrySection) -> Self {
        Self::new(cfg.max_attempts, Duration::from_millis(cfg.base_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 第 retry 次重连（从 1 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// attempts：本次调用已经发起（并失败）的连接次数
    pub fn handle(&self, err: &StreamError, attempts: u32) -> RecoveryAction {
        if !err.is_transient() {
            return RecoveryAction::Fail(err.to_string());
        }
        if attempts < self.max_attempts {
            RecoveryAction::Retry {
                delay: self.delay_for(attempts),
            }
        } else {
            RecoveryAction::Fail(format!(
                "Connection failed after {attempts} attempts: {err}"
            ))
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let engine = RecoveryEngine::new(5, Duration::from_millis(100));
        assert_eq!(engine.delay_for(1), Duration::from_millis(100));
        assert_eq!(engine.delay_for(2), Duration::from_millis(200));
        assert_eq!(engine.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let engine = RecoveryEngine::new(0, Duration::from_millis(10));
        assert_eq!(engine.max_attempts(), 1);
        let err = StreamError::Connect("refused".to_string());
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::Fail(_)));
    }

    #[test]
    fn test_recovery_retries_below_ceiling() {
        let engine = RecoveryEngine::default();
        let err = StreamError::Connect("refused".to_string());
        assert_eq!(
            engine.handle(&err, 1),
            RecoveryAction::Retry {
                delay: DEFAULT_BASE_DELAY
            }
        );
        assert_eq!(
            engine.handle(&err, 2),
            RecoveryAction::Retry {
                delay: DEFAULT_BASE_DELAY * 2
            }
        );
    }

    #[test]
    fn test_recovery_ceiling_reached() {
        let engine = RecoveryEngine::default();
        let err = StreamError::PrematureEnd;
        match engine.handle(&err, 3) {
            RecoveryAction::Fail(msg) => {
                assert!(msg.contains("after 3 attempts"));
            }
            other => panic!("Expected Fail, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_fatal_status() {
        let engine = RecoveryEngine::default();
        let err = StreamError::HttpStatus {
            status: 400,
            body: "bad input".to_string(),
        };
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::Fail(_)));
    }

    #[test]
    fn test_recovery_server_error_is_transient() {
        let engine = RecoveryEngine::default();
        let err = StreamError::HttpStatus {
            status: 503,
            body: String::new(),
        };
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::Retry { .. }));
    }
}
