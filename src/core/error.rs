//! 流会话错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 StreamError 与已尝试次数决定 Retry / Fail。

use std::time::Duration;

use thiserror::Error;

/// 传输层与会话过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    /// 响应体结束但没有收到 complete / error 事件
    #[error("Stream ended before the workflow finished")]
    PrematureEnd,

    #[error("Stream idle for {0:?}")]
    Idle(Duration),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StreamError {
    /// 是否为可重试的瞬时故障（连接、超时、断流、5xx / 429）
    pub fn is_transient(&self) -> bool {
        match self {
            StreamError::Connect(_)
            | StreamError::Timeout(_)
            | StreamError::Interrupted(_)
            | StreamError::PrematureEnd
            | StreamError::Idle(_) => true,
            StreamError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            StreamError::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StreamError::Timeout(e.to_string())
        } else if e.is_connect() {
            StreamError::Connect(e.to_string())
        } else if e.is_builder() {
            StreamError::InvalidRequest(e.to_string())
        } else if let Some(status) = e.status() {
            StreamError::HttpStatus {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            StreamError::Interrupted(e.to_string())
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 等待 delay 后用同一输入重连
    Retry { delay: Duration },
    /// 终止会话，message 写入 error_message
    Fail(String),
}
