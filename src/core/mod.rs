//! 核心层：数据模型、错误与恢复、会话监管、流会话控制器

pub mod controller;
pub mod error;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use controller::{WorkflowController, WorkflowHandle};
pub use error::{RecoveryAction, StreamError};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{
    Answer, SessionStatus, Step, StepId, StepPhase, WorkflowModel, WorkflowSnapshot,
};
