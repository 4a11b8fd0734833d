//! Beeline - 工作流事件流消费端
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 数据模型、错误与重连策略、会话监管、流会话控制器与模型访问器
//! - **observability**: 日志初始化
//! - **transport**: 事件流传输抽象（HTTP / Scripted）
//! - **ui**: 终端进度输出
//! - **workflow**: 线上事件、SSE 增量解码、Step / Answer 归约

pub mod config;
pub mod core;
pub mod observability;
pub mod transport;
pub mod ui;
pub mod workflow;

pub use crate::core::{WorkflowController, WorkflowHandle, WorkflowSnapshot};
