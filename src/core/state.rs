//! 状态定义：Step / Answer / 会话状态，以及对外暴露的 WorkflowSnapshot 投影
//!
//! WorkflowModel 只由 Controller 持有并修改；UI 只拿到轻量、不可变的 WorkflowSnapshot。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 步骤 ID：在同一个 Controller 实例内单调递增，重置模型后也不会复用
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StepId(u64);

impl StepId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step-{}", self.0)
    }
}

/// 步骤阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Pending,
    Active,
    Done,
    /// 工作流失败时正在进行的步骤：不再活跃，但也没有完成
    Interrupted,
}

/// 后端流水线中的一个阶段（渲染为一张进度卡片）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub summary: String,
    pub detail_lines: Vec<String>,
    pub phase: StepPhase,
    pub details_visible: bool,
}

impl Step {
    pub fn is_active(&self) -> bool {
        self.phase == StepPhase::Active
    }
}

/// 某个阶段产出的结构化结果，按到达顺序追加，不再修改
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Answer {
    pub source_step: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// 仅用于展示
    pub received_at: DateTime<Utc>,
}

/// 会话状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl SessionStatus {
    /// 完成或失败：同一会话内不再接受事件
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// 连接中或流式接收中：此时拒绝新的 start
    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Streaming)
    }

    /// 不会再自行变化的状态（空闲 / 完成 / 失败）
    pub fn is_settled(self) -> bool {
        !self.is_in_flight()
    }
}

/// Controller 内部的完整模型；Reducer 的输入与输出
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkflowModel {
    pub steps: Vec<Step>,
    pub answers: Vec<Answer>,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    next_step_id: u64,
}

impl WorkflowModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空步骤、答案与错误（新的一次运行）；ID 序列继续递增
    pub fn clear_run(&mut self) {
        self.steps.clear();
        self.answers.clear();
        self.error_message = None;
    }

    /// 用户发起的全新运行：在 clear_run 之外还要清零重试计数
    pub fn reset(&mut self) {
        self.clear_run();
        self.retry_count = 0;
        self.status = SessionStatus::Idle;
    }

    pub(crate) fn allocate_step_id(&mut self) -> StepId {
        let id = StepId(self.next_step_id);
        self.next_step_id += 1;
        id
    }

    pub fn active_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.is_active())
    }

    pub fn active_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.is_active())
    }

    /// 切换指定步骤的详情可见性；ID 不存在时返回 false（不是错误）
    pub fn toggle_step_details(&mut self, id: StepId) -> bool {
        match self.steps.iter_mut().find(|s| s.id == id) {
            Some(step) => {
                step.details_visible = !step.details_visible;
                true
            }
            None => false,
        }
    }

    /// 失败时把正在进行的步骤标记为 Interrupted（不是 Done），保持至多一个 Active
    pub fn interrupt_active_step(&mut self) {
        if let Some(step) = self.active_step_mut() {
            step.phase = StepPhase::Interrupted;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.interrupt_active_step();
        self.status = SessionStatus::Failed;
        self.error_message = Some(message.into());
    }

    /// 投影为 UI 可渲染的快照
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            steps: self.steps.clone(),
            answers: self.answers.clone(),
            status: self.status,
            error_message: self.error_message.clone(),
            retry_count: self.retry_count,
        }
    }
}

/// UI 看到的只读快照
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub steps: Vec<Step>,
    pub answers: Vec<Answer>,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl WorkflowSnapshot {
    pub fn active_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.is_active())
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ids_survive_reset() {
        let mut model = WorkflowModel::new();
        let a = model.allocate_step_id();
        model.reset();
        let b = model.allocate_step_id();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_separate_models_have_independent_sequences() {
        let mut first = WorkflowModel::new();
        let mut second = WorkflowModel::new();
        first.allocate_step_id();
        first.allocate_step_id();
        assert_eq!(second.allocate_step_id().value(), 0);
    }

    #[test]
    fn test_toggle_unknown_step_is_noop() {
        let mut model = WorkflowModel::new();
        let id = model.allocate_step_id();
        assert!(!model.toggle_step_details(id));
        assert_eq!(model, {
            let mut m = WorkflowModel::new();
            m.allocate_step_id();
            m
        });
    }

    #[test]
    fn test_status_classification() {
        assert!(SessionStatus::Connecting.is_in_flight());
        assert!(SessionStatus::Streaming.is_in_flight());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_settled());
        assert!(SessionStatus::Idle.is_settled());
        assert!(!SessionStatus::Idle.is_terminal());
    }
}
