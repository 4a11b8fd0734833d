//! Step / Answer 归约器
//!
//! 纯函数：reduce(model, event, received_at) -> model'。不做 I/O、不读时钟（到达时间由调用方传入），
//! 相同输入总是得到相同输出。维护「至多一个 Active 步骤」不变量。

use chrono::{DateTime, Utc};

use crate::core::{Answer, SessionStatus, Step, StepPhase, WorkflowModel};
use crate::workflow::WorkflowEvent;

/// 后端 error 事件写入 error_message 时的前缀
pub const WORKFLOW_ERROR_PREFIX: &str = "Workflow error: ";

/// 将一个事件折叠进模型，返回新模型
pub fn reduce(
    model: &WorkflowModel,
    event: &WorkflowEvent,
    received_at: DateTime<Utc>,
) -> WorkflowModel {
    let mut next = model.clone();
    apply(&mut next, event, received_at);
    next
}

/// reduce 的原地版本，Controller 在热路径上使用
pub fn apply(model: &mut WorkflowModel, event: &WorkflowEvent, received_at: DateTime<Utc>) {
    if model.status.is_terminal() {
        tracing::warn!(
            kind = event.kind(),
            status = ?model.status,
            "Ignoring event after workflow reached a terminal state"
        );
        return;
    }

    match event {
        WorkflowEvent::StepStarted { node, content } => {
            for step in model.steps.iter_mut().filter(|s| s.is_active()) {
                step.phase = StepPhase::Done;
                step.details_visible = false;
            }
            let id = model.allocate_step_id();
            model.steps.push(Step {
                id,
                name: node.clone(),
                summary: content.clone(),
                detail_lines: Vec::new(),
                phase: StepPhase::Active,
                details_visible: true,
            });
        }
        WorkflowEvent::StepContentUpdated { node, content } => match model.active_step_mut() {
            Some(step) => step.summary = content.clone(),
            None => tracing::warn!(node = %node, "Content update with no active step"),
        },
        WorkflowEvent::StepDetailAppended { node, lines } => match model.active_step_mut() {
            Some(step) => step.detail_lines.extend(lines.iter().cloned()),
            None => tracing::warn!(node = %node, "Detail append with no active step"),
        },
        WorkflowEvent::AnswerProduced { node, payload } => {
            model.answers.push(Answer {
                source_step: node.clone(),
                payload: payload.clone(),
                received_at,
            });
        }
        WorkflowEvent::WorkflowCompleted { .. } => {
            for step in model.steps.iter_mut() {
                step.phase = StepPhase::Done;
                step.details_visible = false;
            }
            model.status = SessionStatus::Completed;
            model.error_message = None;
        }
        WorkflowEvent::WorkflowFailed { message } => {
            model.fail(format!("{WORKFLOW_ERROR_PREFIX}{message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(node: &str, content: &str) -> WorkflowEvent {
        WorkflowEvent::StepStarted {
            node: node.into(),
            content: content.into(),
        }
    }

    fn details(node: &str, lines: &[&str]) -> WorkflowEvent {
        WorkflowEvent::StepDetailAppended {
            node: node.into(),
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn completed() -> WorkflowEvent {
        WorkflowEvent::WorkflowCompleted {
            message: String::new(),
        }
    }

    fn fold(events: &[WorkflowEvent]) -> WorkflowModel {
        let now = Utc::now();
        let mut model = WorkflowModel::new();
        model.status = SessionStatus::Streaming;
        for ev in events {
            model = reduce(&model, ev, now);
            assert!(
                model.steps.iter().filter(|s| s.is_active()).count() <= 1,
                "more than one active step after {ev:?}"
            );
        }
        model
    }

    #[test]
    fn test_single_step_completes() {
        let model = fold(&[
            started("Keyword Research", "Looking up keywords"),
            details("Keyword Research", &["found 10 keywords"]),
            completed(),
        ]);
        assert_eq!(model.status, SessionStatus::Completed);
        assert_eq!(model.steps.len(), 1);
        let step = &model.steps[0];
        assert_eq!(step.name, "Keyword Research");
        assert_eq!(step.phase, StepPhase::Done);
        assert!(!step.details_visible);
        assert_eq!(step.detail_lines, vec!["found 10 keywords".to_string()]);
    }

    #[test]
    fn test_step_started_collapses_previous() {
        let model = fold(&[started("A", "a"), started("B", "b")]);
        assert_eq!(model.steps.len(), 2);
        assert_eq!(model.steps[0].phase, StepPhase::Done);
        assert!(!model.steps[0].details_visible);
        assert_eq!(model.steps[1].phase, StepPhase::Active);
        assert!(model.steps[1].details_visible);
        assert_eq!(model.steps[1].summary, "b");
    }

    #[test]
    fn test_step_started_preserves_order_and_names() {
        let model = fold(&[started("A", ""), started("A", ""), started("C", "")]);
        let names: Vec<_> = model.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A", "C"]);
        assert_ne!(model.steps[0].id, model.steps[1].id);
        assert!(model.steps[..2].iter().all(|s| s.phase == StepPhase::Done));
    }

    #[test]
    fn test_details_append_in_order() {
        let model = fold(&[
            started("A", ""),
            details("A", &["1", "2"]),
            details("A", &["2", "3"]),
        ]);
        assert_eq!(model.steps[0].detail_lines, vec!["1", "2", "2", "3"]);
    }

    #[test]
    fn test_details_only_grow_on_active_step() {
        let model = fold(&[
            started("A", ""),
            details("A", &["a1"]),
            started("B", ""),
            details("A", &["late"]),
        ]);
        assert_eq!(model.steps[0].detail_lines, vec!["a1"]);
        assert_eq!(model.steps[1].detail_lines, vec!["late"]);
    }

    #[test]
    fn test_content_update_without_active_step_is_noop() {
        let before = fold(&[]);
        let after = reduce(
            &before,
            &WorkflowEvent::StepContentUpdated {
                node: "A".into(),
                content: "x".into(),
            },
            Utc::now(),
        );
        assert_eq!(before, after);
    }

    #[test]
    fn test_content_update_replaces_summary() {
        let model = fold(&[
            started("A", "first"),
            WorkflowEvent::StepContentUpdated {
                node: "A".into(),
                content: "second".into(),
            },
        ]);
        assert_eq!(model.steps[0].summary, "second");
    }

    #[test]
    fn test_answers_are_independent_of_steps() {
        let mut payload = serde_json::Map::new();
        payload.insert("title".into(), serde_json::json!("Hello"));
        let answer = WorkflowEvent::AnswerProduced {
            node: "Writer".into(),
            payload,
        };
        let model = fold(&[answer.clone(), started("A", ""), answer]);
        assert_eq!(model.answers.len(), 2);
        assert_eq!(model.answers[0].source_step, "Writer");
        assert_eq!(model.steps.len(), 1);
    }

    #[test]
    fn test_completion_is_idempotent() {
        let once = fold(&[started("A", ""), started("B", ""), completed()]);
        let mut twice = once.clone();
        twice.status = SessionStatus::Streaming;
        let twice = reduce(&twice, &completed(), Utc::now());
        assert_eq!(once.steps, twice.steps);
    }

    #[test]
    fn test_failure_is_terminal() {
        let model = fold(&[
            started("A", ""),
            WorkflowEvent::WorkflowFailed {
                message: "backend timeout".into(),
            },
            started("B", ""),
            details("A", &["ignored"]),
        ]);
        assert_eq!(model.status, SessionStatus::Failed);
        assert!(model
            .error_message
            .as_deref()
            .unwrap()
            .contains("backend timeout"));
        assert_eq!(model.steps.len(), 1);
        assert_eq!(model.steps[0].phase, StepPhase::Interrupted);
        assert!(model.steps[0].detail_lines.is_empty());
        assert!(model.active_step().is_none());
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let now = Utc::now();
        let base = fold(&[started("A", "")]);
        let ev = details("A", &["x"]);
        assert_eq!(reduce(&base, &ev, now), reduce(&base, &ev, now));
    }
}
