//! 进度渲染
//!
//! 记住上一次看到的步骤与答案，只输出新增或变化的部分（新步骤、摘要更新、详情行、阶段变化、状态变化）。

use std::collections::HashMap;

use crate::core::{SessionStatus, StepId, StepPhase, WorkflowSnapshot};

#[derive(Debug, Clone)]
struct SeenStep {
    phase: StepPhase,
    summary: String,
    detail_count: usize,
}

/// 快照差分打印器
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    steps: HashMap<StepId, SeenStep>,
    answers_seen: usize,
    status: Option<SessionStatus>,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回自上次调用以来新增的输出行
    pub fn render(&mut self, snap: &WorkflowSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.status != Some(snap.status) {
            lines.push(status_line(snap));
            self.status = Some(snap.status);
        }

        // 重连会清空上一次尝试的结果
        if snap.answers.len() < self.answers_seen {
            self.answers_seen = 0;
        }

        for step in &snap.steps {
            let seen = self.steps.entry(step.id).or_insert_with(|| {
                lines.push(format!("▶ {}: {}", step.name, step.summary));
                SeenStep {
                    phase: StepPhase::Active,
                    summary: step.summary.clone(),
                    detail_count: 0,
                }
            });
            if seen.summary != step.summary {
                lines.push(format!("  {}: {}", step.name, step.summary));
                seen.summary = step.summary.clone();
            }
            for detail in step.detail_lines.iter().skip(seen.detail_count) {
                lines.push(format!("    · {detail}"));
            }
            seen.detail_count = step.detail_lines.len();
            if seen.phase != step.phase {
                match step.phase {
                    StepPhase::Done => lines.push(format!("✔ {}", step.name)),
                    StepPhase::Interrupted => lines.push(format!("✖ {}", step.name)),
                    StepPhase::Pending | StepPhase::Active => {}
                }
                seen.phase = step.phase;
            }
        }

        for answer in snap.answers.iter().skip(self.answers_seen) {
            let payload = serde_json::to_string_pretty(&answer.payload).unwrap_or_default();
            lines.push(format!("◆ {}\n{}", answer.source_step, payload));
        }
        self.answers_seen = snap.answers.len();

        lines
    }
}

fn status_line(snap: &WorkflowSnapshot) -> String {
    match snap.status {
        SessionStatus::Idle => "[idle]".to_string(),
        SessionStatus::Connecting if snap.retry_count > 0 => {
            format!("[reconnecting, retry {}]", snap.retry_count)
        }
        SessionStatus::Connecting => "[connecting]".to_string(),
        SessionStatus::Streaming => "[streaming]".to_string(),
        SessionStatus::Completed => "[completed]".to_string(),
        SessionStatus::Failed => format!(
            "[failed] {}",
            snap.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}
