//! 工作流事件：后端流水线通过 SSE 推送的进度事件
//!
//! 线上格式为带 `type` 判别字段的 JSON 对象；这里映射为封闭的 WorkflowEvent 枚举。

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// 解码后的单个事件
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// 新阶段开始（`internal` + `event_status: "new"`）
    StepStarted { node: String, content: String },
    /// 当前阶段的摘要更新（`internal` + `event_status: "old"`）
    StepContentUpdated { node: String, content: String },
    /// 当前阶段追加详情（`internal_content`）
    StepDetailAppended { node: String, lines: Vec<String> },
    /// 某阶段产出结果（`answer`）
    AnswerProduced {
        node: String,
        payload: Map<String, Value>,
    },
    /// 工作流结束（`complete`）
    WorkflowCompleted { message: String },
    /// 后端明确报告失败（`error`）
    WorkflowFailed { message: String },
}

impl WorkflowEvent {
    /// complete / error：收到后本次会话不再处理事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::WorkflowCompleted { .. } | WorkflowEvent::WorkflowFailed { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::StepStarted { .. } => "step_started",
            WorkflowEvent::StepContentUpdated { .. } => "step_content_updated",
            WorkflowEvent::StepDetailAppended { .. } => "step_detail_appended",
            WorkflowEvent::AnswerProduced { .. } => "answer_produced",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
            WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
        }
    }
}

/// 单个块解码失败的原因；均不致命，调用方记录后继续
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed event JSON: {0}")]
    MalformedJson(String),

    #[error("event is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("event has no \"type\" field")]
    MissingType,

    #[error("unknown event type: {0}")]
    UnknownType(String),

    #[error("invalid \"{kind}\" event: {reason}")]
    InvalidShape { kind: String, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EventStatus {
    New,
    Old,
}

#[derive(Debug, Deserialize)]
struct InternalWire {
    event_status: EventStatus,
    node: String,
    #[serde(default)]
    content: String,
}

/// `internal_content` 的 content 通常是字符串数组，偶尔是单个字符串
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailContent {
    Many(Vec<String>),
    One(String),
}

#[derive(Debug, Deserialize)]
struct InternalContentWire {
    node: String,
    content: DetailContent,
}

#[derive(Debug, Deserialize)]
struct AnswerWire {
    node: String,
    content: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MessageWire {
    #[serde(default)]
    content: String,
}

fn shape<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::InvalidShape {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// 解析一个 `data:` 负载（单个 JSON 对象）
pub fn parse_event(payload: &str) -> Result<WorkflowEvent, DecodeError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    match kind.as_str() {
        "internal" => {
            let wire: InternalWire = shape(&kind, value)?;
            Ok(match wire.event_status {
                EventStatus::New => WorkflowEvent::StepStarted {
                    node: wire.node,
                    content: wire.content,
                },
                EventStatus::Old => WorkflowEvent::StepContentUpdated {
                    node: wire.node,
                    content: wire.content,
                },
            })
        }
        "internal_content" => {
            let wire: InternalContentWire = shape(&kind, value)?;
            let lines = match wire.content {
                DetailContent::Many(lines) => lines,
                DetailContent::One(line) => vec![line],
            };
            Ok(WorkflowEvent::StepDetailAppended {
                node: wire.node,
                lines,
            })
        }
        "answer" => {
            let wire: AnswerWire = shape(&kind, value)?;
            Ok(WorkflowEvent::AnswerProduced {
                node: wire.node,
                payload: wire.content,
            })
        }
        "complete" => {
            let wire: MessageWire = shape(&kind, value)?;
            Ok(WorkflowEvent::WorkflowCompleted {
                message: wire.content,
            })
        }
        "error" => {
            let wire: MessageWire = shape(&kind, value)?;
            Ok(WorkflowEvent::WorkflowFailed {
                message: wire.content,
            })
        }
        _ => Err(DecodeError::UnknownType(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_internal_new_and_old() {
        let started = parse_event(
            r#"{"type":"internal","event_status":"new","node":"Outline","content":"Drafting"}"#,
        )
        .unwrap();
        assert_eq!(
            started,
            WorkflowEvent::StepStarted {
                node: "Outline".into(),
                content: "Drafting".into()
            }
        );

        let updated = parse_event(
            r#"{"type":"internal","event_status":"old","node":"Outline","content":"Half done"}"#,
        )
        .unwrap();
        assert!(matches!(updated, WorkflowEvent::StepContentUpdated { .. }));
    }

    #[test]
    fn test_parse_detail_accepts_single_string() {
        let ev = parse_event(r#"{"type":"internal_content","node":"A","content":"one"}"#).unwrap();
        assert_eq!(
            ev,
            WorkflowEvent::StepDetailAppended {
                node: "A".into(),
                lines: vec!["one".into()]
            }
        );
    }

    #[test]
    fn test_parse_answer_keeps_nested_payload() {
        let ev = parse_event(
            r#"{"type":"answer","node":"SEO","content":{"title":"T","tags":["a","b"],"meta":{"len":3}}}"#,
        )
        .unwrap();
        match ev {
            WorkflowEvent::AnswerProduced { node, payload } => {
                assert_eq!(node, "SEO");
                assert_eq!(payload["tags"][1], "b");
                assert_eq!(payload["meta"]["len"], 3);
            }
            other => panic!("Expected AnswerProduced, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_event("{not json"),
            Err(DecodeError::MalformedJson(_))
        ));
        assert_eq!(parse_event(r#"{"node":"x"}"#), Err(DecodeError::MissingType));
        assert_eq!(
            parse_event(r#"{"type":"heartbeat"}"#),
            Err(DecodeError::UnknownType("heartbeat".into()))
        );
        assert!(matches!(
            parse_event(r#"{"type":"answer","node":"x","content":"plain"}"#),
            Err(DecodeError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_terminal_events() {
        let done = parse_event(r#"{"type":"complete","content":"ok"}"#).unwrap();
        let failed = parse_event(r#"{"type":"error","content":"boom"}"#).unwrap();
        assert!(done.is_terminal());
        assert!(failed.is_terminal());
        assert_eq!(
            failed,
            WorkflowEvent::WorkflowFailed {
                message: "boom".into()
            }
        );
    }
}
