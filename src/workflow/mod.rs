//! 工作流事件：线上事件定义、SSE 增量解码、Step / Answer 归约

pub mod codec;
pub mod events;
pub mod reducer;

pub use codec::{Decoded, SseDecoder};
pub use events::{parse_event, DecodeError, WorkflowEvent};
pub use reducer::{reduce, WORKFLOW_ERROR_PREFIX};
