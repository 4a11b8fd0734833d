//! SSE 增量解码器
//!
//! 块之间以空行（`\n\n`）分隔，块内以 `data:` 开头的行承载一个 JSON 事件。
//! 字节可能在任意位置被切开（包括 UTF-8 多字节字符中间），未结束的块留在 carry-over 缓冲中。

use crate::workflow::events::{parse_event, DecodeError, WorkflowEvent};

const DATA_PREFIX: &str = "data:";

/// 单个块的解码结果
pub type Decoded = Result<WorkflowEvent, DecodeError>;

/// 一个连接对应一个解码器；连接结束后调用 finish 消费掉它
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// buffer 中已确认不含块边界的前缀长度
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一段字节，返回由此凑齐的所有块的解码结果（按线上顺序）
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        // JSON 字符串内不会出现裸 \r，直接丢弃即可兼容 \r\n 分帧
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut out = Vec::new();
        loop {
            // 回退一个字节：边界的第一个 \n 可能是上一段的最后一个字节
            let from = self.scanned.saturating_sub(1);
            let Some(pos) = find_boundary(&self.buffer[from..]).map(|p| from + p) else {
                self.scanned = self.buffer.len();
                break;
            };
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            self.scanned = 0;
            if let Some(decoded) = decode_block(&block[..pos]) {
                out.push(decoded);
            }
        }
        out
    }

    /// 连接结束：把最后一个没有空行结尾的块也解出来
    pub fn finish(self) -> Option<Decoded> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        decode_block(&self.buffer)
    }

    /// 尚未凑成完整块的字节数
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// 从块中取出所有 `data:` 行并拼接；没有 data 行的块（注释、心跳）返回 None
fn decode_block(block: &[u8]) -> Option<Decoded> {
    let text = match std::str::from_utf8(block) {
        Ok(text) => text,
        Err(e) => {
            // 只有携带 data 行的块才算事件；损坏的注释或心跳照样忽略
            let has_data = block
                .split(|b| *b == b'\n')
                .any(|line| line.starts_with(DATA_PREFIX.as_bytes()));
            return has_data.then(|| Err(DecodeError::InvalidUtf8(e.to_string())));
        }
    };
    let mut payload: Option<String> = None;
    for line in text.lines() {
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match payload.as_mut() {
            Some(p) => {
                p.push('\n');
                p.push_str(rest);
            }
            None => payload = Some(rest.to_string()),
        }
    }
    payload.map(|p| parse_event(&p))
}
