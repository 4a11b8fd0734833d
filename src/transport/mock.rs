//! 脚本化传输（用于测试与离线演示，无需后端）
//!
//! 每次 open 依次取出一个预设的 Attempt：要么直接拒绝连接，要么按给定分块吐出字节，
//! 之后可以选择结束流或保持挂起（模拟仍在进行中的长连接）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::core::StreamError;
use crate::transport::{ByteStream, EventTransport};

/// 一次连接尝试的剧本
#[derive(Debug, Clone)]
pub enum Attempt {
    /// open 直接失败
    Refuse(StreamError),
    /// 成功打开并依次产出 chunks；hold_open 为 true 时产出完毕后保持挂起
    Stream {
        chunks: Vec<Result<Bytes, StreamError>>,
        hold_open: bool,
    },
}

impl Attempt {
    /// 将文本按 chunk_size 字节切块后产出，然后结束流
    pub fn text(body: &str, chunk_size: usize) -> Self {
        let chunks = body
            .as_bytes()
            .chunks(chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Attempt::Stream {
            chunks,
            hold_open: false,
        }
    }

    /// 产出文本后保持连接（直到被取消）
    pub fn text_then_hang(body: &str) -> Self {
        Attempt::Stream {
            chunks: vec![Ok(Bytes::copy_from_slice(body.as_bytes()))],
            hold_open: true,
        }
    }
}

/// 按剧本回放的传输；记录每次 open 收到的输入
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    attempts: Mutex<VecDeque<Attempt>>,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(attempts: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into_iter().collect()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// 追加剧本（可在会话之间补充）
    pub fn push(&self, attempt: Attempt) {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push_back(attempt);
        }
    }

    /// 至今收到的所有输入（按 open 顺序）
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.inputs.lock().map(|i| i.len()).unwrap_or_default()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(&self, user_input: &str) -> Result<ByteStream, StreamError> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(user_input.to_string());
        }
        let next = self.attempts.lock().ok().and_then(|mut a| a.pop_front());
        match next {
            None => Err(StreamError::Connect("no scripted attempt left".to_string())),
            Some(Attempt::Refuse(err)) => Err(err),
            Some(Attempt::Stream { chunks, hold_open }) => {
                let body = stream::iter(chunks);
                if hold_open {
                    Ok(Box::pin(body.chain(stream::pending())))
                } else {
                    Ok(Box::pin(body))
                }
            }
        }
    }
}
