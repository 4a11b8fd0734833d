//! 事件流传输抽象
//!
//! 所有传输（HTTP / Scripted）实现 EventTransport：用一次用户输入打开一条字节流。

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::core::StreamError;

/// 响应体字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// 传输 trait：发起请求并返回响应体字节流
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// 打开一条事件流；返回 Ok 表示已收到成功的响应头
    async fn open(&self, user_input: &str) -> Result<ByteStream, StreamError>;
}
