//! 传输层：事件流传输抽象与实现（HTTP / Scripted）

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpTransport;
pub use mock::{Attempt, ScriptedTransport};
pub use traits::{ByteStream, EventTransport};
