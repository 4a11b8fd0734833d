//! HTTP 事件流客户端
//!
//! POST `{ "<input_field>": <输入> }`，`Accept: text/event-stream`，把 reqwest 的 bytes_stream 交给解码器。

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};

use crate::config::StreamSection;
use crate::core::StreamError;
use crate::transport::{ByteStream, EventTransport};

/// 错误响应体最多保留的字符数
const MAX_ERROR_BODY_CHARS: usize = 500;

/// reqwest 实现：持有 Client、端点与输入字段名
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    input_field: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        input_field: impl Into<String>,
        connect_timeout: Duration,
        extra_headers: &[(String, String)],
    ) -> Result<Self, StreamError> {
        let mut headers = HeaderMap::new();
        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::InvalidRequest(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self::with_client(client, endpoint, input_field))
    }

    /// 使用外部构建的 Client（自定义代理、TLS 等）
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        input_field: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            input_field: input_field.into(),
        }
    }

    pub fn from_config(cfg: &StreamSection) -> Result<Self, StreamError> {
        let headers: Vec<(String, String)> = cfg
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::new(
            cfg.endpoint.clone(),
            cfg.input_field.clone(),
            Duration::from_secs(cfg.connect_timeout_secs),
            &headers,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn open(&self, user_input: &str) -> Result<ByteStream, StreamError> {
        let mut body = serde_json::Map::new();
        body.insert(
            self.input_field.clone(),
            serde_json::Value::String(user_input.to_string()),
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::HttpStatus {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        tracing::debug!(endpoint = %self.endpoint, "Event stream opened");
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(StreamError::from)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_header() {
        let result = HttpTransport::new(
            "http://localhost/stream",
            "user_article",
            Duration::from_secs(1),
            &[("bad header".to_string(), "x".to_string())],
        );
        assert!(matches!(result, Err(StreamError::InvalidRequest(_))));
    }
}
