//! Outbound HTTP seam for the completion service and the local relay.

use crate::error::ServiceError;
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;

/// Status and raw body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// POSTs `body` as JSON. `bearer` becomes an `Authorization: Bearer` header.
    async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<HttpReply, ServiceError>;
}

/// Transport backed by a shared `reqwest::Client`, relying on its default timeouts.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<HttpReply, ServiceError> {
        let mut request_builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);

        if let Some(token) = bearer {
            request_builder = request_builder.bearer_auth(token);
        }

        let response = request_builder.send().await?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let body = response.text().await?;

        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub url: String,
        pub bearer: Option<String>,
        pub body: Value,
    }

    /// Replays queued replies in order and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply, ServiceError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, status: StatusCode, body: impl Into<String>) -> Self {
            self.replies.lock().unwrap().push_back(Ok(HttpReply {
                status,
                body: body.into(),
            }));
            self
        }

        /// Queues a successful chat-completions reply carrying `content`.
        pub fn completion(self, content: &str) -> Self {
            let body = serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            });
            self.reply(StatusCode::OK, body.to_string())
        }

        pub fn fail(self, message: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(ServiceError::Transport(message.to_string())));
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn post_json(
            &self,
            url: &str,
            bearer: Option<&str>,
            body: &Value,
        ) -> Result<HttpReply, ServiceError> {
            self.calls.lock().unwrap().push(RecordedCall {
                url: url.to_string(),
                bearer: bearer.map(str::to_string),
                body: body.clone(),
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transport("no scripted reply".to_string())))
        }
    }
}
