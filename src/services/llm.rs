use crate::config::Settings;
use crate::error::ServiceError;
use crate::models::{
    AIResponse, Conversation, HistoryEntry, ImageUpload, Language, QuizSpec, Role, ScanInput,
};
use crate::services::prompts;
use crate::services::transport::{CompletionTransport, ReqwestTransport};
use crate::utils::to_data_url;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// The reply shape with the quiz left undecoded, so a malformed quiz cannot
/// take the explanation down with it.
#[derive(Debug, Deserialize)]
struct LooseReply {
    explanation: String,
    #[serde(default)]
    quiz: Option<Value>,
}

/// Outcome of decoding the model's text: either the structured payload we
/// asked for, or free text to show as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Structured(AIResponse),
    PlainText(String),
}

impl ParsedReply {
    pub fn parse(raw: &str) -> Self {
        let Ok(loose) = serde_json::from_str::<LooseReply>(raw) else {
            return ParsedReply::PlainText(raw.to_string());
        };

        let quiz = match loose.quiz {
            None | Some(Value::Null) => None,
            Some(value) => match serde_json::from_value::<QuizSpec>(value) {
                Ok(quiz) => Some(quiz),
                Err(e) => {
                    warn!(defect = %e, "discarding malformed quiz from completion service");
                    None
                }
            },
        };

        ParsedReply::Structured(AIResponse {
            explanation: loose.explanation,
            quiz,
        })
    }

    /// A structured reply keeps its quiz only if the quiz is answerable.
    pub fn into_response(self) -> AIResponse {
        match self {
            ParsedReply::Structured(mut response) => {
                if let Some(defect) = response.quiz.as_ref().and_then(|q| q.validate().err()) {
                    warn!(%defect, "discarding quiz from completion service");
                    response.quiz = None;
                }
                response
            }
            ParsedReply::PlainText(text) => AIResponse::plain(text),
        }
    }
}

/// Where a chat turn may be answered, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoute {
    Relay,
    Remote,
}

/// Mediates between learner input and the completion service. Every public
/// method is total: failures come back as readable content.
pub struct LLMClient {
    transport: Arc<dyn CompletionTransport>,
    api_url: String,
    model: String,
    vision_model: String,
    relay_url: String,
    use_relay: bool,
}

impl LLMClient {
    pub fn new(settings: &Settings) -> Self {
        Self::with_transport(settings, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(settings: &Settings, transport: Arc<dyn CompletionTransport>) -> Self {
        LLMClient {
            transport,
            api_url: settings.api_url.clone(),
            model: settings.model.clone(),
            vision_model: settings.vision_model.clone(),
            relay_url: settings.relay_url.clone(),
            use_relay: settings.use_relay,
        }
    }

    pub async fn explain_text(
        &self,
        question: &str,
        credential: Option<&str>,
        language: Language,
    ) -> AIResponse {
        let Some(api_key) = usable(credential) else {
            info!("no credential, answering text question with placeholder");
            return prompts::text_placeholder(question);
        };

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": prompts::localized(prompts::TEXT_SYSTEM_PROMPT, language)
                },
                { "role": "user", "content": question }
            ],
            "temperature": 0.7,
            "max_tokens": 1500
        });

        match self.complete(api_key, &body).await {
            Ok(raw) => normalize(&raw),
            Err(err) => {
                warn!(error = %err, "text explanation failed");
                AIResponse::plain(prompts::text_diagnostic(&err))
            }
        }
    }

    pub async fn explain_image(
        &self,
        image: &ImageUpload,
        credential: Option<&str>,
        language: Language,
    ) -> AIResponse {
        let Some(api_key) = usable(credential) else {
            info!(file = %image.file_name, "no credential, answering image with placeholder");
            return prompts::image_placeholder(&image.file_name);
        };

        let body = json!({
            "model": self.vision_model,
            "messages": [
                {
                    "role": "system",
                    "content": prompts::localized(prompts::IMAGE_SYSTEM_PROMPT, language)
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompts::IMAGE_INSTRUCTION },
                        {
                            "type": "image_url",
                            "image_url": { "url": to_data_url(&image.mime_type, &image.bytes) }
                        }
                    ]
                }
            ],
            "max_tokens": 1500
        });

        match self.complete(api_key, &body).await {
            Ok(raw) => normalize(&raw),
            Err(err) => {
                warn!(error = %err, file = %image.file_name, "image explanation failed");
                AIResponse::plain(prompts::image_diagnostic(&err))
            }
        }
    }

    pub async fn explain_scan(
        &self,
        input: &ScanInput,
        credential: Option<&str>,
        language: Language,
    ) -> AIResponse {
        match input {
            ScanInput::Text(question) => self.explain_text(question, credential, language).await,
            ScanInput::Image(image) => self.explain_image(image, credential, language).await,
            ScanInput::ImageReference(reference) => {
                let question = format!("Explain the content from this image: {}", reference);
                self.explain_text(&question, credential, language).await
            }
        }
    }

    /// One conversational turn. `history` precedes `message` and is sent as-is.
    pub async fn chat_turn(
        &self,
        message: &str,
        history: &[HistoryEntry],
        credential: Option<&str>,
        language: Language,
    ) -> String {
        let mut last_error = None;

        for route in self.chat_routes() {
            match self
                .attempt_chat(route, message, history, credential, language)
                .await
            {
                Ok(reply) => return reply,
                Err(err) => {
                    warn!(?route, error = %err, "chat route failed");
                    last_error = Some(err);
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| ServiceError::Transport("no chat route available".to_string()));
        prompts::chat_diagnostic(&err)
    }

    /// Appends the learner's turn and the reply to `conversation`. Blank input
    /// is ignored and leaves the conversation untouched.
    pub async fn converse(
        &self,
        conversation: &mut Conversation,
        input: &str,
        credential: Option<&str>,
        language: Language,
    ) -> Option<String> {
        let message = input.trim();
        if message.is_empty() {
            return None;
        }

        let history = conversation.history();
        conversation.push(Role::User, message);

        let reply = self.chat_turn(message, &history, credential, language).await;
        conversation.push(Role::Assistant, reply.clone());
        Some(reply)
    }

    pub fn chat_routes(&self) -> Vec<ChatRoute> {
        if self.use_relay {
            vec![ChatRoute::Relay, ChatRoute::Remote]
        } else {
            vec![ChatRoute::Remote]
        }
    }

    async fn attempt_chat(
        &self,
        route: ChatRoute,
        message: &str,
        history: &[HistoryEntry],
        credential: Option<&str>,
        language: Language,
    ) -> Result<String, ServiceError> {
        match route {
            ChatRoute::Relay => self.ask_relay(message, history).await,
            ChatRoute::Remote => {
                let Some(api_key) = usable(credential) else {
                    info!("no credential, answering chat turn with placeholder");
                    return Ok(prompts::CHAT_PLACEHOLDER.to_string());
                };

                let mut messages = Vec::with_capacity(history.len() + 2);
                messages.push(json!({
                    "role": "system",
                    "content": prompts::localized(prompts::CHAT_SYSTEM_PROMPT, language)
                }));
                messages.extend(history.iter().map(|entry| {
                    json!({ "role": entry.role.as_str(), "content": entry.content })
                }));
                messages.push(json!({ "role": "user", "content": message }));

                let body = json!({
                    "model": self.model,
                    "messages": messages,
                    "temperature": 0.7,
                    "max_tokens": 1000
                });

                let content = self.complete(api_key, &body).await?;
                Ok(or_empty_reply(content))
            }
        }
    }

    async fn ask_relay(
        &self,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<String, ServiceError> {
        let body = json!({ "message": message, "history": history });
        let reply = self.transport.post_json(&self.relay_url, None, &body).await?;
        if !reply.status.is_success() {
            return Err(ServiceError::Status(reply.status));
        }

        let data: Value = serde_json::from_str(&reply.body)
            .map_err(|e| ServiceError::Contract(format!("relay reply is not JSON: {e}")))?;
        let answer = ["answer", "response"]
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_str))
            .find(|text| !text.is_empty())
            .unwrap_or(prompts::EMPTY_REPLY);

        debug!("chat turn answered by relay");
        Ok(answer.to_string())
    }

    /// Sends one completion request and returns the first choice's text.
    async fn complete(&self, api_key: &str, body: &Value) -> Result<String, ServiceError> {
        let reply = self
            .transport
            .post_json(&self.api_url, Some(api_key), body)
            .await?;

        if !reply.status.is_success() {
            return Err(ServiceError::Status(reply.status));
        }

        let completion: ChatCompletion = serde_json::from_str(&reply.body)
            .map_err(|e| ServiceError::Contract(e.to_string()))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Contract("response contained no choices".to_string()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

fn usable(credential: Option<&str>) -> Option<&str> {
    credential.map(str::trim).filter(|key| !key.is_empty())
}

fn normalize(raw: &str) -> AIResponse {
    let parsed = ParsedReply::parse(raw);
    match &parsed {
        ParsedReply::Structured(_) => info!("completion decoded as structured reply"),
        ParsedReply::PlainText(_) => info!("completion is plain text, wrapping as explanation"),
    }
    parsed.into_response()
}

fn or_empty_reply(content: String) -> String {
    if content.is_empty() {
        prompts::EMPTY_REPLY.to_string()
    } else {
        content
    }
}
