use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;

const WELCOME_MESSAGE: &str = "**Welcome to NeuroLens AI Tutor!** 🚀\n\nI'm here to help you learn anything. Ask me questions about:\n- Math, Science, History, Languages\n- Programming, Technology\n- Any topic you want to understand better\n\nHow can I help you today?";

/// A run of text inside a content node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum InlineSpan {
    Plain(String),
    Bold(String),
}

impl InlineSpan {
    pub fn text(&self) -> &str {
        match self {
            InlineSpan::Plain(text) | InlineSpan::Bold(text) => text,
        }
    }
}

/// One structural unit of rendered explanation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentNode {
    /// Level is always 1, 2 or 3.
    Heading { level: u8, text: Vec<InlineSpan> },
    ListItem { ordered: bool, text: Vec<InlineSpan> },
    Paragraph { text: Vec<InlineSpan> },
    LineBreak,
}

impl ContentNode {
    pub fn spans(&self) -> &[InlineSpan] {
        match self {
            ContentNode::Heading { text, .. }
            | ContentNode::ListItem { text, .. }
            | ContentNode::Paragraph { text } => text,
            ContentNode::LineBreak => &[],
        }
    }

    /// Concatenated span text with bold markers stripped.
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        self.spans().iter().map(InlineSpan::text).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSpec {
    pub question: String,
    pub options: Vec<QuizOption>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFeedback {
    pub is_correct: bool,
    pub message: String,
}

impl QuizSpec {
    /// Rejects quizzes a reader could not answer: no options, duplicate ids,
    /// or a correct answer that names none of the options.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.options.is_empty() {
            return Err(ServiceError::Contract("quiz has no options".to_string()));
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if !seen.insert(option.id.as_str()) {
                return Err(ServiceError::Contract(format!(
                    "quiz option id '{}' is not unique",
                    option.id
                )));
            }
        }

        if !seen.contains(self.correct_answer.as_str()) {
            return Err(ServiceError::Contract(format!(
                "quiz correct answer '{}' matches no option",
                self.correct_answer
            )));
        }

        Ok(())
    }

    pub fn correct_option(&self) -> Option<&QuizOption> {
        self.options.iter().find(|opt| opt.id == self.correct_answer)
    }

    pub fn check_answer(&self, answer_id: &str) -> AnswerFeedback {
        if answer_id == self.correct_answer {
            return AnswerFeedback {
                is_correct: true,
                message: "✓ Correct! Great job understanding the concept.".to_string(),
            };
        }

        let correct_text = self
            .correct_option()
            .map(|opt| opt.text.as_str())
            .unwrap_or_default();
        AnswerFeedback {
            is_correct: false,
            message: format!("✗ Not quite. The correct answer is: {}", correct_text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AIResponse {
    pub explanation: String,
    #[serde(default)]
    pub quiz: Option<QuizSpec>,
}

impl AIResponse {
    pub fn plain(explanation: impl Into<String>) -> Self {
        AIResponse {
            explanation: explanation.into(),
            quiz: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role/content pair as sent to the completion service and the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only chat log. Insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        let mut conversation = Conversation::default();
        conversation.push(Role::Assistant, WELCOME_MESSAGE);
        conversation
    }

    pub fn resume(history: Vec<HistoryEntry>) -> Self {
        let mut conversation = Conversation::default();
        for entry in history {
            conversation.push(entry.role, entry.content);
        }
        conversation
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &ChatMessage {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Snapshot of the log as role/content pairs.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|msg| HistoryEntry {
                role: msg.role,
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "EN")]
    English,
    #[serde(rename = "KA")]
    Georgian,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EN" => Ok(Language::English),
            "KA" => Ok(Language::Georgian),
            other => Err(format!("unsupported language '{}', expected EN or KA", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => write!(f, "EN"),
            Language::Georgian => write!(f, "KA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// What the user handed us to explain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanInput {
    Text(String),
    Image(ImageUpload),
    /// An image known only by name or description, with no bytes attached.
    ImageReference(String),
}
