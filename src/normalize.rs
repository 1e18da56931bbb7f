//! Turns whatever the client posted into the single payload shape the
//! completion provider accepts.

use crate::error::AppError;
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value, json};

pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.2-3b-instruct:free";
pub const DEFAULT_MAX_TOKENS: u64 = 500;
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Respond in the same language as the user's message.";

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(String),
    #[error("message is required")]
    MissingMessage,
}

impl NormalizationError {
    pub fn code(&self) -> &'static str {
        match self {
            NormalizationError::MalformedJson(_) => "invalid_json",
            NormalizationError::MissingMessage => "message_required",
        }
    }
}

impl From<NormalizationError> for AppError {
    fn from(err: NormalizationError) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, err.code(), err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn to_value(&self) -> Value {
        json!({ "role": self.role, "content": self.content })
    }
}

/// The two request shapes a client may send, decided once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingChatRequest {
    RawMessage(String),
    MessageList {
        messages: Vec<Value>,
        model: Option<Value>,
        max_tokens: Option<Value>,
    },
}

/// Canonical payload posted upstream. Caller-supplied message lists, and any
/// non-falsy `model` or `max_tokens` sent alongside them, are kept as raw JSON
/// so they are forwarded without reshaping.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpstreamChatRequest {
    pub model: Value,
    pub messages: Vec<Value>,
    pub max_tokens: Value,
}

pub fn normalize(body: &[u8]) -> Result<UpstreamChatRequest, NormalizationError> {
    let value = parse_body(body)?;
    normalize_value(&value)
}

pub fn parse_body(body: &[u8]) -> Result<Value, NormalizationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|err| NormalizationError::MalformedJson(err.to_string()))
}

pub fn normalize_value(value: &Value) -> Result<UpstreamChatRequest, NormalizationError> {
    classify(value).map(build_upstream)
}

pub fn classify(value: &Value) -> Result<IncomingChatRequest, NormalizationError> {
    if let Some(messages) = value.get("messages").and_then(Value::as_array) {
        if !messages.is_empty() {
            return Ok(IncomingChatRequest::MessageList {
                messages: messages.clone(),
                model: truthy_field(value, "model"),
                max_tokens: truthy_field(value, "max_tokens"),
            });
        }
    }

    let text = value.get("message").map(coerce_text).unwrap_or_default();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NormalizationError::MissingMessage);
    }
    Ok(IncomingChatRequest::RawMessage(trimmed.to_string()))
}

pub fn build_upstream(req: IncomingChatRequest) -> UpstreamChatRequest {
    match req {
        IncomingChatRequest::RawMessage(text) => {
            let turns = [
                ChatMessage {
                    role: Role::System,
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    content: text,
                },
            ];
            UpstreamChatRequest {
                model: Value::from(DEFAULT_MODEL),
                messages: turns.iter().map(ChatMessage::to_value).collect(),
                max_tokens: Value::from(DEFAULT_MAX_TOKENS),
            }
        }
        IncomingChatRequest::MessageList {
            messages,
            model,
            max_tokens,
        } => UpstreamChatRequest {
            model: model.unwrap_or_else(|| Value::from(DEFAULT_MODEL)),
            messages,
            max_tokens: max_tokens.unwrap_or_else(|| Value::from(DEFAULT_MAX_TOKENS)),
        },
    }
}

/// `null`, `false`, `0` and `""` count as absent. Arrays and objects,
/// even empty ones, do not.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Bool(true) | Value::Array(_) | Value::Object(_) => false,
    }
}

fn truthy_field(value: &Value, key: &str) -> Option<Value> {
    value.get(key).filter(|v| !is_falsy(v)).cloned()
}

fn coerce_text(value: &Value) -> String {
    if is_falsy(value) {
        return String::new();
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
