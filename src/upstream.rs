use crate::config::UpstreamConfig;
use crate::error::AppError;
use crate::normalize::UpstreamChatRequest;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use std::time::Duration;

pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Missing OPENROUTER_API_KEY environment variable")]
    MissingCredential,
    #[error("{0}")]
    Transport(String),
    #[error("upstream request timed out after {0} ms")]
    Timeout(u64),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MissingCredential => "missing_credential",
            RelayError::Transport(_) => "transport_error",
            RelayError::Timeout(_) => "timeout",
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.code(), err.to_string())
    }
}

/// Whatever the provider answered, status included. A 4xx/5xx here is still
/// a successful relay.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub headers: HeaderMap,
}

pub async fn relay(
    client: &reqwest::Client,
    config: &UpstreamConfig,
    payload: &UpstreamChatRequest,
) -> Result<UpstreamResponse, RelayError> {
    let api_key = config
        .api_key
        .as_deref()
        .ok_or(RelayError::MissingCredential)?;
    let url = join_url(&config.base_url, CHAT_COMPLETIONS_PATH);
    let timeout_ms = config.timeout_ms;

    let resp = client
        .post(url)
        .timeout(Duration::from_millis(timeout_ms))
        .bearer_auth(api_key)
        .header("HTTP-Referer", config.referer.as_str())
        .header("X-Title", config.title.as_str())
        .json(payload)
        .send()
        .await
        .map_err(|err| transport_error(err, timeout_ms))?;

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp
        .bytes()
        .await
        .map_err(|err| transport_error(err, timeout_ms))?;
    Ok(UpstreamResponse {
        status,
        body,
        headers,
    })
}

fn transport_error(err: reqwest::Error, timeout_ms: u64) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout(timeout_ms)
    } else {
        RelayError::Transport(err.to_string())
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
