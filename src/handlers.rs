use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::normalize::{self, NormalizationError};
use crate::upstream::{self, RelayError};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::time::Instant;

const CHAT_REQUESTS: &str = "chatrelay_chat_requests_total";
const UPSTREAM_RESPONSES: &str = "chatrelay_upstream_responses_total";
const UPSTREAM_DURATION: &str = "chatrelay_upstream_duration_seconds";

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

pub async fn not_found() -> AppError {
    AppError::not_found()
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Response> {
    let body = body.map_err(body_rejection)?;

    let payload = normalize::normalize(&body)
        .or_else(|err| match err {
            NormalizationError::MalformedJson(detail) => {
                tracing::debug!(%detail, "malformed chat body, treating it as {{}}");
                normalize::normalize_value(&Value::Object(Map::new()))
            }
            other => Err(other),
        })
        .inspect_err(|_| {
            metrics::counter!(CHAT_REQUESTS, "outcome" => "rejected").increment(1);
        })?;

    let started = Instant::now();
    let resp = upstream::relay(&state.http, &state.runtime.upstream, &payload)
        .await
        .map_err(|err| {
            match &err {
                RelayError::MissingCredential => tracing::warn!(code = err.code(), "{err}"),
                _ => tracing::error!(code = err.code(), "upstream relay failed: {err}"),
            }
            metrics::counter!(CHAT_REQUESTS, "outcome" => err.code()).increment(1);
            AppError::from(err)
        })?;

    metrics::histogram!(UPSTREAM_DURATION).record(started.elapsed().as_secs_f64());
    metrics::counter!(UPSTREAM_RESPONSES, "status" => resp.status.as_u16().to_string())
        .increment(1);
    metrics::counter!(CHAT_REQUESTS, "outcome" => "relayed").increment(1);
    tracing::debug!(
        status = resp.status.as_u16(),
        bytes = resp.body.len(),
        upstream_content_type = ?resp.headers.get(CONTENT_TYPE),
        model = %payload.model,
        "relayed upstream response"
    );

    Ok((resp.status, [(CONTENT_TYPE, "application/json")], resp.body).into_response())
}

fn body_rejection(rejection: BytesRejection) -> AppError {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "body_too_large",
                "request body too large",
            )
        }
        other => {
            tracing::debug!("failed to read chat body: {other}");
            AppError::new(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                "failed to read request body",
            )
        }
    }
}
