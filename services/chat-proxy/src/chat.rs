//! /chat endpoint: request validation, failover dispatch, response shaping.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{info, instrument, warn};

use groq_pool::{ChatMessage, ChatRequest, Error as PoolError, request_mode};

use crate::AppState;
use crate::metrics::{self, InFlightGuard};

/// Surfaced when every candidate in the fallback chain has been tried.
pub const BUSY_MESSAGE: &str = "Ventora is busy. Please try again shortly.";

/// Build a JSON response with permissive CORS headers.
///
/// Every response from this service carries CORS headers so browser clients
/// can call it cross-origin without a separate proxy.
pub fn json_response(status: StatusCode, body: Value) -> Response {
    let mut response = (status, axum::Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// CORS preflight for /chat. 200 with the CORS headers and no body.
pub async fn preflight_handler() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Any method on /chat other than POST or OPTIONS.
pub async fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({ "error": "Method not allowed" }),
    )
}

/// Parse and validate a chat request body.
///
/// Returns the client-visible error string on rejection. Validation happens
/// before any upstream call: a rejected body never consumes a candidate.
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, &'static str> {
    let value: Value = serde_json::from_slice(body).map_err(|_| "Invalid JSON body")?;

    let messages = match value.get("messages") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => return Err("Invalid messages"),
    };

    let mut parsed = Vec::with_capacity(messages.len());
    for entry in messages {
        let role = entry.get("role").and_then(Value::as_str);
        let content = entry.get("content").and_then(Value::as_str);
        match (role, content) {
            (Some(role), Some(content)) => parsed.push(ChatMessage {
                role: role.to_string(),
                content: content.to_string(),
            }),
            _ => return Err("Invalid messages"),
        }
    }

    let mode = request_mode(value.get("model").and_then(Value::as_str)).to_string();
    let temperature = value.get("temperature").and_then(Value::as_f64);
    let max_tokens = value
        .get("max_tokens")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    Ok(ChatRequest {
        mode,
        messages: parsed,
        temperature,
        max_tokens,
    })
}

/// POST /chat: validate, walk the fallback chain, shape the response.
pub async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().simple());
    handle_chat(state, body, request_id).await
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn handle_chat(state: AppState, body: Bytes, request_id: String) -> Response {
    let _in_flight = InFlightGuard::enter(&state.metrics.in_flight);
    let start = Instant::now();

    state
        .metrics
        .requests_total
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let request = match parse_chat_request(&body) {
        Ok(request) => request,
        Err(message) => {
            warn!(error = message, "rejected chat request");
            metrics::record_request(400, "invalid", start.elapsed().as_secs_f64());
            return json_response(StatusCode::BAD_REQUEST, json!({ "error": message }));
        }
    };

    let mode = request.mode.clone();
    info!(mode = %mode, messages = request.messages.len(), "dispatching chat request");

    match state.router.route(&request).await {
        Ok(payload) => {
            metrics::record_request(200, &mode, start.elapsed().as_secs_f64());
            info!(elapsed_ms = start.elapsed().as_millis() as u64, "chat request served");
            json_response(StatusCode::OK, payload)
        }
        Err(PoolError::Exhausted { details }) => {
            state
                .metrics
                .errors_total
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            metrics::record_request(429, &mode, start.elapsed().as_secs_f64());
            metrics::record_upstream_error("exhausted");
            warn!(details = ?details, "all candidates exhausted");
            json_response(
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": BUSY_MESSAGE, "details": details }),
            )
        }
        Err(err) => {
            state
                .metrics
                .errors_total
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            metrics::record_request(500, &mode, start.elapsed().as_secs_f64());
            metrics::record_upstream_error("internal");
            warn!(error = %err, "chat request failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn rejects_non_json_body() {
        assert_eq!(parse_chat_request(b"not json"), Err("Invalid JSON body"));
    }

    #[test]
    fn rejects_missing_messages() {
        let body = serde_json::to_vec(&json!({ "model": "groq:general" })).unwrap();
        assert_eq!(parse_chat_request(&body), Err("Invalid messages"));
    }

    #[test]
    fn rejects_non_array_messages() {
        let body = serde_json::to_vec(&json!({ "messages": "hello" })).unwrap();
        assert_eq!(parse_chat_request(&body), Err("Invalid messages"));
    }

    #[test]
    fn rejects_empty_messages() {
        let body = serde_json::to_vec(&json!({ "messages": [] })).unwrap();
        assert_eq!(parse_chat_request(&body), Err("Invalid messages"));
    }

    #[test]
    fn rejects_entry_without_string_role() {
        let body = serde_json::to_vec(&json!({
            "messages": [{ "role": 7, "content": "hi" }]
        }))
        .unwrap();
        assert_eq!(parse_chat_request(&body), Err("Invalid messages"));
    }

    #[test]
    fn rejects_entry_without_content() {
        let body = serde_json::to_vec(&json!({
            "messages": [{ "role": "user" }]
        }))
        .unwrap();
        assert_eq!(parse_chat_request(&body), Err("Invalid messages"));
    }

    #[test]
    fn parses_minimal_request() {
        let body = serde_json::to_vec(&json!({
            "messages": [{ "role": "user", "content": "hello" }]
        }))
        .unwrap();
        let request = parse_chat_request(&body).unwrap();
        assert_eq!(request.mode, "general");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, None);
    }

    #[test]
    fn parsed_request_compares_as_a_value() {
        let body = serde_json::to_vec(&json!({
            "model": "groq:study",
            "messages": [{ "role": "user", "content": "hello" }],
            "temperature": 0.5
        }))
        .unwrap();
        assert_eq!(
            parse_chat_request(&body),
            Ok(ChatRequest {
                mode: "study".to_string(),
                messages: vec![ChatMessage {
                    role: "user".to_string(),
                    content: "hello".to_string(),
                }],
                temperature: Some(0.5),
                max_tokens: None,
            })
        );
    }

    #[test]
    fn strips_provider_prefix_from_model() {
        let body = serde_json::to_vec(&json!({
            "model": "groq:research",
            "messages": [{ "role": "user", "content": "hi" }]
        }))
        .unwrap();
        let request = parse_chat_request(&body).unwrap();
        assert_eq!(request.mode, "research");
    }

    #[test]
    fn model_without_prefix_passes_through() {
        let body = serde_json::to_vec(&json!({
            "model": "study",
            "messages": [{ "role": "user", "content": "hi" }]
        }))
        .unwrap();
        let request = parse_chat_request(&body).unwrap();
        assert_eq!(request.mode, "study");
    }

    #[test]
    fn carries_tuning_overrides() {
        let body = serde_json::to_vec(&json!({
            "messages": [{ "role": "user", "content": "hi" }],
            "temperature": 0.2,
            "max_tokens": 512
        }))
        .unwrap();
        let request = parse_chat_request(&body).unwrap();
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(512));
    }

    #[test]
    fn json_response_carries_cors_headers() {
        let response = json_response(StatusCode::OK, json!({ "ok": true }));
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    #[tokio::test]
    async fn method_not_allowed_is_json_405() {
        let response = method_not_allowed().await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Method not allowed");
    }
}
