//! Backend response envelope normalization.
//!
//! Every JSON response from the backend is shaped
//! `{code, msg, data?|rows?&total?|result?}`. The business `code` is the only
//! success discriminator: `200` (numeric or `"200"`) means success even
//! though the transport status was already 2xx, and any other code is an
//! application-level error. This module turns transport status + raw body
//! into a single [`Outcome`].

use bytes::Bytes;
use serde_json::{Map, Value};

/// Business code signalling success.
pub const SUCCESS_CODE: i64 = 200;
/// Business code signalling an expired/invalid session.
pub const UNAUTHORIZED_CODE: i64 = 401;

const DEFAULT_ERROR_MESSAGE: &str = "unknown error, please try again later";

/// How the caller wants the response body treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Json,
    Binary,
}

/// Normalized result of one response.
#[derive(Debug)]
pub enum Outcome {
    /// Business code 200; payload already extracted.
    Success(Value),
    /// Raw bytes: binary content type or a caller that asked for binary.
    Binary(Bytes),
    /// Business code 401.
    Unauthorized,
    /// Any other business code.
    Business { code: i64, message: String },
    /// Non-success transport status.
    Transport { status: u16, message: String },
}

/// Human-readable text for common HTTP statuses, used both for the transport
/// gate and as the fallback when the backend sends an empty `msg`.
pub fn status_message(status: u16) -> Option<&'static str> {
    Some(match status {
        400 => "bad request",
        401 => "unauthorized",
        403 => "access denied",
        404 => "resource not found",
        405 => "method not allowed",
        408 => "request timed out",
        429 => "too many requests, slow down",
        500 => "internal server error",
        501 => "not implemented",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        _ => return None,
    })
}

/// Interpret one response. Rules apply strictly in order:
/// transport gate, binary short-circuit, lenient JSON parse, code dispatch.
pub fn interpret(
    status: u16,
    content_type: Option<&str>,
    kind: ResponseKind,
    body: Bytes,
) -> Outcome {
    if !(200..300).contains(&status) {
        let message = status_message(status)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Outcome::Transport { status, message };
    }

    let binary_content = content_type
        .map(|ct| ct.contains("octet-stream") || ct.starts_with("image/") || ct.starts_with("video/") || ct.starts_with("audio/"))
        .unwrap_or(false);
    if kind == ResponseKind::Binary || binary_content {
        return Outcome::Binary(body);
    }

    // Empty or unparsable bodies become an empty object; this layer never
    // fails on malformed JSON.
    let value: Value = serde_json::from_slice(&body).unwrap_or_else(|_| Value::Object(Map::new()));

    let code = envelope_code(&value).unwrap_or(SUCCESS_CODE);
    if code == SUCCESS_CODE {
        return Outcome::Success(extract_payload(value));
    }
    if code == UNAUTHORIZED_CODE {
        return Outcome::Unauthorized;
    }

    let message = envelope_message(&value)
        .or_else(|| {
            u16::try_from(code)
                .ok()
                .and_then(status_message)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
    Outcome::Business { code, message }
}

/// Read the `code` field, accepting both numeric and stringified forms.
fn envelope_code(value: &Value) -> Option<i64> {
    match value.get("code") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn envelope_message(value: &Value) -> Option<String> {
    value
        .get("msg")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One named payload extraction strategy. Returns `None` when the shape this
/// probe understands is absent, letting the next probe try.
type PayloadProbe = fn(&Map<String, Value>) -> Option<Value>;

/// Probes tried in priority order; the order is a stable contract.
const PAYLOAD_PROBES: &[PayloadProbe] = &[probe_result, probe_data, probe_rows];

/// Legacy alternate payload key used by older endpoints.
fn probe_result(envelope: &Map<String, Value>) -> Option<Value> {
    envelope.get("result").cloned()
}

fn probe_data(envelope: &Map<String, Value>) -> Option<Value> {
    envelope.get("data").cloned()
}

/// Pagination shape: `rows` plus `total` travel together.
fn probe_rows(envelope: &Map<String, Value>) -> Option<Value> {
    let rows = envelope.get("rows")?;
    let mut page = Map::new();
    page.insert("rows".to_string(), rows.clone());
    if let Some(total) = envelope.get("total") {
        page.insert("total".to_string(), total.clone());
    }
    Some(Value::Object(page))
}

/// Resolve the success payload from the envelope.
fn extract_payload(value: Value) -> Value {
    let Value::Object(mut envelope) = value else {
        // Non-object success bodies (arrays, scalars) pass through as-is.
        return value;
    };
    for probe in PAYLOAD_PROBES {
        if let Some(payload) = probe(&envelope) {
            return payload;
        }
    }
    // No recognized payload key: the envelope itself, minus bookkeeping.
    envelope.remove("code");
    envelope.remove("msg");
    Value::Object(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpret_json(body: Value) -> Outcome {
        interpret(
            200,
            Some("application/json"),
            ResponseKind::Json,
            Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
    }

    #[test]
    fn code_200_with_data_resolves_to_data() {
        match interpret_json(json!({"code": 200, "data": {"x": 1}})) {
            Outcome::Success(v) => assert_eq!(v, json!({"x": 1})),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn stringified_code_is_accepted() {
        match interpret_json(json!({"code": "200", "data": [1, 2]})) {
            Outcome::Success(v) => assert_eq!(v, json!([1, 2])),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn result_takes_priority_over_data() {
        match interpret_json(json!({"code": 200, "result": "r", "data": "d"})) {
            Outcome::Success(v) => assert_eq!(v, json!("r")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rows_shape_keeps_rows_and_total() {
        match interpret_json(json!({"code": 200, "rows": [1, 2], "total": 2})) {
            Outcome::Success(v) => assert_eq!(v, json!({"rows": [1, 2], "total": 2})),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn bare_envelope_resolves_to_empty_object() {
        match interpret_json(json!({"code": 200})) {
            Outcome::Success(v) => assert_eq!(v, json!({})),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn missing_code_counts_as_success() {
        match interpret_json(json!({"items": [3]})) {
            Outcome::Success(v) => assert_eq!(v, json!({"items": [3]})),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn code_401_is_unauthorized() {
        assert!(matches!(
            interpret_json(json!({"code": 401, "msg": "expired"})),
            Outcome::Unauthorized
        ));
    }

    #[test]
    fn business_error_prefers_backend_message() {
        match interpret_json(json!({"code": 500, "msg": "quota exceeded"})) {
            Outcome::Business { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn business_error_falls_back_to_status_table_then_default() {
        match interpret_json(json!({"code": 503, "msg": ""})) {
            Outcome::Business { message, .. } => assert_eq!(message, "service unavailable"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match interpret_json(json!({"code": 7777})) {
            Outcome::Business { message, .. } => {
                assert_eq!(message, DEFAULT_ERROR_MESSAGE)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn transport_gate_runs_first() {
        match interpret(502, None, ResponseKind::Json, Bytes::new()) {
            Outcome::Transport { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn binary_short_circuits_envelope_rules() {
        let body = Bytes::from_static(b"\x00\x01not json");
        match interpret(
            200,
            Some("application/octet-stream"),
            ResponseKind::Json,
            body.clone(),
        ) {
            Outcome::Binary(b) => assert_eq!(b, body),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Caller-requested binary wins even for a JSON content type.
        match interpret(200, Some("application/json"), ResponseKind::Binary, body.clone()) {
            Outcome::Binary(b) => assert_eq!(b, body),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn garbage_body_becomes_empty_object() {
        match interpret(200, None, ResponseKind::Json, Bytes::from_static(b"<html>")) {
            Outcome::Success(v) => assert_eq!(v, json!({})),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
