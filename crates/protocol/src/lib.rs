//! Wire protocol for the tether IPC layer: request/response envelopes, status
//! codes, and the codec used by both listeners.
//!
//! A client speaks JSON over a persistent WebSocket. Each inbound frame is one
//! request envelope; each outbound frame is one response envelope. The server
//! crate owns routing and auth — this crate only knows the shapes.

use {
    serde::Deserialize,
    serde_json::{Map, Value, json},
    thiserror::Error,
};

// ── Status codes ─────────────────────────────────────────────────────────────

pub mod codes {
    /// Success (also the default when a handler omits `code`).
    pub const OK: u16 = 200;
    /// Missing or unregistered endpoint.
    pub const UNKNOWN_ENDPOINT: u16 = 400;
    /// Authentication failure.
    pub const UNAUTHORIZED: u16 = 403;
    /// Handler failure or untransmissible payload.
    pub const INTERNAL: u16 = 500;
}

// ── Canonical message strings ────────────────────────────────────────────────

pub mod messages {
    /// Body of every 403 on the primary listener.
    pub const UNAUTHORIZED: &str = "unauthorized request: invalid or missing token";
    /// Body of every 400.
    pub const UNKNOWN_ENDPOINT: &str = "invalid request: unknown or missing endpoint";
    /// Fallback body when a handler's payload cannot be shaped into a response.
    pub const UNTRANSMISSIBLE: &str =
        "endpoint returned a payload that cannot be sent over the socket; \
         return a plain JSON object";
    /// Body of a failed discovery probe.
    pub const DISCOVERY_DENIED: &str = "invalid or missing token";
    /// Fixed success message of the discovery listener.
    pub const CONNECTION_SUCCESS: &str = "Connection success";
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Codec failures. `Malformed` is fatal to the connection that produced it;
/// the other two surface as the untransmissible-payload path.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("response payload is not a JSON object")]
    NotAnObject,
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

// ── Request envelope ─────────────────────────────────────────────────────────

/// One inbound request frame.
///
/// Decoding is deliberately lax: a missing `endpoint` or `headers` still
/// decodes, so the server can answer with a structured 400/403 instead of
/// dropping the connection. Only a frame that is not a JSON object at all is
/// a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestEnvelope {
    pub endpoint: Option<String>,
    pub data: Map<String, Value>,
    pub headers: Map<String, Value>,
}

/// Decode one frame into the raw JSON value plus the typed envelope.
///
/// The raw value is kept because handlers get access to the full envelope
/// through [`RequestView`], not just the projected fields.
pub fn decode_request(frame: &[u8]) -> Result<(Value, RequestEnvelope), ProtocolError> {
    let raw: Value = serde_json::from_slice(frame).map_err(ProtocolError::Malformed)?;
    let envelope: RequestEnvelope =
        serde_json::from_value(raw.clone()).map_err(ProtocolError::Malformed)?;
    Ok((raw, envelope))
}

// ── Request view ─────────────────────────────────────────────────────────────

/// What a handler sees: the endpoint name, the payload map accessed by key,
/// and the full raw envelope for anything else.
#[derive(Debug, Clone)]
pub struct RequestView {
    endpoint: String,
    raw: Value,
    data: Map<String, Value>,
}

impl RequestView {
    pub fn new(endpoint: impl Into<String>, raw: Value, data: Map<String, Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            raw,
            data,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Look up one payload key from the request's `data` map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// The full envelope as received, including `headers`.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

// ── Response shaping ─────────────────────────────────────────────────────────

/// Build a failure response body.
pub fn error_body(code: u16, message: impl Into<String>) -> Value {
    json!({ "error": message.into(), "code": code })
}

/// Shape a handler payload into the final response frame.
///
/// The payload must be a JSON object so `code` has somewhere to live; when the
/// `code` key is absent it defaults to 200. A present key is kept as-is,
/// whatever its value — a handler deliberately returning `"code": 0` is not
/// second-guessed.
pub fn finalize_response(payload: Value) -> Result<String, ProtocolError> {
    let Value::Object(mut body) = payload else {
        return Err(ProtocolError::NotAnObject);
    };
    if !body.contains_key("code") {
        body.insert("code".into(), json!(codes::OK));
    }
    serde_json::to_string(&Value::Object(body)).map_err(ProtocolError::Encode)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_full_envelope() {
        let frame = br#"{"endpoint":"ping","data":{"x":1},"headers":{"Authorization":"s"}}"#;
        let (raw, env) = decode_request(frame).unwrap();
        assert_eq!(env.endpoint.as_deref(), Some("ping"));
        assert_eq!(env.data.get("x"), Some(&json!(1)));
        assert_eq!(env.headers.get("Authorization"), Some(&json!("s")));
        assert_eq!(raw["endpoint"], json!("ping"));
    }

    #[test]
    fn decode_is_lax_about_missing_fields() {
        let (_, env) = decode_request(b"{}").unwrap();
        assert!(env.endpoint.is_none());
        assert!(env.data.is_empty());
        assert!(env.headers.is_empty());
    }

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(matches!(
            decode_request(b"{not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn decode_rejects_non_object_frame() {
        assert!(matches!(
            decode_request(b"[1,2,3]"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn finalize_defaults_missing_code_to_200() {
        let out = finalize_response(json!({"pong": true})).unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["pong"], json!(true));
        assert_eq!(v["code"], json!(200));
    }

    #[test]
    fn finalize_keeps_existing_code() {
        let out = finalize_response(json!({"code": 418})).unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["code"], json!(418));
    }

    #[test]
    fn finalize_keeps_deliberate_zero_code() {
        // A present key is never overwritten, even when falsy.
        let out = finalize_response(json!({"code": 0})).unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["code"], json!(0));
    }

    #[test]
    fn finalize_rejects_non_object_payload() {
        assert!(matches!(
            finalize_response(json!([1, 2])),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            finalize_response(json!("bare string")),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn error_body_shape() {
        let v = error_body(codes::UNAUTHORIZED, messages::UNAUTHORIZED);
        assert_eq!(v["code"], json!(403));
        assert_eq!(v["error"], json!(messages::UNAUTHORIZED));
    }

    #[test]
    fn request_view_accesses_payload_by_key() {
        let (raw, env) =
            decode_request(br#"{"endpoint":"sum","data":{"a":2,"b":3},"headers":{}}"#).unwrap();
        let view = RequestView::new(env.endpoint.unwrap(), raw, env.data);
        assert_eq!(view.endpoint(), "sum");
        assert_eq!(view.get("a"), Some(&json!(2)));
        assert_eq!(view.get("missing"), None);
        assert_eq!(view.raw()["headers"], json!({}));
    }
}
