//! Shared-secret authentication guard.
//!
//! Every inbound request (primary or discovery) carries an `Authorization`
//! header inside its envelope. The guard checks it against the server's
//! configured secret; it holds no state of its own.

use serde_json::{Map, Value};

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // XOR each byte and accumulate; any difference makes result non-zero.
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// True iff `headers` carries an `Authorization` string equal to `secret`.
///
/// A missing header, a non-string value, or a mismatch all fail the same way;
/// the caller answers 403 and keeps the connection open.
pub fn authenticate(headers: &Map<String, Value>, secret: &str) -> bool {
    headers
        .get("Authorization")
        .and_then(Value::as_str)
        .is_some_and(|token| safe_equal(token, secret))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn headers(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!("test headers must be an object"),
        }
    }

    #[test]
    fn accepts_matching_token() {
        assert!(authenticate(
            &headers(json!({"Authorization": "s3cr3t"})),
            "s3cr3t"
        ));
    }

    #[test]
    fn rejects_wrong_token() {
        assert!(!authenticate(
            &headers(json!({"Authorization": "wrong"})),
            "s3cr3t"
        ));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(!authenticate(&headers(json!({})), "s3cr3t"));
        assert!(!authenticate(
            &headers(json!({"authorization": "s3cr3t"})),
            "s3cr3t"
        ));
    }

    #[test]
    fn rejects_non_string_header() {
        assert!(!authenticate(
            &headers(json!({"Authorization": 42})),
            "s3cr3t"
        ));
    }

    #[test]
    fn safe_equal_handles_length_mismatch() {
        assert!(!safe_equal("abc", "abcd"));
        assert!(safe_equal("", ""));
    }
}
