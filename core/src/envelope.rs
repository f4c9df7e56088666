//! Backend response envelope: `{ code, message, data? }`.
//!
//! # Design
//! Decoding happens in two steps. The body is first read into an untyped
//! `Envelope` so the success check can run without knowing the caller's
//! payload type; only after both the business code and the HTTP status pass
//! is `data` converted into `T`. A body that is not a JSON envelope is
//! replaced by a synthetic one whose `code` is the HTTP status, so the same
//! check still produces a consistent error. JSON that is not a well-formed
//! envelope (wrong field types, arrays, scalars) is never replaced: its
//! `code` reads as missing and the check rejects it.
//!
//! `data` distinguishes "absent" from "null". An explicit `null` is handed to
//! the caller's type as-is; an absent field falls back to decoding the whole
//! envelope, which suits endpoints that only reply with a message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::HttpError;

/// Business code that marks success.
pub const SUCCESS_CODE: i64 = 200;

/// Typed view of a successful envelope, for callers that want to see
/// whether `data` was present instead of relying on the unwrap fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Untyped envelope as decoded from the wire.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub code: Option<i64>,
    pub message: Option<String>,
    /// `None` when the field is absent, `Some(Value::Null)` for `null`.
    pub data: Option<Value>,
    raw: Value,
}

/// Message used for the synthetic envelope.
pub fn fallback_message(status: u16) -> String {
    format!("request failed: {status}")
}

impl Envelope {
    /// Decode `body`. Only a body that is not JSON at all gets the synthetic
    /// envelope; any JSON value is read field by field, and a `code` that is
    /// absent or not an integer leaves `code` as `None`.
    pub fn decode(status: u16, body: &[u8]) -> Self {
        let Ok(raw) = serde_json::from_slice::<Value>(body) else {
            return Self::fallback(status);
        };
        Envelope {
            code: raw.get("code").and_then(Value::as_i64),
            message: raw.get("message").and_then(Value::as_str).map(str::to_string),
            data: raw.get("data").cloned(),
            raw,
        }
    }

    fn fallback(status: u16) -> Self {
        let message = fallback_message(status);
        Envelope {
            code: Some(i64::from(status)),
            raw: json!({ "code": status, "message": message }),
            message: Some(message),
            data: None,
        }
    }

    /// Both layers must pass: business code 200 and a 2xx HTTP status.
    pub fn check(&self, status: u16) -> Result<(), HttpError> {
        let business_ok = self.code == Some(SUCCESS_CODE);
        let http_ok = (200..300).contains(&status);
        if business_ok && http_ok {
            return Ok(());
        }

        let message = match self.message.as_deref() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ if !business_ok => match self.code {
                Some(code) => format!("request failed: {code}"),
                None => "request failed: missing business code".to_string(),
            },
            _ => format!("HTTP error: {status}"),
        };

        Err(HttpError::rejected(
            message,
            status,
            self.code,
            self.data.clone().filter(|d| !d.is_null()),
        ))
    }

    /// Convert the payload into `T`.
    ///
    /// Present `data` (even `null`) decodes directly. Absent `data` decodes
    /// the whole envelope, then `null` as a last resort so unit-like targets
    /// such as `()` still succeed.
    pub fn unwrap<T: DeserializeOwned>(self, status: u16) -> Result<T, HttpError> {
        match self.data {
            Some(data) => serde_json::from_value(data)
                .map_err(|e| HttpError::decode(format!("unexpected response data: {e}"), status)),
            None => {
                tracing::debug!("envelope has no data field; decoding the envelope itself");
                serde_json::from_value(self.raw)
                    .or_else(|_| serde_json::from_value(Value::Null))
                    .map_err(|e| {
                        HttpError::decode(format!("unexpected response envelope: {e}"), status)
                    })
            }
        }
    }

    /// Typed envelope; `data` stays `None` when it was absent or `null`.
    pub fn into_response<T: DeserializeOwned>(self, status: u16) -> Result<ApiResponse<T>, HttpError> {
        let data = match self.data {
            Some(Value::Null) | None => None,
            Some(data) => Some(serde_json::from_value(data).map_err(|e| {
                HttpError::decode(format!("unexpected response data: {e}"), status)
            })?),
        };
        Ok(ApiResponse {
            code: self.code.unwrap_or(i64::from(status)),
            message: self.message.unwrap_or_default(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: i32,
    }

    #[test]
    fn success_unwraps_data() {
        let env = Envelope::decode(200, br#"{"code":200,"message":"ok","data":{"x":1}}"#);
        env.check(200).unwrap();
        let p: Point = env.unwrap(200).unwrap();
        assert_eq!(p, Point { x: 1 });
    }

    #[test]
    fn business_failure_on_http_200() {
        let env = Envelope::decode(200, br#"{"code":500,"message":"bad"}"#);
        let err = env.check(200).unwrap_err();
        assert_eq!(err.message, "bad");
        assert_eq!(err.code, Some(500));
        assert_eq!(err.status, 200);
        assert_eq!(err.kind, ErrorKind::Business);
    }

    #[test]
    fn http_failure_with_success_code() {
        let env = Envelope::decode(503, br#"{"code":200,"message":""}"#);
        let err = env.check(503).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HttpStatus);
        assert_eq!(err.message, "HTTP error: 503");
    }

    #[test]
    fn error_payload_is_echoed() {
        let env = Envelope::decode(
            400,
            br#"{"code":400,"message":"invalid","data":{"field":"appName"}}"#,
        );
        let err = env.check(400).unwrap_err();
        assert_eq!(err.data, Some(json!({"field": "appName"})));
    }

    #[test]
    fn non_json_body_gets_synthetic_envelope() {
        let env = Envelope::decode(502, b"<html>Bad Gateway</html>");
        assert_eq!(env.code, Some(502));
        let err = env.check(502).unwrap_err();
        assert_eq!(err.message, "request failed: 502");
        assert_eq!(err.code, Some(502));
        assert_eq!(err.status, 502);
    }

    #[test]
    fn non_json_body_on_200_still_succeeds_check() {
        // Synthetic code mirrors the HTTP status.
        let env = Envelope::decode(200, b"plain text");
        assert!(env.check(200).is_ok());
    }

    #[test]
    fn missing_code_is_a_business_failure() {
        let env = Envelope::decode(200, br#"{"message":"weird"}"#);
        let err = env.check(200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Business);
        assert_eq!(err.code, None);
        assert_eq!(err.message, "weird");
    }

    #[test]
    fn string_code_is_not_success() {
        let env = Envelope::decode(200, br#"{"code":"500","message":"bad"}"#);
        assert_eq!(env.code, None);
        let err = env.check(200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Business);
        assert_eq!(err.message, "bad");
    }

    #[test]
    fn non_string_message_is_ignored() {
        for body in [
            &br#"{"code":500,"message":{"detail":"bad"}}"#[..],
            &br#"{"code":500,"message":42}"#[..],
        ] {
            let env = Envelope::decode(200, body);
            assert_eq!(env.message, None);
            let err = env.check(200).unwrap_err();
            assert_eq!(err.code, Some(500));
            assert_eq!(err.message, "request failed: 500");
        }
    }

    #[test]
    fn json_that_is_not_an_object_is_rejected() {
        for body in [&b"[200]"[..], &b"200"[..], &b"null"[..], &br#""ok""#[..]] {
            let env = Envelope::decode(200, body);
            assert_eq!(env.code, None);
            let err = env.check(200).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Business);
            assert_eq!(err.message, "request failed: missing business code");
        }
    }

    #[test]
    fn absent_data_returns_whole_envelope() {
        let env = Envelope::decode(200, br#"{"code":200,"message":"deleted"}"#);
        let whole: ApiResponse<Value> = env.unwrap(200).unwrap();
        assert_eq!(whole.message, "deleted");
        assert_eq!(whole.code, 200);
    }

    #[test]
    fn absent_data_into_unit() {
        let env = Envelope::decode(200, br#"{"code":200,"message":"deleted"}"#);
        let _: () = env.unwrap(200).unwrap();
    }

    #[test]
    fn explicit_null_data_is_passed_through() {
        let env = Envelope::decode(200, br#"{"code":200,"message":"ok","data":null}"#);
        let v: Option<Point> = env.unwrap(200).unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn mismatched_data_is_a_decode_error() {
        let env = Envelope::decode(200, br#"{"code":200,"message":"ok","data":"nope"}"#);
        let err = env.unwrap::<Point>(200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
        assert_eq!(err.status, 200);
    }

    #[test]
    fn typed_response_reports_missing_data() {
        let env = Envelope::decode(200, br#"{"code":200,"message":"done"}"#);
        let resp: ApiResponse<Point> = env.into_response(200).unwrap();
        assert_eq!(resp.message, "done");
        assert!(resp.data.is_none());
    }
}
