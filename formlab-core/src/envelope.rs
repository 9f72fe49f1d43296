//! Conventional `{code, msg, data}` response envelope.

use crate::error::{FormlabError, FormlabResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope codes that signal success.
pub const SUCCESS_CODES: [i64; 2] = [0, 200];

/// Fallback text when a failure envelope carries no message.
pub const DEFAULT_BUSINESS_MESSAGE: &str = "System error";

/// Response envelope returned by every conventional REST endpoint.
///
/// Some services name the text `message` instead of `msg`; both keys are
/// accepted, and `msg` wins when a body carries both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            code: 0,
            msg: Some(String::new()),
            message: None,
            data,
        }
    }

    pub fn failure(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            message: None,
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        SUCCESS_CODES.contains(&self.code)
    }

    /// Server text, `msg` first, blank values skipped.
    pub fn text(&self) -> Option<&str> {
        [self.msg.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
    }

    /// Unwrap `data` on success, otherwise fail with the server message.
    pub fn into_data<T: DeserializeOwned>(self) -> FormlabResult<T> {
        if !self.is_success() {
            let message = self
                .text()
                .unwrap_or(DEFAULT_BUSINESS_MESSAGE)
                .to_string();
            return Err(FormlabError::Business {
                code: self.code,
                message,
            });
        }
        Ok(serde_json::from_value(self.data)?)
    }
}

/// Pull a human-readable message out of an error body.
///
/// FastAPI-style bodies carry `detail` (string or list of validation
/// entries); envelope bodies carry `msg` or `message`.
pub fn extract_error_message(body: &Value) -> Option<String> {
    if let Some(detail) = body.get("detail") {
        match detail {
            Value::String(text) if !text.trim().is_empty() => return Some(text.clone()),
            Value::Array(entries) => {
                let joined = entries
                    .iter()
                    .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
    }
    ["msg", "message"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_unwraps_data() {
        let envelope: Envelope =
            serde_json::from_value(json!({"code": 0, "msg": "", "data": {"x": 1}})).unwrap();
        let data: Value = envelope.into_data().unwrap();
        assert_eq!(data, json!({"x": 1}));
    }

    #[test]
    fn test_code_200_is_success() {
        let envelope: Envelope =
            serde_json::from_value(json!({"code": 200, "msg": "ok", "data": [1, 2]})).unwrap();
        let data: Vec<i32> = envelope.into_data().unwrap();
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn test_failure_envelope_rejects_with_message() {
        let envelope: Envelope =
            serde_json::from_value(json!({"code": 400, "msg": "bad"})).unwrap();
        let err = envelope.into_data::<Value>().unwrap_err();
        assert_eq!(
            err,
            FormlabError::Business {
                code: 400,
                message: "bad".to_string()
            }
        );
    }

    #[test]
    fn test_failure_without_message_uses_default() {
        let envelope: Envelope = serde_json::from_value(json!({"code": 1})).unwrap();
        let err = envelope.into_data::<Value>().unwrap_err();
        assert_eq!(err.to_string(), DEFAULT_BUSINESS_MESSAGE);
    }

    #[test]
    fn test_message_alias_accepted() {
        let envelope: Envelope =
            serde_json::from_value(json!({"code": 7, "message": "quota"})).unwrap();
        assert_eq!(envelope.text(), Some("quota"));
    }

    #[test]
    fn test_body_with_msg_and_message_parses() {
        let envelope: Envelope = serde_json::from_value(
            json!({"code": 7, "msg": "quota exceeded", "message": "ignored"}),
        )
        .unwrap();
        assert_eq!(envelope.text(), Some("quota exceeded"));

        let blank_msg: Envelope =
            serde_json::from_value(json!({"code": 7, "msg": "", "message": "fallback"})).unwrap();
        let err = blank_msg.into_data::<Value>().unwrap_err();
        assert_eq!(err.to_string(), "fallback");
    }

    #[test]
    fn test_extract_error_message_variants() {
        assert_eq!(
            extract_error_message(&json!({"detail": "Incorrect password"})).as_deref(),
            Some("Incorrect password")
        );
        assert_eq!(
            extract_error_message(&json!({"detail": [{"msg": "a"}, {"msg": "b"}]})).as_deref(),
            Some("a; b")
        );
        assert_eq!(
            extract_error_message(&json!({"code": 500, "msg": "boom"})).as_deref(),
            Some("boom")
        );
        assert_eq!(extract_error_message(&json!({"other": 1})), None);
    }
}
