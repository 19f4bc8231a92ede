//! Normalised response envelope.

use crate::Result;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    /// JSON when the content type says so and the bytes parse; text otherwise.
    pub(crate) fn from_bytes(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return ResponseBody::Empty;
        }
        if content_type.is_some_and(is_json_content_type) {
            if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                return ResponseBody::Json(value);
            }
        }
        ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Best-effort parse for error bodies: JSON whenever the bytes parse as JSON.
    pub(crate) fn best_effort(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return ResponseBody::Empty;
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("application/json")
}

/// Result of a successful (2xx) call. Only the dispatcher creates these.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    status: u16,
    headers: HeaderMap,
    body: ResponseBody,
}

impl ResponseEnvelope {
    pub(crate) fn new(status: u16, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Deserialize a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Json(v) => Ok(T::deserialize(v)?),
            ResponseBody::Text(t) => Ok(serde_json::from_str(t)?),
            ResponseBody::Empty => Ok(serde_json::from_value(Value::Null)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_content_type_yields_parsed_body() {
        let body = ResponseBody::from_bytes(Some("application/json; charset=utf-8"), br#"{"a":1}"#);
        assert_eq!(body, ResponseBody::Json(json!({"a": 1})));
    }

    #[test]
    fn other_content_types_stay_text() {
        let body = ResponseBody::from_bytes(Some("text/plain"), br#"{"a":1}"#);
        assert_eq!(body, ResponseBody::Text(r#"{"a":1}"#.to_string()));
        assert_eq!(ResponseBody::from_bytes(None, b"hi"), ResponseBody::Text("hi".into()));
    }

    #[test]
    fn unparsable_json_falls_back_to_text() {
        let body = ResponseBody::from_bytes(Some("application/json"), b"not json");
        assert_eq!(body, ResponseBody::Text("not json".into()));
        assert!(ResponseBody::from_bytes(Some("application/json"), b"").is_empty());
    }

    #[test]
    fn envelope_deserializes_typed_json() {
        #[derive(serde::Deserialize)]
        struct Session {
            session_id: String,
        }
        let env = ResponseEnvelope::new(
            201,
            HeaderMap::new(),
            ResponseBody::Json(json!({"session_id": "abc"})),
        );
        let s: Session = env.json().unwrap();
        assert_eq!(s.session_id, "abc");
        assert_eq!(env.status(), 201);
    }
}
