//! JSON-RPC error payloads.
//!
//! Dispatch failures cross the wire as an `ErrorData` with a standard
//! JSON-RPC code, a human-readable message, and the structured failure kind
//! preserved under `data.kind` so callers can branch without parsing text.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorData {
    // JSON-RPC 2.0 standard error codes.
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach the structured failure kind under `data.kind`.
    pub fn with_kind(mut self, kind: &str) -> Self {
        self.data = Some(json!({ "kind": kind }));
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorData {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_lands_in_data() {
        let error = ErrorData::invalid_params("missing argument `prompt`")
            .with_kind("invalid_argument");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], -32602);
        assert_eq!(json["data"]["kind"], "invalid_argument");
    }

    #[test]
    fn data_omitted_when_absent() {
        let json = serde_json::to_value(ErrorData::method_not_found("tools/frob")).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["message"], "Method not found: tools/frob");
    }
}
