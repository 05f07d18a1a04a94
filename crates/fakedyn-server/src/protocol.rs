//! Wire protocol: JSON-over-newlines request/response types.
//!
//! Each request is a single JSON line naming an operation and carrying its
//! payload; each response is a single JSON line with a status code and the
//! operation's response or error body.

use fakedyn_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Pseudo-operation that clears every table and the persistence log.
pub const RESET_OPERATION: &str = "reset";

/// A request from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub operation: String,
    #[serde(default)]
    pub payload: Value,
}

/// A response to one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Response { status: 200, body }
    }

    pub fn error(err: &Error) -> Self {
        Response {
            status: err.status_code(),
            body: err.to_response(),
        }
    }

    /// A request line that was not valid JSON or lacked an operation.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Response {
            status: 400,
            body: json!({
                "__type": "com.amazon.coral.service#SerializationException",
                "message": message.into(),
            }),
        }
    }

    /// The server could not run the request at all.
    pub fn internal_failure(message: impl Into<String>) -> Self {
        Response {
            status: 500,
            body: json!({
                "__type": "com.amazonaws.dynamodb.v20120810#InternalFailure",
                "message": message.into(),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_payload_defaults_to_null() {
        let req: Request = serde_json::from_str(r#"{"operation":"ListTables"}"#).unwrap();
        assert_eq!(req.operation, "ListTables");
        assert!(req.payload.is_null());
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(&Error::table_not_found("users"));
        assert_eq!(resp.status, 404);
        assert_eq!(
            resp.body["__type"],
            "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException"
        );
        assert!(!resp.is_ok());
    }
}
