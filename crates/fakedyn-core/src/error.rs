//! Error types for all fakedyn operations.
//!
//! Every error maps onto one of the wire-level exception kinds and renders as
//! `{"__type": "<namespace>#<Kind>", "message": "<description>: <detail>"}`.

use std::io;

use serde_json::{Value, json};
use thiserror::Error;

const NS_VALIDATE: &str = "com.amazon.coral.validate";
const NS_SERVICE: &str = "com.amazon.coral.service";
const NS_DYNAMODB: &str = "com.amazonaws.dynamodb.v20120810";

/// Top-level error type for fakedyn operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error detected: {0}")]
    Validation(String),

    #[error("Requested resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Attempt to change a resource which is still in use: {0}")]
    ResourceInUse(String),

    #[error("The conditional request failed")]
    ConditionalCheckFailed,

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("log file is locked by another process")]
    FileLocked,

    #[error("corrupt log record at byte {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("a failed log append could not be rolled back; writes are disabled")]
    ReadOnly,
}

impl Error {
    pub fn validation(detail: impl Into<String>) -> Self {
        Error::Validation(detail.into())
    }

    pub fn table_not_found(table: &str) -> Self {
        Error::ResourceNotFound(format!("Table: {table} not found"))
    }

    /// The exception name used in the `__type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationException",
            Error::ResourceNotFound(_) => "ResourceNotFoundException",
            Error::ResourceInUse(_) => "ResourceInUseException",
            Error::ConditionalCheckFailed => "ConditionalCheckFailedException",
            Error::UnknownOperation(_) => "UnknownOperationException",
            Error::Storage(_) => "InternalFailure",
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            Error::Validation(_) => NS_VALIDATE,
            Error::UnknownOperation(_) => NS_SERVICE,
            _ => NS_DYNAMODB,
        }
    }

    /// Transport status class: client errors, missing resources, conflicts,
    /// and internal failures.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::UnknownOperation(_) => 400,
            Error::ResourceNotFound(_) => 404,
            Error::ResourceInUse(_) | Error::ConditionalCheckFailed => 409,
            Error::Storage(_) => 500,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Render the error body clients receive.
    pub fn to_response(&self) -> Value {
        json!({
            "__type": format!("{}#{}", self.namespace(), self.kind()),
            "message": self.to_string(),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
