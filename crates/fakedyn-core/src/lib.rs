//! # fakedyn
//!
//! An in-memory, DynamoDB-compatible table engine with an append-only
//! persistence log.
//!
//! Operations are addressed by their DynamoDB name and take the same JSON
//! payloads the hosted service accepts (`CreateTable`, `PutItem`, `Query`,
//! `BatchWriteItem`, ...). Responses and errors use the service's JSON shapes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fakedyn_core::{Engine, EngineConfig};
//! use serde_json::json;
//!
//! let engine = Engine::open(EngineConfig::with_log("fakedyn.log")).unwrap();
//!
//! engine.process("CreateTable", json!({
//!     "TableName": "users",
//!     "AttributeDefinitions": [{"AttributeName": "user_id", "AttributeType": "S"}],
//!     "KeySchema": [{"AttributeName": "user_id", "KeyType": "HASH"}],
//!     "ProvisionedThroughput": {"ReadCapacityUnits": 5, "WriteCapacityUnits": 5}
//! })).unwrap();
//!
//! engine.process("PutItem", json!({
//!     "TableName": "users",
//!     "Item": {"user_id": {"S": "alice"}, "age": {"N": "30"}}
//! })).unwrap();
//!
//! let resp = engine.process("GetItem", json!({
//!     "TableName": "users",
//!     "Key": {"user_id": {"S": "alice"}}
//! })).unwrap();
//! assert_eq!(resp["Item"]["age"]["N"], "30");
//! ```

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod item;
pub mod key;
pub mod request;
pub mod sack;
pub mod storage;
pub mod table;
pub mod throughput;
pub mod types;
pub mod value;

pub use config::{EngineConfig, LogConfig, SyncMode};
pub use database::{Database, Operation};
pub use engine::Engine;
pub use error::{Error, Result, StorageError};
