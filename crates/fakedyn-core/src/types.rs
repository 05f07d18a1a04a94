//! Core types: service limits and the small enums shared by requests,
//! tables, and indexes.

use serde::{Deserialize, Serialize};

/// Maximum encoded item size in bytes (400KB, matching DynamoDB).
pub const MAX_ITEM_SIZE: usize = 400 * 1024;

/// Byte budget of a single Query/Scan page or BatchGetItem response.
pub const DEFAULT_RESPONSE_SIZE_LIMIT: usize = 1024 * 1024;

/// Maximum serialized size of a single request payload.
pub const DEFAULT_REQUEST_SIZE_LIMIT: usize = 1024 * 1024;

/// Maximum number of put/delete requests in one BatchWriteItem call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Maximum number of keys in one BatchGetItem call.
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Maximum number of significant decimal digits in a number.
pub const MAX_NUMBER_PRECISION: usize = 38;

/// Maximum number of local or global secondary indexes per table.
pub const MAX_SECONDARY_INDEXES: usize = 5;

/// Default and maximum page size for ListTables.
pub const MAX_LIST_TABLES_LIMIT: usize = 100;

/// The declared type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    S,
    N,
    B,
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::S => "S",
            ScalarType::N => "N",
            ScalarType::B => "B",
        }
    }
}

/// Role of an attribute in a key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Creating,
    Updating,
    Deleting,
    Active,
}

impl TableStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TableStatus::Creating => "CREATING",
            TableStatus::Updating => "UPDATING",
            TableStatus::Deleting => "DELETING",
            TableStatus::Active => "ACTIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionType {
    All,
    KeysOnly,
    Include,
}

impl ProjectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectionType::All => "ALL",
            ProjectionType::KeysOnly => "KEYS_ONLY",
            ProjectionType::Include => "INCLUDE",
        }
    }
}

/// Which attributes a write returns in its `Attributes` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    UpdatedOld,
    AllNew,
    UpdatedNew,
}

/// Which attributes a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Select {
    AllAttributes,
    AllProjectedAttributes,
    SpecificAttributes,
    Count,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnConsumedCapacity {
    Indexes,
    Total,
    #[default]
    None,
}

impl ReturnConsumedCapacity {
    pub fn is_requested(self) -> bool {
        !matches!(self, ReturnConsumedCapacity::None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnItemCollectionMetrics {
    Size,
    #[default]
    None,
}
