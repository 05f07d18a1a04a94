//! Request payload shapes for every operation.
//!
//! Payloads are decoded with serde; missing required members, wrong JSON
//! types, and unknown enum values surface as `ValidationException`s through
//! the `From<serde_json::Error>` conversion on [`Error`](crate::error::Error).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::filter::{ComparisonOperator, ConditionalOperator};
use crate::types::{
    KeyType, ProjectionType, ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValues,
    ScalarType, Select,
};
use crate::value::{WireMap, WireValue};

/// Decode an operation payload.
pub fn parse<T: DeserializeOwned>(payload: Value) -> Result<T> {
    Ok(serde_json::from_value(payload)?)
}

// ---------------------------------------------------------------------------
// Table management
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: ScalarType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionedThroughput {
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_type: Option<ProjectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_key_attributes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocalSecondaryIndexSpec {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub projection: ProjectionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalSecondaryIndexSpec {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub projection: ProjectionSpec,
    pub provisioned_throughput: ProvisionedThroughput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTableRequest {
    pub table_name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_secondary_indexes: Option<Vec<LocalSecondaryIndexSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_secondary_indexes: Option<Vec<GlobalSecondaryIndexSpec>>,
    pub provisioned_throughput: ProvisionedThroughput,
}

/// Payload of DescribeTable and DeleteTable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableNameRequest {
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalSecondaryIndexUpdate {
    #[serde(default)]
    pub update: Option<UpdateGlobalSecondaryIndexAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateGlobalSecondaryIndexAction {
    pub index_name: String,
    pub provisioned_throughput: ProvisionedThroughput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateTableRequest {
    pub table_name: String,
    #[serde(default)]
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    #[serde(default)]
    pub global_secondary_index_updates: Option<Vec<GlobalSecondaryIndexUpdate>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListTablesRequest {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub exclusive_start_table_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Item operations
// ---------------------------------------------------------------------------

/// One entry of an `Expected` clause.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpectedAttributeValue {
    #[serde(default)]
    pub value: Option<WireValue>,
    #[serde(default)]
    pub exists: Option<bool>,
}

pub type Expected = BTreeMap<String, ExpectedAttributeValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutItemRequest {
    pub table_name: String,
    pub item: WireMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expected>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_values: Option<ReturnValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemRequest {
    pub table_name: String,
    pub key: WireMap,
    #[serde(default)]
    pub attributes_to_get: Option<Vec<String>>,
    #[serde(default)]
    pub consistent_read: Option<bool>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteItemRequest {
    pub table_name: String,
    pub key: WireMap,
    #[serde(default)]
    pub expected: Option<Expected>,
    #[serde(default)]
    pub return_values: Option<ReturnValues>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    #[serde(default)]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

/// One entry of `AttributeUpdates`. The action stays a string so an unknown
/// action can be reported together with the attribute it was given for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeValueUpdate {
    #[serde(default)]
    pub value: Option<WireValue>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItemRequest {
    pub table_name: String,
    pub key: WireMap,
    #[serde(default)]
    pub attribute_updates: Option<BTreeMap<String, AttributeValueUpdate>>,
    #[serde(default)]
    pub expected: Option<Expected>,
    #[serde(default)]
    pub return_values: Option<ReturnValues>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    #[serde(default)]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

// ---------------------------------------------------------------------------
// Query and scan
// ---------------------------------------------------------------------------

/// A single attribute condition: an operator and its argument list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConditionSpec {
    #[serde(default)]
    pub attribute_value_list: Option<Vec<WireValue>>,
    pub comparison_operator: ComparisonOperator,
}

pub type Conditions = BTreeMap<String, ConditionSpec>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryRequest {
    pub table_name: String,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub select: Option<Select>,
    #[serde(default)]
    pub attributes_to_get: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub consistent_read: Option<bool>,
    #[serde(default)]
    pub key_conditions: Option<Conditions>,
    #[serde(default)]
    pub query_filter: Option<Conditions>,
    #[serde(default)]
    pub conditional_operator: Option<ConditionalOperator>,
    #[serde(default)]
    pub scan_index_forward: Option<bool>,
    #[serde(default)]
    pub exclusive_start_key: Option<WireMap>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanRequest {
    pub table_name: String,
    #[serde(default)]
    pub attributes_to_get: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub select: Option<Select>,
    #[serde(default)]
    pub scan_filter: Option<Conditions>,
    #[serde(default)]
    pub conditional_operator: Option<ConditionalOperator>,
    #[serde(default)]
    pub exclusive_start_key: Option<WireMap>,
    #[serde(default)]
    pub segment: Option<i64>,
    #[serde(default)]
    pub total_segments: Option<i64>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

// ---------------------------------------------------------------------------
// Batch operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeysAndAttributes {
    pub keys: Vec<WireMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchGetItemRequest {
    pub request_items: BTreeMap<String, KeysAndAttributes>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRequest {
    pub item: WireMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRequest {
    pub key: WireMap,
}

/// Exactly one of the two members must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteRequest {
    #[serde(default)]
    pub put_request: Option<PutRequest>,
    #[serde(default)]
    pub delete_request: Option<DeleteRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchWriteItemRequest {
    pub request_items: BTreeMap<String, Vec<WriteRequest>>,
    #[serde(default)]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    #[serde(default)]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}
