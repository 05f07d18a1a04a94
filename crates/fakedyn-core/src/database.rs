//! The table registry and operation dispatch.
//!
//! [`Database`] receives an operation name plus a JSON payload, decodes the
//! payload into its request shape, and runs it against itself (table
//! management, batch operations) or against a single [`Table`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::request::{
    self, BatchGetItemRequest, BatchWriteItemRequest, CreateTableRequest, KeysAndAttributes,
    ListTablesRequest, TableNameRequest, UpdateTableRequest,
};
use crate::sack::Sack;
use crate::table::crud::BatchWrite;
use crate::table::{Table, TableLimits, TableState};
use crate::types::{MAX_LIST_TABLES_LIMIT, ReturnConsumedCapacity};

/// Member of logged CreateTable and UpdateTable payloads carrying the
/// resulting [`TableState`], so replay restores timestamps instead of
/// stamping the replay time.
pub const TABLE_STATE_FIELD: &str = "FakedynTableState";

/// Every operation the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateTable,
    DeleteTable,
    DescribeTable,
    UpdateTable,
    ListTables,
    PutItem,
    GetItem,
    DeleteItem,
    UpdateItem,
    Query,
    Scan,
    BatchGetItem,
    BatchWriteItem,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::CreateTable,
        Operation::DeleteTable,
        Operation::DescribeTable,
        Operation::UpdateTable,
        Operation::ListTables,
        Operation::PutItem,
        Operation::GetItem,
        Operation::DeleteItem,
        Operation::UpdateItem,
        Operation::Query,
        Operation::Scan,
        Operation::BatchGetItem,
        Operation::BatchWriteItem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateTable => "CreateTable",
            Operation::DeleteTable => "DeleteTable",
            Operation::DescribeTable => "DescribeTable",
            Operation::UpdateTable => "UpdateTable",
            Operation::ListTables => "ListTables",
            Operation::PutItem => "PutItem",
            Operation::GetItem => "GetItem",
            Operation::DeleteItem => "DeleteItem",
            Operation::UpdateItem => "UpdateItem",
            Operation::Query => "Query",
            Operation::Scan => "Scan",
            Operation::BatchGetItem => "BatchGetItem",
            Operation::BatchWriteItem => "BatchWriteItem",
        }
    }

    /// Operations that never change state.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Operation::DescribeTable
                | Operation::ListTables
                | Operation::GetItem
                | Operation::Query
                | Operation::Scan
                | Operation::BatchGetItem
        )
    }

    /// Operations recorded in the persistence log.
    pub fn is_logged(self) -> bool {
        !self.is_read()
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Error::UnknownOperation(s.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of tables, in creation order.
#[derive(Debug, Default)]
pub struct Database {
    tables: HashMap<String, Table>,
    order: Vec<String>,
    config: EngineConfig,
}

impl Database {
    pub fn new(config: EngineConfig) -> Self {
        Database {
            tables: HashMap::new(),
            order: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run any operation by name.
    pub fn process(&mut self, operation: &str, payload: Value) -> Result<Value> {
        let operation: Operation = operation.parse()?;
        if operation.is_read() {
            self.read(operation, payload)
        } else {
            self.write(operation, payload)
        }
    }

    /// Run a read-only operation.
    pub fn read(&self, operation: Operation, payload: Value) -> Result<Value> {
        let payload = self.admit(operation, payload)?;
        match operation {
            Operation::DescribeTable => self.describe_table(request::parse(payload)?),
            Operation::ListTables => self.list_tables(request::parse(payload)?),
            Operation::GetItem => {
                let req: request::GetItemRequest = request::parse(payload)?;
                self.table(&req.table_name)?.get_item(&req)
            }
            Operation::Query => {
                let req: request::QueryRequest = request::parse(payload)?;
                self.table(&req.table_name)?.query(&req)
            }
            Operation::Scan => {
                let req: request::ScanRequest = request::parse(payload)?;
                self.table(&req.table_name)?.scan(&req)
            }
            Operation::BatchGetItem => self.batch_get_item(request::parse(payload)?),
            _ => Err(Error::UnknownOperation(format!(
                "{operation} is not a read operation"
            ))),
        }
    }

    /// Run a mutating operation.
    pub fn write(&mut self, operation: Operation, payload: Value) -> Result<Value> {
        if operation.is_read() {
            return self.read(operation, payload);
        }
        let mut payload = self.admit(operation, payload)?;
        match operation {
            Operation::CreateTable => {
                let state = take_table_state(&mut payload)?;
                self.create_table(request::parse(payload)?, state)
            }
            Operation::DeleteTable => self.delete_table(request::parse(payload)?),
            Operation::UpdateTable => {
                let state = take_table_state(&mut payload)?;
                self.update_table(request::parse(payload)?, state)
            }
            Operation::PutItem => {
                let req: request::PutItemRequest = request::parse(payload)?;
                self.table_mut(&req.table_name)?.put_item(&req)
            }
            Operation::DeleteItem => {
                let req: request::DeleteItemRequest = request::parse(payload)?;
                self.table_mut(&req.table_name)?.delete_item(&req)
            }
            Operation::UpdateItem => {
                let req: request::UpdateItemRequest = request::parse(payload)?;
                self.table_mut(&req.table_name)?.update_item(&req)
            }
            Operation::BatchWriteItem => self.batch_write_item(request::parse(payload)?),
            _ => Err(Error::UnknownOperation(operation.to_string())),
        }
    }

    /// Enforce the request size limit and normalize an absent payload to `{}`.
    fn admit(&self, operation: Operation, payload: Value) -> Result<Value> {
        let payload = match payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let size = payload.to_string().len();
        if size > self.config.request_size_limit {
            return Err(Error::validation(format!(
                "Request size of {size} bytes exceeded the limit of {} bytes",
                self.config.request_size_limit
            )));
        }
        let table = payload
            .get("TableName")
            .and_then(|name| name.as_str())
            .unwrap_or("");
        debug!(operation = %operation, table, "dispatch");
        Ok(payload)
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| Error::table_not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Table names in creation order.
    pub fn table_names(&self) -> &[String] {
        &self.order
    }

    /// Item count per table, sorted by table name.
    pub fn item_counts(&self) -> BTreeMap<&str, usize> {
        self.tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.item_count()))
            .collect()
    }

    /// Drop every table.
    pub fn reset(&mut self) {
        self.tables.clear();
        self.order.clear();
    }

    /// Attach the resulting table state to a successful CreateTable or
    /// UpdateTable record before it is logged.
    pub fn stamp_record(&self, operation: Operation, record: &mut Value) {
        if !matches!(operation, Operation::CreateTable | Operation::UpdateTable) {
            return;
        }
        let Some(table) = record
            .get("TableName")
            .and_then(|name| name.as_str())
            .and_then(|name| self.tables.get(name))
        else {
            return;
        };
        let Ok(state) = serde_json::to_value(table.state()) else {
            return;
        };
        if let Some(fields) = record.as_object_mut() {
            fields.insert(TABLE_STATE_FIELD.to_string(), state);
        }
    }

    /// The minimal operation sequence that recreates the current state: one
    /// CreateTable per table in creation order, then one PutItem per item.
    pub fn snapshot_records(&self) -> Result<Vec<(Operation, Value)>> {
        let mut records = Vec::new();
        for name in &self.order {
            let table = self.table(name)?;
            let mut create = serde_json::to_value(table.create_request())?;
            if let Some(fields) = create.as_object_mut() {
                fields.insert(
                    TABLE_STATE_FIELD.to_string(),
                    serde_json::to_value(table.state())?,
                );
            }
            records.push((Operation::CreateTable, create));
            for item in table.items() {
                records.push((
                    Operation::PutItem,
                    json!({ "TableName": name, "Item": item.to_json(&table.key_schema) }),
                ));
            }
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Table management
    // -----------------------------------------------------------------------

    fn create_table(
        &mut self,
        req: CreateTableRequest,
        state: Option<TableState>,
    ) -> Result<Value> {
        if self.tables.contains_key(&req.table_name) {
            return Err(Error::ResourceInUse(format!(
                "Duplicate table name: {}",
                req.table_name
            )));
        }
        let mut table = Table::create(&req, TableLimits::from(&self.config))?;
        if let Some(state) = state {
            table.restore(state);
        }
        let description = table.describe();
        table.activate();

        info!(table = %req.table_name, "table created");
        self.order.push(req.table_name.clone());
        self.tables.insert(req.table_name, table);
        Ok(json!({ "TableDescription": description }))
    }

    fn delete_table(&mut self, req: TableNameRequest) -> Result<Value> {
        let mut table = self
            .tables
            .remove(&req.table_name)
            .ok_or_else(|| Error::table_not_found(&req.table_name))?;
        self.order.retain(|name| name != &req.table_name);
        table.mark_deleting();

        info!(table = %req.table_name, "table deleted");
        Ok(json!({ "TableDescription": table.describe() }))
    }

    fn describe_table(&self, req: TableNameRequest) -> Result<Value> {
        Ok(json!({ "Table": self.table(&req.table_name)?.describe() }))
    }

    fn update_table(
        &mut self,
        req: UpdateTableRequest,
        state: Option<TableState>,
    ) -> Result<Value> {
        let table = self.table_mut(&req.table_name)?;
        table.update(&req)?;
        if let Some(state) = state {
            table.restore(state);
        }
        let description = table.describe();
        table.activate();
        Ok(json!({ "TableDescription": description }))
    }

    fn list_tables(&self, req: ListTablesRequest) -> Result<Value> {
        let limit = match req.limit {
            None => MAX_LIST_TABLES_LIMIT,
            Some(limit) if (1..=MAX_LIST_TABLES_LIMIT as i64).contains(&limit) => limit as usize,
            Some(limit) => {
                return Err(Error::validation(format!(
                    "Value '{limit}' at 'limit' failed to satisfy constraint: Member must have value between 1 and {MAX_LIST_TABLES_LIMIT}"
                )));
            }
        };
        let start = req
            .exclusive_start_table_name
            .as_ref()
            .and_then(|start| self.order.iter().position(|name| name == start))
            .map_or(0, |pos| pos + 1);

        let names: Vec<&String> = self.order.iter().skip(start).take(limit).collect();
        let mut response = json!({ "TableNames": names });
        if start + names.len() < self.order.len()
            && let Some(last) = names.last()
        {
            response["LastEvaluatedTableName"] = json!(last);
        }
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------

    fn batch_get_item(&self, req: BatchGetItemRequest) -> Result<Value> {
        let total: usize = req.request_items.values().map(|ka| ka.keys.len()).sum();
        if total == 0 {
            return Err(Error::validation(
                "The requestItems parameter must contain at least one key",
            ));
        }
        if total > self.config.max_batch_get {
            return Err(Error::validation(
                "Too many items requested for the BatchGetItem call",
            ));
        }

        let mut prepared = Vec::with_capacity(req.request_items.len());
        for (name, ka) in &req.request_items {
            let table = self.table(name)?;
            let mut seen = BTreeSet::new();
            let keys = ka
                .keys
                .iter()
                .map(|wire| {
                    let key = Key::from_key_data(wire, &table.key_schema)?;
                    if !seen.insert(key.clone()) {
                        return Err(Error::validation(
                            "Provided list of item keys contains duplicates",
                        ));
                    }
                    Ok(key)
                })
                .collect::<Result<Vec<_>>>()?;
            prepared.push((name, table, ka, keys));
        }

        let mut sack = Sack::new(self.config.response_size_limit);
        let mut responses = Map::new();
        let mut unprocessed = Map::new();
        for (name, table, ka, keys) in prepared {
            let mut found = Vec::new();
            let mut pending = Vec::new();
            for (key, wire) in keys.iter().zip(&ka.keys) {
                if sack.is_full() {
                    pending.push(wire.clone());
                    continue;
                }
                let Some(item) = table.get(key) else {
                    continue;
                };
                let rendered = table.render(item, ka.attributes_to_get.as_deref());
                if sack.try_add(rendered.to_string().len()) {
                    found.push(rendered);
                } else {
                    pending.push(wire.clone());
                }
            }
            responses.insert(name.clone(), Value::Array(found));
            if !pending.is_empty() {
                let remaining = KeysAndAttributes {
                    keys: pending,
                    attributes_to_get: ka.attributes_to_get.clone(),
                    consistent_read: ka.consistent_read,
                };
                unprocessed.insert(name.clone(), serde_json::to_value(remaining)?);
            }
        }

        let mut response = json!({ "Responses": responses, "UnprocessedKeys": unprocessed });
        if let Some(capacity) =
            batch_capacity(req.return_consumed_capacity, req.request_items.keys())
        {
            response["ConsumedCapacity"] = capacity;
        }
        Ok(response)
    }

    /// Validate the whole batch, then apply every write. Nothing is applied
    /// if any request is invalid.
    fn batch_write_item(&mut self, req: BatchWriteItemRequest) -> Result<Value> {
        let total: usize = req.request_items.values().map(Vec::len).sum();
        if total == 0 {
            return Err(Error::validation(
                "The requestItems parameter must contain at least one WriteRequest",
            ));
        }
        if total > self.config.max_batch_write {
            return Err(Error::validation(
                "Too many items requested for the BatchWriteItem call",
            ));
        }

        let mut prepared: Vec<(&String, Vec<BatchWrite>)> = Vec::new();
        for (name, writes) in &req.request_items {
            let table = self.table(name)?;
            let mut seen = BTreeSet::new();
            let mut batch = Vec::with_capacity(writes.len());
            for write in writes {
                let write = table.prepare_write(write)?;
                if !seen.insert(write.key().clone()) {
                    return Err(Error::validation(
                        "Provided list of item keys contains duplicates",
                    ));
                }
                batch.push(write);
            }
            prepared.push((name, batch));
        }

        let mut metrics = Map::new();
        for (name, batch) in prepared {
            let table = self.table_mut(name)?;
            let mut table_metrics = Vec::new();
            for write in batch {
                if let Some(m) =
                    table.item_collection_metrics(req.return_item_collection_metrics, write.key())
                {
                    table_metrics.push(m);
                }
                table.apply_write(write);
            }
            if !table_metrics.is_empty() {
                metrics.insert(name.clone(), Value::Array(table_metrics));
            }
        }

        let mut response = json!({ "UnprocessedItems": {} });
        if let Some(capacity) =
            batch_capacity(req.return_consumed_capacity, req.request_items.keys())
        {
            response["ConsumedCapacity"] = capacity;
        }
        if !metrics.is_empty() {
            response["ItemCollectionMetrics"] = Value::Object(metrics);
        }
        Ok(response)
    }
}

fn take_table_state(payload: &mut Value) -> Result<Option<TableState>> {
    let state = payload
        .as_object_mut()
        .and_then(|fields| fields.remove(TABLE_STATE_FIELD));
    Ok(state.map(serde_json::from_value).transpose()?)
}

/// One capacity entry per table touched by a batch.
fn batch_capacity<'a>(
    requested: Option<ReturnConsumedCapacity>,
    tables: impl Iterator<Item = &'a String>,
) -> Option<Value> {
    requested.is_some_and(ReturnConsumedCapacity::is_requested).then(|| {
        Value::Array(
            tables
                .map(|name| json!({ "CapacityUnits": 1, "TableName": name }))
                .collect(),
        )
    })
}
