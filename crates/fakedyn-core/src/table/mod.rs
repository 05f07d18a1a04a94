//! Tables: schema, secondary indexes, throughput, and the item store.
//!
//! Item operations live in [`crud`]; Query and Scan in [`query`].

pub mod crud;
pub mod query;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::SecondaryIndex;
use crate::item::Item;
use crate::key::{Key, KeySchema};
use crate::request::{AttributeDefinition, CreateTableRequest, UpdateTableRequest};
use crate::throughput::{Throughput, unix_now};
use crate::types::{
    MAX_SECONDARY_INDEXES, ReturnConsumedCapacity, ReturnItemCollectionMetrics, TableStatus,
};

/// Per-table copies of the engine limits that item operations enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_item_size: usize,
    pub response_size_limit: usize,
}

impl From<&EngineConfig> for TableLimits {
    fn from(config: &EngineConfig) -> Self {
        TableLimits {
            max_item_size: config.max_item_size,
            response_size_limit: config.response_size_limit,
        }
    }
}

/// Table metadata a CreateTable request cannot express: the creation time
/// and the throughput history of the table and its global indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableState {
    pub creation_date_time: u64,
    pub provisioned_throughput: Throughput,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub global_secondary_indexes: BTreeMap<String, Throughput>,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub key_schema: KeySchema,
    attribute_definitions: Vec<AttributeDefinition>,
    local_indexes: Vec<SecondaryIndex>,
    global_indexes: Vec<SecondaryIndex>,
    items: BTreeMap<Key, Item>,
    throughput: Throughput,
    status: TableStatus,
    size_bytes: usize,
    creation_time: u64,
    limits: TableLimits,
}

impl Table {
    /// Validate a CreateTable request and build the (still `CREATING`) table.
    pub fn create(req: &CreateTableRequest, limits: TableLimits) -> Result<Self> {
        validate_table_name(&req.table_name)?;

        let definitions = &req.attribute_definitions;
        let mut defined = BTreeSet::new();
        for definition in definitions {
            crate::value::validate_attribute_name(&definition.attribute_name)?;
            if !defined.insert(definition.attribute_name.as_str()) {
                return Err(Error::validation(format!(
                    "One or more parameter values were invalid: Duplicate AttributeName in AttributeDefinitions: {}",
                    definition.attribute_name
                )));
            }
        }

        let key_schema = KeySchema::from_elements(&req.key_schema, definitions)?;

        let local_indexes = match &req.local_secondary_indexes {
            Some(specs) => {
                check_index_count(specs.len(), "LocalSecondaryIndexes")?;
                specs
                    .iter()
                    .map(|spec| SecondaryIndex::local(spec, definitions, &key_schema))
                    .collect::<Result<Vec<_>>>()?
            }
            None => Vec::new(),
        };
        let global_indexes = match &req.global_secondary_indexes {
            Some(specs) => {
                check_index_count(specs.len(), "GlobalSecondaryIndexes")?;
                specs
                    .iter()
                    .map(|spec| SecondaryIndex::global(spec, definitions))
                    .collect::<Result<Vec<_>>>()?
            }
            None => Vec::new(),
        };

        let mut index_names = BTreeSet::new();
        for index in local_indexes.iter().chain(&global_indexes) {
            if !index_names.insert(index.name.as_str()) {
                return Err(Error::validation(format!(
                    "One or more parameter values were invalid: Duplicate index name: {}",
                    index.name
                )));
            }
        }

        let used: BTreeSet<&str> = key_schema
            .names()
            .chain(
                local_indexes
                    .iter()
                    .chain(&global_indexes)
                    .flat_map(|index| index.key_schema.names()),
            )
            .collect();
        if defined != used {
            return Err(Error::validation(
                "One or more parameter values were invalid: Some AttributeDefinitions are not used in the key schema or secondary indexes",
            ));
        }

        Ok(Table {
            name: req.table_name.clone(),
            key_schema,
            attribute_definitions: definitions.clone(),
            local_indexes,
            global_indexes,
            items: BTreeMap::new(),
            throughput: Throughput::new(req.provisioned_throughput)?,
            status: TableStatus::Creating,
            size_bytes: 0,
            creation_time: unix_now(),
            limits,
        })
    }

    pub fn status(&self) -> TableStatus {
        self.status
    }

    pub fn activate(&mut self) {
        self.status = TableStatus::Active;
    }

    pub fn mark_deleting(&mut self) {
        self.status = TableStatus::Deleting;
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Items in key order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn get(&self, key: &Key) -> Option<&Item> {
        self.items.get(key)
    }

    pub fn has_local_indexes(&self) -> bool {
        !self.local_indexes.is_empty()
    }

    /// Look up a local or global index by name.
    pub fn index(&self, name: &str) -> Result<&SecondaryIndex> {
        self.local_indexes
            .iter()
            .chain(&self.global_indexes)
            .find(|index| index.name == name)
            .ok_or_else(|| {
                Error::validation(format!(
                    "The table does not have the specified index: {name}"
                ))
            })
    }

    /// Apply an UpdateTable request to the table and its global indexes.
    pub fn update(&mut self, req: &UpdateTableRequest) -> Result<()> {
        let gsi_updates = req.global_secondary_index_updates.as_deref().unwrap_or_default();
        if req.provisioned_throughput.is_none() && gsi_updates.is_empty() {
            return Err(Error::validation(
                "At least one of ProvisionedThroughput or GlobalSecondaryIndexUpdates is required",
            ));
        }

        let now = unix_now();
        let mut throughput = self.throughput.clone();
        if let Some(spec) = req.provisioned_throughput {
            throughput.update(spec, now)?;
        }

        let mut global_indexes = self.global_indexes.clone();
        for update in gsi_updates.iter().filter_map(|u| u.update.as_ref()) {
            let index = global_indexes
                .iter_mut()
                .find(|index| index.name == update.index_name)
                .ok_or_else(|| {
                    Error::ResourceNotFound(format!(
                        "Table: {} GSI: {} not found",
                        self.name, update.index_name
                    ))
                })?;
            if let Some(index_throughput) = index.throughput.as_mut() {
                index_throughput.update(update.provisioned_throughput, now)?;
            }
        }

        self.throughput = throughput;
        self.global_indexes = global_indexes;
        self.status = TableStatus::Updating;
        Ok(())
    }

    /// The `TableDescription` object.
    pub fn describe(&self) -> Value {
        let definitions: Vec<Value> = self
            .attribute_definitions
            .iter()
            .map(|d| {
                json!({
                    "AttributeName": d.attribute_name,
                    "AttributeType": d.attribute_type.as_str(),
                })
            })
            .collect();

        let mut desc = json!({
            "AttributeDefinitions": definitions,
            "CreationDateTime": self.creation_time,
            "ItemCount": self.items.len(),
            "KeySchema": self.key_schema.description(),
            "ProvisionedThroughput": self.throughput.description(),
            "TableName": self.name,
            "TableSizeBytes": self.size_bytes,
            "TableStatus": self.status.as_str(),
        });
        if !self.local_indexes.is_empty() {
            desc["LocalSecondaryIndexes"] = self.describe_indexes(&self.local_indexes);
        }
        if !self.global_indexes.is_empty() {
            desc["GlobalSecondaryIndexes"] = self.describe_indexes(&self.global_indexes);
        }
        desc
    }

    fn describe_indexes(&self, indexes: &[SecondaryIndex]) -> Value {
        Value::Array(
            indexes
                .iter()
                .map(|index| index.description(self.items.values(), &self.key_schema))
                .collect(),
        )
    }

    /// A CreateTable request that recreates this table's schema with its
    /// current throughput.
    pub fn create_request(&self) -> CreateTableRequest {
        CreateTableRequest {
            table_name: self.name.clone(),
            attribute_definitions: self.attribute_definitions.clone(),
            key_schema: self.key_schema.to_elements(),
            local_secondary_indexes: (!self.local_indexes.is_empty()).then(|| {
                self.local_indexes
                    .iter()
                    .map(SecondaryIndex::to_local_spec)
                    .collect()
            }),
            global_secondary_indexes: (!self.global_indexes.is_empty()).then(|| {
                self.global_indexes
                    .iter()
                    .filter_map(SecondaryIndex::to_global_spec)
                    .collect()
            }),
            provisioned_throughput: self.throughput.spec(),
        }
    }

    pub fn state(&self) -> TableState {
        TableState {
            creation_date_time: self.creation_time,
            provisioned_throughput: self.throughput.clone(),
            global_secondary_indexes: self
                .global_indexes
                .iter()
                .filter_map(|index| Some((index.name.clone(), index.throughput.clone()?)))
                .collect(),
        }
    }

    /// Overwrite the creation time and throughput history with `state`.
    /// Capacities are kept as they are; indexes missing from `state` keep
    /// their current history.
    pub fn restore(&mut self, state: TableState) {
        self.creation_time = state.creation_date_time;
        self.throughput = restored(&self.throughput, state.provisioned_throughput);
        for index in &mut self.global_indexes {
            if let (Some(current), Some(saved)) = (
                index.throughput.as_mut(),
                state.global_secondary_indexes.get(&index.name),
            ) {
                *current = restored(current, saved.clone());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Item storage
    // -----------------------------------------------------------------------

    /// Check an item against the item size limit and every index key type.
    pub(crate) fn validate_item(&self, item: &Item) -> Result<()> {
        if item.size(&self.key_schema) > self.limits.max_item_size {
            return Err(Error::validation(
                "Item size has exceeded the maximum allowed size",
            ));
        }
        for index in self.local_indexes.iter().chain(&self.global_indexes) {
            index.validate_item(item, &self.key_schema)?;
        }
        Ok(())
    }

    /// Insert or replace an item, returning the previous one.
    pub(crate) fn store(&mut self, item: Item) -> Option<Item> {
        self.size_bytes += item.size(&self.key_schema);
        let old = self.items.insert(item.key.clone(), item);
        if let Some(old) = &old {
            self.size_bytes -= old.size(&self.key_schema);
        }
        old
    }

    pub(crate) fn remove(&mut self, key: &Key) -> Option<Item> {
        let old = self.items.remove(key)?;
        self.size_bytes -= old.size(&self.key_schema);
        Some(old)
    }

    // -----------------------------------------------------------------------
    // Response metadata
    // -----------------------------------------------------------------------

    pub(crate) fn consumed_capacity(&self, requested: Option<ReturnConsumedCapacity>) -> Option<Value> {
        requested
            .is_some_and(ReturnConsumedCapacity::is_requested)
            .then(|| json!({ "CapacityUnits": 1, "TableName": self.name }))
    }

    /// Item collection metrics are only tracked for tables with local
    /// secondary indexes.
    pub(crate) fn item_collection_metrics(
        &self,
        requested: Option<ReturnItemCollectionMetrics>,
        key: &Key,
    ) -> Option<Value> {
        if requested != Some(ReturnItemCollectionMetrics::Size) || self.local_indexes.is_empty() {
            return None;
        }
        let mut collection_key = serde_json::Map::new();
        collection_key.insert(self.key_schema.hash_key.name.clone(), key.primary.to_json());
        Some(json!({
            "ItemCollectionKey": collection_key,
            "SizeEstimateRangeGB": [0, 1],
        }))
    }
}

fn validate_table_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !(3..=255).contains(&name.len()) || !valid_chars {
        return Err(Error::validation(format!(
            "Value '{name}' at 'tableName' failed to satisfy constraint: Member must satisfy regular expression pattern: [a-zA-Z0-9_.-]+ and have length between 3 and 255"
        )));
    }
    Ok(())
}

fn restored(current: &Throughput, saved: Throughput) -> Throughput {
    Throughput {
        read_capacity_units: current.read_capacity_units,
        write_capacity_units: current.write_capacity_units,
        ..saved
    }
}

fn check_index_count(count: usize, what: &str) -> Result<()> {
    if count == 0 {
        return Err(Error::validation(format!(
            "One or more parameter values were invalid: List of {what} is empty"
        )));
    }
    if count > MAX_SECONDARY_INDEXES {
        return Err(Error::validation(format!(
            "One or more parameter values were invalid: Number of {what} exceeds per-table limit of {MAX_SECONDARY_INDEXES}"
        )));
    }
    Ok(())
}
