//! PutItem, GetItem, DeleteItem, and UpdateItem with `Expected` conditions.

use serde_json::{Map, Value};

use super::Table;
use crate::error::{Error, Result};
use crate::item::{Item, UpdateAction};
use crate::key::Key;
use crate::request::{
    DeleteItemRequest, DeleteRequest, Expected, GetItemRequest, PutItemRequest, PutRequest,
    UpdateItemRequest, WriteRequest,
};
use crate::types::{ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValues};
use crate::value::{self, AttributeMap, AttributeValue};

/// A validated BatchWriteItem entry, ready to apply.
#[derive(Debug, Clone)]
pub enum BatchWrite {
    Put(Item),
    Delete(Key),
}

impl BatchWrite {
    pub fn key(&self) -> &Key {
        match self {
            BatchWrite::Put(item) => &item.key,
            BatchWrite::Delete(key) => key,
        }
    }
}

impl Table {
    pub fn put_item(&mut self, req: &PutItemRequest) -> Result<Value> {
        let return_values = allowed_return_values(req.return_values)?;
        let item = Item::from_wire(&req.item, &self.key_schema)?;
        self.validate_item(&item)?;
        check_conditions(self.get(&item.key), req.expected.as_ref(), self)?;

        let key = item.key.clone();
        let old = self.store(item);

        let mut response = Map::new();
        if return_values == ReturnValues::AllOld
            && let Some(old) = &old
        {
            response.insert("Attributes".into(), old.to_json(&self.key_schema));
        }
        self.write_metadata(
            &mut response,
            req.return_consumed_capacity,
            req.return_item_collection_metrics,
            &key,
        );
        Ok(Value::Object(response))
    }

    pub fn get_item(&self, req: &GetItemRequest) -> Result<Value> {
        let key = Key::from_key_data(&req.key, &self.key_schema)?;
        let mut response = Map::new();
        if let Some(item) = self.get(&key) {
            response.insert(
                "Item".into(),
                self.render(item, req.attributes_to_get.as_deref()),
            );
        }
        if let Some(capacity) = self.consumed_capacity(req.return_consumed_capacity) {
            response.insert("ConsumedCapacity".into(), capacity);
        }
        Ok(Value::Object(response))
    }

    /// Deleting an absent key succeeds and changes nothing.
    pub fn delete_item(&mut self, req: &DeleteItemRequest) -> Result<Value> {
        let return_values = allowed_return_values(req.return_values)?;
        let key = Key::from_key_data(&req.key, &self.key_schema)?;
        check_conditions(self.get(&key), req.expected.as_ref(), self)?;

        let old = self.remove(&key);

        let mut response = Map::new();
        if return_values == ReturnValues::AllOld
            && let Some(old) = &old
        {
            response.insert("Attributes".into(), old.to_json(&self.key_schema));
        }
        self.write_metadata(
            &mut response,
            req.return_consumed_capacity,
            req.return_item_collection_metrics,
            &key,
        );
        Ok(Value::Object(response))
    }

    /// Apply `AttributeUpdates` to an item.
    ///
    /// A missing item is created as a key-only shell when at least one action
    /// is PUT or ADD. The updates run against a working copy that is stored
    /// only once every update and the post-update checks succeed, so a failed
    /// update leaves the previous item (or no item) in place.
    pub fn update_item(&mut self, req: &UpdateItemRequest) -> Result<Value> {
        let key = Key::from_key_data(&req.key, &self.key_schema)?;
        let updates = req.attribute_updates.clone().unwrap_or_default();
        let mut creates_item = false;
        for (name, update) in &updates {
            value::validate_attribute_name(name)?;
            creates_item |= UpdateAction::of(name, update)?.creates_item();
        }

        let old = self.get(&key).cloned();
        check_conditions(old.as_ref(), req.expected.as_ref(), self)?;

        let mut response = Map::new();
        let mut item = match &old {
            Some(item) => item.clone(),
            None if creates_item => Item::from_key(key.clone()),
            None => {
                self.write_metadata(
                    &mut response,
                    req.return_consumed_capacity,
                    req.return_item_collection_metrics,
                    &key,
                );
                return Ok(Value::Object(response));
            }
        };
        item.apply_updates(&updates, &self.key_schema)?;
        self.validate_item(&item)?;

        let updated = |map: AttributeMap| -> AttributeMap {
            map.into_iter()
                .filter(|(name, _)| updates.contains_key(name))
                .collect()
        };
        let old_map = old.as_ref().map(|o| o.to_map(&self.key_schema)).unwrap_or_default();
        let attributes = match req.return_values.unwrap_or_default() {
            ReturnValues::None => AttributeMap::new(),
            ReturnValues::AllOld => old_map,
            ReturnValues::UpdatedOld => updated(old_map),
            ReturnValues::AllNew => item.to_map(&self.key_schema),
            ReturnValues::UpdatedNew => updated(item.to_map(&self.key_schema)),
        };
        if !attributes.is_empty() {
            response.insert("Attributes".into(), value::map_to_json(&attributes));
        }

        self.store(item);
        self.write_metadata(
            &mut response,
            req.return_consumed_capacity,
            req.return_item_collection_metrics,
            &key,
        );
        Ok(Value::Object(response))
    }

    // -----------------------------------------------------------------------
    // Batch support
    // -----------------------------------------------------------------------

    /// Validate one BatchWriteItem entry without applying it.
    pub(crate) fn prepare_write(&self, req: &WriteRequest) -> Result<BatchWrite> {
        match req {
            WriteRequest {
                put_request: Some(PutRequest { item }),
                delete_request: None,
            } => {
                let item = Item::from_wire(item, &self.key_schema)?;
                self.validate_item(&item)?;
                Ok(BatchWrite::Put(item))
            }
            WriteRequest {
                put_request: None,
                delete_request: Some(DeleteRequest { key }),
            } => Ok(BatchWrite::Delete(Key::from_key_data(key, &self.key_schema)?)),
            _ => Err(Error::validation(
                "One or more parameter values were invalid: A WriteRequest must contain exactly one of PutRequest or DeleteRequest",
            )),
        }
    }

    pub(crate) fn apply_write(&mut self, write: BatchWrite) {
        match write {
            BatchWrite::Put(item) => {
                self.store(item);
            }
            BatchWrite::Delete(key) => {
                self.remove(&key);
            }
        }
    }

    /// An item as returned to clients, optionally restricted to the named
    /// attributes.
    pub(crate) fn render(&self, item: &Item, attributes_to_get: Option<&[String]>) -> Value {
        match attributes_to_get {
            Some(names) => item.select_json(names, &self.key_schema),
            None => item.to_json(&self.key_schema),
        }
    }

    fn write_metadata(
        &self,
        response: &mut Map<String, Value>,
        capacity: Option<ReturnConsumedCapacity>,
        metrics: Option<ReturnItemCollectionMetrics>,
        key: &Key,
    ) {
        if let Some(capacity) = self.consumed_capacity(capacity) {
            response.insert("ConsumedCapacity".into(), capacity);
        }
        if let Some(metrics) = self.item_collection_metrics(metrics, key) {
            response.insert("ItemCollectionMetrics".into(), metrics);
        }
    }
}

/// PutItem and DeleteItem only return the old item, if anything.
fn allowed_return_values(requested: Option<ReturnValues>) -> Result<ReturnValues> {
    match requested.unwrap_or_default() {
        rv @ (ReturnValues::None | ReturnValues::AllOld) => Ok(rv),
        _ => Err(Error::validation("Return values set to invalid value")),
    }
}

/// Evaluate an `Expected` clause against the currently stored item.
fn check_conditions(old: Option<&Item>, expected: Option<&Expected>, table: &Table) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let current = |name: &str| old.and_then(|item| item.get(name, &table.key_schema));

    for (name, condition) in expected {
        value::validate_attribute_name(name)?;
        match (&condition.value, condition.exists) {
            (None, None) => {
                return Err(Error::validation(
                    "One or more parameter values were invalid: 'Exists' is set to null. 'Exists' must be set to false when no Attribute value is specified",
                ));
            }
            (None, Some(true)) => {
                return Err(Error::validation(
                    "One or more parameter values were invalid: 'Exists' is set to true. 'Exists' must be set to false when no Attribute value is specified",
                ));
            }
            (None, Some(false)) => {
                if current(name).is_some() {
                    return Err(Error::ConditionalCheckFailed);
                }
            }
            (Some(_), Some(false)) => {
                return Err(Error::validation(
                    "One or more parameter values were invalid: Cannot expect an attribute to have a specified value while expecting it to not exist",
                ));
            }
            (Some(wire), _) => {
                let expected = AttributeValue::decode(wire)?;
                if current(name) != Some(&expected) {
                    return Err(Error::ConditionalCheckFailed);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{indexed_table, put};
    use super::*;
    use crate::request;
    use serde_json::json;

    fn key(id: &str, age: &str) -> Value {
        json!({"id": {"S": id}, "age": {"N": age}})
    }

    fn put_req(item: Value, extra: Value) -> PutItemRequest {
        let mut v = json!({"TableName": "Table1", "Item": item});
        if let Value::Object(extra) = extra {
            v.as_object_mut().unwrap().extend(extra);
        }
        request::parse(v).unwrap()
    }

    fn update_req(key: Value, extra: Value) -> UpdateItemRequest {
        let mut v = json!({"TableName": "Table1", "Key": key});
        if let Value::Object(extra) = extra {
            v.as_object_mut().unwrap().extend(extra);
        }
        request::parse(v).unwrap()
    }

    fn get(table: &Table, key: Value) -> Value {
        let req = request::parse(json!({"TableName": "Table1", "Key": key})).unwrap();
        table.get_item(&req).unwrap()
    }

    #[test]
    fn test_put_then_get() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "5"}}));
        let resp = get(&table, key("a", "1"));
        assert_eq!(resp["Item"]["score"], json!({"N": "5"}));
        assert!(get(&table, key("b", "1")).get("Item").is_none());
    }

    #[test]
    fn test_put_returns_all_old() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "v": {"S": "old"}}));
        let resp = table
            .put_item(&put_req(
                json!({"id": {"S": "a"}, "age": {"N": "1"}, "v": {"S": "new"}}),
                json!({"ReturnValues": "ALL_OLD"}),
            ))
            .unwrap();
        assert_eq!(resp["Attributes"]["v"], json!({"S": "old"}));
    }

    #[test]
    fn test_put_rejects_all_new() {
        let mut table = indexed_table();
        let err = table
            .put_item(&put_req(key("a", "1"), json!({"ReturnValues": "ALL_NEW"})))
            .unwrap_err();
        assert!(err.to_string().contains("Return values set to invalid value"));
    }

    #[test]
    fn test_put_checks_index_key_types() {
        let mut table = indexed_table();
        let err = table
            .put_item(&put_req(
                json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"S": "high"}}),
                json!({}),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("Index Key score"));
        assert_eq!(table.item_count(), 0);
    }

    #[test]
    fn test_expected_exists_false() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "5"}}));
        let err = table
            .put_item(&put_req(key("a", "1"), json!({"Expected": {"score": {"Exists": false}}})))
            .unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed));

        table
            .put_item(&put_req(key("a", "1"), json!({"Expected": {"other": {"Exists": false}}})))
            .unwrap();
    }

    #[test]
    fn test_expected_value() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "5"}}));
        let err = table
            .put_item(&put_req(
                key("a", "1"),
                json!({"Expected": {"score": {"Value": {"N": "6"}}}}),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed));
        table
            .put_item(&put_req(
                key("a", "1"),
                json!({"Expected": {"score": {"Value": {"N": "5.0"}, "Exists": true}}}),
            ))
            .unwrap();
    }

    #[test]
    fn test_expected_invalid_combinations() {
        let mut table = indexed_table();
        let err = table
            .put_item(&put_req(key("a", "1"), json!({"Expected": {"score": {}}})))
            .unwrap_err();
        assert!(err.to_string().contains("'Exists' is set to null"));
        let err = table
            .put_item(&put_req(key("a", "1"), json!({"Expected": {"score": {"Exists": true}}})))
            .unwrap_err();
        assert!(err.to_string().contains("'Exists' is set to true"));
        let err = table
            .put_item(&put_req(
                key("a", "1"),
                json!({"Expected": {"score": {"Exists": false, "Value": {"N": "1"}}}}),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("while expecting it to not exist"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}}));
        let req: DeleteItemRequest =
            request::parse(json!({"TableName": "Table1", "Key": key("a", "1")})).unwrap();
        let first = table.delete_item(&req).unwrap();
        let second = table.delete_item(&req).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.item_count(), 0);
    }

    #[test]
    fn test_update_add_number() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "5"}}));
        let resp = table
            .update_item(&update_req(
                key("a", "1"),
                json!({
                    "AttributeUpdates": {"score": {"Action": "ADD", "Value": {"N": "3"}}},
                    "ReturnValues": "UPDATED_NEW"
                }),
            ))
            .unwrap();
        assert_eq!(resp["Attributes"], json!({"score": {"N": "8"}}));
    }

    #[test]
    fn test_update_creates_shell_only_for_put_or_add() {
        let mut table = indexed_table();
        let resp = table
            .update_item(&update_req(
                key("a", "1"),
                json!({"AttributeUpdates": {"x": {"Action": "DELETE"}}}),
            ))
            .unwrap();
        assert_eq!(resp, json!({}));
        assert_eq!(table.item_count(), 0);

        table
            .update_item(&update_req(
                key("a", "1"),
                json!({"AttributeUpdates": {"x": {"Action": "PUT", "Value": {"S": "y"}}}}),
            ))
            .unwrap();
        assert_eq!(get(&table, key("a", "1"))["Item"]["x"], json!({"S": "y"}));
    }

    #[test]
    fn test_failed_update_removes_new_shell() {
        let mut table = indexed_table();
        let err = table
            .update_item(&update_req(
                key("a", "1"),
                json!({"AttributeUpdates": {
                    "x": {"Action": "PUT", "Value": {"S": "y"}},
                    "y": {"Action": "ADD", "Value": {"S": "no"}}
                }}),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
        assert_eq!(table.item_count(), 0);
    }

    #[test]
    fn test_failed_update_restores_item() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "x": {"S": "before"}}));
        let err = table
            .update_item(&update_req(
                key("a", "1"),
                json!({"AttributeUpdates": {
                    "x": {"Action": "PUT", "Value": {"S": "after"}},
                    "score": {"Action": "PUT", "Value": {"S": "wrong type"}}
                }}),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("Index Key score"));
        assert_eq!(get(&table, key("a", "1"))["Item"]["x"], json!({"S": "before"}));
    }

    #[test]
    fn test_update_return_values() {
        let mut table = indexed_table();
        put(&mut table, json!({"id": {"S": "a"}, "age": {"N": "1"}, "x": {"S": "1"}, "y": {"S": "2"}}));
        let resp = table
            .update_item(&update_req(
                key("a", "1"),
                json!({
                    "AttributeUpdates": {"x": {"Value": {"S": "9"}}},
                    "ReturnValues": "UPDATED_OLD"
                }),
            ))
            .unwrap();
        assert_eq!(resp["Attributes"], json!({"x": {"S": "1"}}));

        let resp = table
            .update_item(&update_req(
                key("a", "1"),
                json!({
                    "AttributeUpdates": {"x": {"Value": {"S": "10"}}},
                    "ReturnValues": "ALL_NEW"
                }),
            ))
            .unwrap();
        assert_eq!(resp["Attributes"]["y"], json!({"S": "2"}));
        assert_eq!(resp["Attributes"]["x"], json!({"S": "10"}));
    }

    #[test]
    fn test_item_size_limit() {
        let mut table = indexed_table();
        table.limits.max_item_size = 32;
        let err = table
            .put_item(&put_req(
                json!({"id": {"S": "a"}, "age": {"N": "1"}, "blob": {"S": "x".repeat(64)}}),
                json!({}),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("maximum allowed size"));
    }

    #[test]
    fn test_write_metadata() {
        let mut table = indexed_table();
        let resp = table
            .put_item(&put_req(
                key("a", "1"),
                json!({"ReturnConsumedCapacity": "TOTAL", "ReturnItemCollectionMetrics": "SIZE"}),
            ))
            .unwrap();
        assert_eq!(resp["ConsumedCapacity"], json!({"CapacityUnits": 1, "TableName": "Table1"}));
        assert_eq!(resp["ItemCollectionMetrics"]["ItemCollectionKey"], json!({"id": {"S": "a"}}));
    }

    #[test]
    fn test_prepare_write_requires_exactly_one() {
        let table = indexed_table();
        let req: WriteRequest = serde_json::from_value(json!({})).unwrap();
        assert!(table.prepare_write(&req).is_err());
        let req: WriteRequest =
            serde_json::from_value(json!({"DeleteRequest": {"Key": key("a", "1")}})).unwrap();
        assert!(matches!(table.prepare_write(&req).unwrap(), BatchWrite::Delete(_)));
    }
}
