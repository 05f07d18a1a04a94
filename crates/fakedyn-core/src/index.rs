//! Local and global secondary indexes.
//!
//! Index entries are derived from the table's items on demand. An item
//! appears in an index only when it carries every attribute of the index key
//! schema; items missing any of them are left out rather than indexed under a
//! null.

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::item::Item;
use crate::key::{Key, KeySchema};
use crate::request::{
    AttributeDefinition, GlobalSecondaryIndexSpec, LocalSecondaryIndexSpec, ProjectionSpec,
};
use crate::throughput::Throughput;
use crate::types::ProjectionType;
use crate::value::{self, AttributeMap};

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Which attributes an index makes available to queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub projection_type: ProjectionType,
    pub non_key_attributes: Vec<String>,
}

impl Projection {
    pub fn from_spec(spec: &ProjectionSpec) -> Result<Self> {
        let projection_type = spec.projection_type.unwrap_or(ProjectionType::All);
        match (projection_type, &spec.non_key_attributes) {
            (ProjectionType::Include, None) => Err(Error::validation(
                "One or more parameter values were invalid: NonKeyAttributes must be specified when ProjectionType is INCLUDE",
            )),
            (ProjectionType::All | ProjectionType::KeysOnly, Some(_)) => {
                Err(Error::validation(format!(
                    "One or more parameter values were invalid: ProjectionType is {}, but NonKeyAttributes is specified",
                    projection_type.as_str()
                )))
            }
            (_, attrs) => Ok(Projection {
                projection_type,
                non_key_attributes: attrs.clone().unwrap_or_default(),
            }),
        }
    }

    pub fn to_spec(&self) -> ProjectionSpec {
        ProjectionSpec {
            projection_type: Some(self.projection_type),
            non_key_attributes: (self.projection_type == ProjectionType::Include)
                .then(|| self.non_key_attributes.clone()),
        }
    }

    pub fn description(&self) -> Value {
        let mut desc = json!({ "ProjectionType": self.projection_type.as_str() });
        if self.projection_type == ProjectionType::Include {
            desc["NonKeyAttributes"] = json!(self.non_key_attributes);
        }
        desc
    }
}

// ---------------------------------------------------------------------------
// SecondaryIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Shares the table's hash key; ordered by its own range key.
    Local,
    /// Independent hash and range key with its own throughput.
    Global,
}

#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    pub name: String,
    pub kind: IndexKind,
    pub key_schema: KeySchema,
    pub projection: Projection,
    pub throughput: Option<Throughput>,
}

impl SecondaryIndex {
    pub fn local(
        spec: &LocalSecondaryIndexSpec,
        definitions: &[AttributeDefinition],
        table_schema: &KeySchema,
    ) -> Result<Self> {
        let key_schema = KeySchema::from_elements(&spec.key_schema, definitions)?;
        if table_schema.range_key.is_none() {
            return Err(Error::validation(
                "One or more parameter values were invalid: Table KeySchema does not have a range key, which is required when specifying a LocalSecondaryIndex",
            ));
        }
        if key_schema.hash_key.name != table_schema.hash_key.name {
            return Err(Error::validation(format!(
                "One or more parameter values were invalid: Index KeySchema does not have the same leading hash key as table KeySchema for index: {}. index hash key: {}, table hash key: {}",
                spec.index_name, key_schema.hash_key.name, table_schema.hash_key.name
            )));
        }
        if key_schema.range_key.is_none() {
            return Err(Error::validation(format!(
                "One or more parameter values were invalid: Index KeySchema does not have a range key for index: {}",
                spec.index_name
            )));
        }
        Ok(SecondaryIndex {
            name: spec.index_name.clone(),
            kind: IndexKind::Local,
            key_schema,
            projection: Projection::from_spec(&spec.projection)?,
            throughput: None,
        })
    }

    pub fn global(
        spec: &GlobalSecondaryIndexSpec,
        definitions: &[AttributeDefinition],
    ) -> Result<Self> {
        Ok(SecondaryIndex {
            name: spec.index_name.clone(),
            kind: IndexKind::Global,
            key_schema: KeySchema::from_elements(&spec.key_schema, definitions)?,
            projection: Projection::from_spec(&spec.projection)?,
            throughput: Some(Throughput::new(spec.provisioned_throughput)?),
        })
    }

    /// Reject an item whose index key attributes have the wrong type.
    /// Missing attributes are fine; the item is simply not indexed.
    pub fn validate_item(&self, item: &Item, table_schema: &KeySchema) -> Result<()> {
        for element in self.key_schema.elements() {
            if let Some(value) = item.get(&element.name, table_schema)
                && value.scalar_type() != Some(element.scalar_type)
            {
                return Err(Error::validation(format!(
                    "One or more parameter values were invalid: Type mismatch for Index Key {} Expected: {} Actual: {} IndexName: {}",
                    element.name,
                    element.scalar_type.as_str(),
                    value.type_name(),
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// The entry key of `item` in this index, or `None` if the item lacks an
    /// index key attribute. The table's range key rides along as the tertiary
    /// component.
    pub fn entry_key(&self, item: &Item, table_schema: &KeySchema) -> Option<Key> {
        let primary = item.get(&self.key_schema.hash_key.name, table_schema)?;
        let range = match &self.key_schema.range_key {
            Some(element) => Some(item.get(&element.name, table_schema)?.clone()),
            None => None,
        };
        Some(Key {
            primary: primary.clone(),
            range,
            tertiary: item.key.range.clone(),
        })
    }

    /// Every indexed item with its entry key, in index order.
    pub fn entries<'a>(
        &self,
        items: impl Iterator<Item = &'a Item>,
        table_schema: &KeySchema,
    ) -> Vec<(Key, &'a Item)> {
        let mut entries: Vec<(Key, &Item)> = items
            .filter_map(|item| self.entry_key(item, table_schema).map(|k| (k, item)))
            .collect();
        entries.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.key.cmp(&b.key)));
        entries
    }

    /// Whether `name` is visible through the projection.
    fn projected(&self, name: &str, table_schema: &KeySchema) -> bool {
        match self.projection.projection_type {
            ProjectionType::All => true,
            ProjectionType::KeysOnly => {
                table_schema.contains(name) || self.key_schema.contains(name)
            }
            ProjectionType::Include => {
                table_schema.contains(name)
                    || self.key_schema.contains(name)
                    || self.projection.non_key_attributes.iter().any(|a| a == name)
            }
        }
    }

    /// The item as visible through this index.
    pub fn project(&self, item: &Item, table_schema: &KeySchema) -> AttributeMap {
        item.to_map(table_schema)
            .into_iter()
            .filter(|(name, _)| self.projected(name, table_schema))
            .collect()
    }

    /// Resume key of an index page: the table key plus the index key.
    pub fn last_evaluated_key(&self, item: &Item, table_schema: &KeySchema) -> Value {
        let map = item.to_map(table_schema);
        value::map_to_json(
            map.iter()
                .filter(|(name, _)| table_schema.contains(name) || self.key_schema.contains(name)),
        )
    }

    pub fn description<'a>(
        &self,
        items: impl Iterator<Item = &'a Item>,
        table_schema: &KeySchema,
    ) -> Value {
        let (count, size) = items
            .filter(|item| self.entry_key(item, table_schema).is_some())
            .fold((0usize, 0usize), |(count, size), item| {
                (count + 1, size + item.size(table_schema))
            });
        let mut desc = json!({
            "IndexName": self.name,
            "KeySchema": self.key_schema.description(),
            "Projection": self.projection.description(),
            "IndexSizeBytes": size,
            "ItemCount": count,
        });
        if let Some(throughput) = &self.throughput {
            desc["ProvisionedThroughput"] = throughput.description();
            desc["IndexStatus"] = json!("ACTIVE");
        }
        desc
    }

    pub fn to_local_spec(&self) -> LocalSecondaryIndexSpec {
        LocalSecondaryIndexSpec {
            index_name: self.name.clone(),
            key_schema: self.key_schema.to_elements(),
            projection: self.projection.to_spec(),
        }
    }

    pub fn to_global_spec(&self) -> Option<GlobalSecondaryIndexSpec> {
        let throughput = self.throughput.as_ref()?;
        Some(GlobalSecondaryIndexSpec {
            index_name: self.name.clone(),
            key_schema: self.key_schema.to_elements(),
            projection: self.projection.to_spec(),
            provisioned_throughput: throughput.spec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definitions() -> Vec<AttributeDefinition> {
        serde_json::from_value(json!([
            {"AttributeName": "id", "AttributeType": "S"},
            {"AttributeName": "age", "AttributeType": "N"},
            {"AttributeName": "score", "AttributeType": "N"},
            {"AttributeName": "city", "AttributeType": "S"}
        ]))
        .unwrap()
    }

    fn table_schema() -> KeySchema {
        let elements: Vec<crate::request::KeySchemaElement> = serde_json::from_value(json!([
            {"AttributeName": "id", "KeyType": "HASH"},
            {"AttributeName": "age", "KeyType": "RANGE"}
        ]))
        .unwrap();
        KeySchema::from_elements(&elements, &definitions()).unwrap()
    }

    fn local(projection: Value) -> SecondaryIndex {
        let spec: LocalSecondaryIndexSpec = serde_json::from_value(json!({
            "IndexName": "by_score",
            "KeySchema": [
                {"AttributeName": "id", "KeyType": "HASH"},
                {"AttributeName": "score", "KeyType": "RANGE"}
            ],
            "Projection": projection
        }))
        .unwrap();
        SecondaryIndex::local(&spec, &definitions(), &table_schema()).unwrap()
    }

    fn item(v: Value) -> Item {
        Item::from_wire(&serde_json::from_value(v).unwrap(), &table_schema()).unwrap()
    }

    #[test]
    fn test_projection_validation() {
        let include: ProjectionSpec =
            serde_json::from_value(json!({"ProjectionType": "INCLUDE"})).unwrap();
        assert!(Projection::from_spec(&include).is_err());

        let keys_only: ProjectionSpec = serde_json::from_value(json!({
            "ProjectionType": "KEYS_ONLY",
            "NonKeyAttributes": ["x"]
        }))
        .unwrap();
        let err = Projection::from_spec(&keys_only).unwrap_err();
        assert!(err.to_string().contains("NonKeyAttributes"));

        let empty: ProjectionSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(Projection::from_spec(&empty).unwrap().projection_type, ProjectionType::All);
    }

    #[test]
    fn test_local_index_requires_same_hash_key() {
        let spec: LocalSecondaryIndexSpec = serde_json::from_value(json!({
            "IndexName": "by_city",
            "KeySchema": [
                {"AttributeName": "city", "KeyType": "HASH"},
                {"AttributeName": "score", "KeyType": "RANGE"}
            ],
            "Projection": {"ProjectionType": "ALL"}
        }))
        .unwrap();
        let err = SecondaryIndex::local(&spec, &definitions(), &table_schema()).unwrap_err();
        assert!(err.to_string().contains("same leading hash key"));
    }

    #[test]
    fn test_sparse_entries() {
        let index = local(json!({"ProjectionType": "ALL"}));
        let items = [
            item(json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "9"}})),
            item(json!({"id": {"S": "a"}, "age": {"N": "2"}})),
            item(json!({"id": {"S": "a"}, "age": {"N": "3"}, "score": {"N": "4"}})),
        ];
        let entries = index.entries(items.iter(), &table_schema());
        let ages: Vec<Value> = entries
            .iter()
            .map(|(_, item)| item.get("age", &table_schema()).unwrap().to_json())
            .collect();
        assert_eq!(ages, vec![json!({"N": "3"}), json!({"N": "1"})]);
    }

    #[test]
    fn test_index_key_type_checked() {
        let index = local(json!({"ProjectionType": "ALL"}));
        let bad = item(json!({"id": {"S": "a"}, "age": {"N": "1"}, "score": {"S": "high"}}));
        let err = index.validate_item(&bad, &table_schema()).unwrap_err();
        assert!(err.to_string().contains("Type mismatch for Index Key score"));

        let missing = item(json!({"id": {"S": "a"}, "age": {"N": "1"}}));
        assert!(index.validate_item(&missing, &table_schema()).is_ok());
    }

    #[test]
    fn test_keys_only_projection() {
        let index = local(json!({"ProjectionType": "KEYS_ONLY"}));
        let item = item(json!({
            "id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "9"}, "city": {"S": "x"}
        }));
        let projected = index.project(&item, &table_schema());
        let names: Vec<&str> = projected.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["age", "id", "score"]);
    }

    #[test]
    fn test_include_projection() {
        let index = local(json!({"ProjectionType": "INCLUDE", "NonKeyAttributes": ["city"]}));
        let item = item(json!({
            "id": {"S": "a"}, "age": {"N": "1"}, "score": {"N": "9"},
            "city": {"S": "x"}, "other": {"S": "y"}
        }));
        let projected = index.project(&item, &table_schema());
        assert!(projected.contains_key("city"));
        assert!(!projected.contains_key("other"));
    }

    #[test]
    fn test_global_description_has_throughput() {
        let spec: GlobalSecondaryIndexSpec = serde_json::from_value(json!({
            "IndexName": "by_city",
            "KeySchema": [{"AttributeName": "city", "KeyType": "HASH"}],
            "Projection": {"ProjectionType": "KEYS_ONLY"},
            "ProvisionedThroughput": {"ReadCapacityUnits": 1, "WriteCapacityUnits": 2}
        }))
        .unwrap();
        let index = SecondaryIndex::global(&spec, &definitions()).unwrap();
        let items = [item(json!({"id": {"S": "a"}, "age": {"N": "1"}, "city": {"S": "x"}}))];
        let desc = index.description(items.iter(), &table_schema());
        assert_eq!(desc["ItemCount"], 1);
        assert_eq!(desc["IndexStatus"], "ACTIVE");
        assert_eq!(desc["ProvisionedThroughput"]["WriteCapacityUnits"], 2);
        assert_eq!(index.to_global_spec().unwrap().index_name, "by_city");
    }
}
