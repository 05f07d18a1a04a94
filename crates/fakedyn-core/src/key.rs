//! Key schemas and composite keys.

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::request::{AttributeDefinition, KeySchemaElement};
use crate::types::{KeyType, ScalarType};
use crate::value::{AttributeMap, AttributeValue, WireMap};

/// A key attribute name and its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyElement {
    pub name: String,
    pub scalar_type: ScalarType,
}

/// Hash key plus optional range key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    pub hash_key: KeyElement,
    pub range_key: Option<KeyElement>,
}

impl KeySchema {
    /// Build a schema from its wire elements, resolving types against the
    /// table's attribute definitions.
    pub fn from_elements(
        elements: &[KeySchemaElement],
        definitions: &[AttributeDefinition],
    ) -> Result<Self> {
        let (hash, range) = match elements {
            [hash] => (hash, None),
            [hash, range] => (hash, Some(range)),
            _ => {
                return Err(Error::validation(format!(
                    "Invalid KeySchema: expected 1 or 2 elements, got {}",
                    elements.len()
                )));
            }
        };
        if hash.key_type != KeyType::Hash {
            return Err(Error::validation(
                "Invalid KeySchema: The first KeySchemaElement is not a HASH key type",
            ));
        }
        if let Some(range) = range {
            if range.key_type != KeyType::Range {
                return Err(Error::validation(
                    "Invalid KeySchema: The second KeySchemaElement is not a RANGE key type",
                ));
            }
            if range.attribute_name == hash.attribute_name {
                return Err(Error::validation(
                    "Invalid KeySchema: Both the Hash Key and the Range Key element in the KeySchema have the same name",
                ));
            }
        }

        let resolve = |element: &KeySchemaElement| -> Result<KeyElement> {
            let definition = definitions
                .iter()
                .find(|d| d.attribute_name == element.attribute_name)
                .ok_or_else(|| {
                    Error::validation(
                        "One or more parameter values were invalid: Some index key attributes are not defined in AttributeDefinitions",
                    )
                })?;
            Ok(KeyElement {
                name: element.attribute_name.clone(),
                scalar_type: definition.attribute_type,
            })
        };

        Ok(KeySchema {
            hash_key: resolve(hash)?,
            range_key: range.map(resolve).transpose()?,
        })
    }

    /// Key attribute names, hash first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash_key.name.as_str())
            .chain(self.range_key.iter().map(|k| k.name.as_str()))
    }

    pub fn elements(&self) -> impl Iterator<Item = &KeyElement> {
        std::iter::once(&self.hash_key).chain(self.range_key.iter())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn to_elements(&self) -> Vec<KeySchemaElement> {
        let mut out = vec![KeySchemaElement {
            attribute_name: self.hash_key.name.clone(),
            key_type: KeyType::Hash,
        }];
        if let Some(range) = &self.range_key {
            out.push(KeySchemaElement {
                attribute_name: range.name.clone(),
                key_type: KeyType::Range,
            });
        }
        out
    }

    pub fn description(&self) -> Value {
        let elements: Vec<Value> = self
            .elements()
            .enumerate()
            .map(|(i, e)| {
                json!({
                    "AttributeName": e.name,
                    "KeyType": if i == 0 { "HASH" } else { "RANGE" },
                })
            })
            .collect();
        Value::Array(elements)
    }
}

/// One to three cooperating values ordered component by component.
///
/// Table keys use `primary` and `range`. Index entry keys additionally carry
/// the table's range key in `tertiary` so entries sharing an index key still
/// order deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key {
    pub primary: AttributeValue,
    pub range: Option<AttributeValue>,
    pub tertiary: Option<AttributeValue>,
}

impl Key {
    pub fn new(primary: AttributeValue, range: Option<AttributeValue>) -> Self {
        Key {
            primary,
            range,
            tertiary: None,
        }
    }

    /// Extract the key from a full item's attributes.
    pub fn from_item(attrs: &AttributeMap, schema: &KeySchema) -> Result<Self> {
        let extract = |element: &KeyElement| -> Result<AttributeValue> {
            let value = attrs.get(&element.name).ok_or_else(|| {
                Error::validation(format!(
                    "One or more parameter values were invalid: Missing the key {} in the item",
                    element.name
                ))
            })?;
            check_key_type(element, value)?;
            Ok(value.clone())
        };
        Ok(Key::new(
            extract(&schema.hash_key)?,
            schema.range_key.as_ref().map(extract).transpose()?,
        ))
    }

    /// Decode a `Key` payload member, which must name exactly the schema's
    /// key attributes.
    pub fn from_key_data(data: &WireMap, schema: &KeySchema) -> Result<Self> {
        let expected = schema.names().count();
        if data.len() != expected || !schema.names().all(|n| data.contains_key(n)) {
            return Err(Error::validation(
                "The provided key element does not match the schema",
            ));
        }
        let attrs = crate::value::decode_map(data)?;
        Key::from_item(&attrs, schema)
    }

    /// Render as `{name: value}` pairs using the schema's attribute names.
    pub fn to_json(&self, schema: &KeySchema) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert(schema.hash_key.name.clone(), self.primary.to_json());
        if let (Some(element), Some(range)) = (&schema.range_key, &self.range) {
            obj.insert(element.name.clone(), range.to_json());
        }
        Value::Object(obj)
    }

    /// Approximate size of the key values.
    pub fn size(&self) -> usize {
        self.primary.size() + self.range.as_ref().map_or(0, AttributeValue::size)
    }
}

fn check_key_type(element: &KeyElement, value: &AttributeValue) -> Result<()> {
    if value.scalar_type() != Some(element.scalar_type) {
        return Err(Error::validation(format!(
            "One or more parameter values were invalid: Type mismatch for key {} expected: {} actual: {}",
            element.name,
            element.scalar_type.as_str(),
            value.type_name()
        )));
    }
    Ok(())
}
