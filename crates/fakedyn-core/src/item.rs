//! Items and the `AttributeUpdates` actions of UpdateItem.

use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::key::{Key, KeySchema};
use crate::request::AttributeValueUpdate;
use crate::value::{self, AttributeMap, AttributeValue, WireMap};

/// An individual update action applied to one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// Replace the attribute.
    Put,
    /// Add to a number, or union into a set. Sets the attribute if absent.
    Add,
    /// Remove the attribute, or subtract members from a set.
    Delete,
}

impl FromStr for UpdateAction {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "PUT" => Ok(UpdateAction::Put),
            "ADD" => Ok(UpdateAction::Add),
            "DELETE" => Ok(UpdateAction::Delete),
            _ => Err(()),
        }
    }
}

impl UpdateAction {
    /// Resolve the action of an update entry; absent means PUT.
    pub fn of(name: &str, update: &AttributeValueUpdate) -> Result<Self> {
        match update.action.as_deref() {
            None => Ok(UpdateAction::Put),
            Some(action) => action.parse().map_err(|()| {
                Error::validation(format!(
                    "Unknown action '{action}' in AttributeUpdates.{name}"
                ))
            }),
        }
    }

    /// Whether applying this action to a missing item creates it.
    pub fn creates_item(self) -> bool {
        matches!(self, UpdateAction::Put | UpdateAction::Add)
    }
}

/// A stored item: its key plus every non-key attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: Key,
    attributes: AttributeMap,
}

impl Item {
    /// Decode a full wire item, splitting off the key attributes.
    pub fn from_wire(data: &WireMap, schema: &KeySchema) -> Result<Self> {
        let mut attributes = value::decode_map(data)?;
        let key = Key::from_item(&attributes, schema)?;
        for name in schema.names() {
            attributes.remove(name);
        }
        Ok(Item { key, attributes })
    }

    /// A key-only shell, as created by UpdateItem on a missing key.
    pub fn from_key(key: Key) -> Self {
        Item {
            key,
            attributes: AttributeMap::new(),
        }
    }

    /// Look up any attribute, key attributes included.
    pub fn get<'a>(&'a self, name: &str, schema: &KeySchema) -> Option<&'a AttributeValue> {
        if name == schema.hash_key.name {
            return Some(&self.key.primary);
        }
        if let Some(range) = &schema.range_key
            && name == range.name
        {
            return self.key.range.as_ref();
        }
        self.attributes.get(name)
    }

    /// Non-key attributes only.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// All attributes, key attributes included.
    pub fn to_map(&self, schema: &KeySchema) -> AttributeMap {
        let mut map = self.attributes.clone();
        map.insert(schema.hash_key.name.clone(), self.key.primary.clone());
        if let (Some(element), Some(range)) = (&schema.range_key, &self.key.range) {
            map.insert(element.name.clone(), range.clone());
        }
        map
    }

    pub fn to_json(&self, schema: &KeySchema) -> Value {
        value::map_to_json(&self.to_map(schema))
    }

    /// Only the listed attributes that exist on the item.
    pub fn select_json(&self, names: &[String], schema: &KeySchema) -> Value {
        let map = self.to_map(schema);
        value::map_to_json(map.iter().filter(|(name, _)| names.contains(*name)))
    }

    /// Encoded size: attribute names plus values.
    pub fn size(&self, schema: &KeySchema) -> usize {
        self.to_map(schema)
            .iter()
            .map(|(name, value)| name.len() + value.size())
            .sum()
    }

    /// Apply every update, restoring the previous attributes if any fails.
    pub fn apply_updates<'a>(
        &mut self,
        updates: impl IntoIterator<Item = (&'a String, &'a AttributeValueUpdate)>,
        schema: &KeySchema,
    ) -> Result<()> {
        let snapshot = self.attributes.clone();
        for (name, update) in updates {
            if let Err(err) = self.update(name, update, schema) {
                self.attributes = snapshot;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Apply a single `AttributeUpdates` entry.
    pub fn update(
        &mut self,
        name: &str,
        update: &AttributeValueUpdate,
        schema: &KeySchema,
    ) -> Result<()> {
        if schema.contains(name) {
            return Err(Error::validation(format!(
                "One or more parameter values were invalid: Cannot update attribute {name}. This attribute is part of the key"
            )));
        }
        let action = UpdateAction::of(name, update)?;
        let Some(wire) = &update.value else {
            if action != UpdateAction::Delete {
                return Err(Error::validation(
                    "One or more parameter values were invalid: Only DELETE action is allowed when no attribute value is specified",
                ));
            }
            self.attributes.remove(name);
            return Ok(());
        };
        let value = AttributeValue::decode(wire)?;

        match action {
            UpdateAction::Put => {
                self.attributes.insert(name.to_string(), value);
                Ok(())
            }
            UpdateAction::Add => self.add(name, value),
            UpdateAction::Delete => self.delete(name, value),
        }
    }

    fn add(&mut self, name: &str, value: AttributeValue) -> Result<()> {
        if matches!(value, AttributeValue::S(_) | AttributeValue::B(_)) {
            return Err(Error::validation(format!(
                "One or more parameter values were invalid: Action ADD is not supported for the type {}",
                value.type_name()
            )));
        }
        let Some(old) = self.attributes.get(name) else {
            self.attributes.insert(name.to_string(), value);
            return Ok(());
        };
        check_update_type(old, &value)?;

        let merged = match (old, &value) {
            (AttributeValue::N(a), AttributeValue::N(b)) => AttributeValue::N(a.checked_add(b)?),
            _ => old
                .set_union(&value)
                .ok_or_else(|| Error::validation("Type mismatch for attribute to update"))?,
        };
        self.attributes.insert(name.to_string(), merged);
        Ok(())
    }

    fn delete(&mut self, name: &str, value: AttributeValue) -> Result<()> {
        let Some(old) = self.attributes.get(name) else {
            return ensure_set_action(&value, "DELETE");
        };
        check_update_type(old, &value)?;
        ensure_set_action(old, "DELETE")?;

        match old.set_difference(&value) {
            Some(Some(remaining)) => {
                self.attributes.insert(name.to_string(), remaining);
            }
            Some(None) => {
                self.attributes.remove(name);
            }
            None => return Err(Error::validation("Type mismatch for attribute to update")),
        }
        Ok(())
    }
}

fn check_update_type(old: &AttributeValue, new: &AttributeValue) -> Result<()> {
    if !old.same_type(new) {
        return Err(Error::validation(
            "One or more parameter values were invalid: Type mismatch for attribute to update",
        ));
    }
    Ok(())
}

fn ensure_set_action(value: &AttributeValue, action: &str) -> Result<()> {
    if !value.is_set() {
        return Err(Error::validation(format!(
            "One or more parameter values were invalid: Action {action} is not supported for the type {}",
            value.type_name()
        )));
    }
    Ok(())
}
