//! Typed attribute values and their wire encoding.
//!
//! On the wire every value is a single-entry object keyed by its type tag:
//! `{"S": "text"}`, `{"N": "12.5"}`, `{"B": "<base64>"}`, and the set forms
//! `SS`, `NS`, `BS` holding arrays. Decoding validates the value; once
//! constructed an [`AttributeValue`] is always well formed.

pub mod number;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::types::ScalarType;

pub use number::Number;

/// Attribute name → wire value, as found in `Item`, `Key`, and
/// `ExclusiveStartKey` payload fields.
pub type WireMap = BTreeMap<String, WireValue>;

/// Attribute name → decoded value.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// The raw, undecoded form of an attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    S(String),
    N(String),
    B(String),
    SS(Vec<String>),
    NS(Vec<String>),
    BS(Vec<String>),
}

/// A decoded attribute value.
///
/// Sets keep their members in insertion order but compare as unordered
/// collections.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    S(String),
    N(Number),
    B(Vec<u8>),
    SS(Vec<String>),
    NS(Vec<Number>),
    BS(Vec<Vec<u8>>),
}

impl AttributeValue {
    /// Decode and validate a wire value.
    pub fn decode(wire: &WireValue) -> Result<Self> {
        let value = match wire {
            WireValue::S(s) => AttributeValue::S(s.clone()),
            WireValue::N(n) => AttributeValue::N(n.parse()?),
            WireValue::B(b) => AttributeValue::B(decode_binary(b)?),
            WireValue::SS(ss) => AttributeValue::SS(ss.clone()),
            WireValue::NS(ns) => AttributeValue::NS(
                ns.iter()
                    .map(|n| n.parse::<Number>())
                    .collect::<Result<Vec<_>>>()?,
            ),
            WireValue::BS(bs) => AttributeValue::BS(
                bs.iter()
                    .map(|b| decode_binary(b))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        value.validate()?;
        Ok(value)
    }

    fn validate(&self) -> Result<()> {
        let (len, duplicated) = match self {
            AttributeValue::SS(v) => (v.len(), has_duplicates(v)),
            AttributeValue::NS(v) => (v.len(), has_duplicates(v)),
            AttributeValue::BS(v) => (v.len(), has_duplicates(v)),
            _ => (1, false),
        };
        if len == 0 {
            return Err(Error::validation(
                "An AttributeValue may not contain an empty set",
            ));
        }
        if duplicated {
            return Err(Error::validation("Input collection contains duplicates"));
        }

        let has_empty = match self {
            AttributeValue::S(s) => s.is_empty(),
            AttributeValue::B(b) => b.is_empty(),
            AttributeValue::SS(v) => v.iter().any(String::is_empty),
            AttributeValue::BS(v) => v.iter().any(Vec::is_empty),
            AttributeValue::N(_) | AttributeValue::NS(_) => false,
        };
        if has_empty {
            return Err(Error::validation(
                "An AttributeValue may not contain an empty string or empty binary",
            ));
        }
        Ok(())
    }

    /// The wire type tag (`"S"`, `"NS"`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::SS(_) => "SS",
            AttributeValue::NS(_) => "NS",
            AttributeValue::BS(_) => "BS",
        }
    }

    /// The scalar type, or `None` for sets.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            AttributeValue::S(_) => Some(ScalarType::S),
            AttributeValue::N(_) => Some(ScalarType::N),
            AttributeValue::B(_) => Some(ScalarType::B),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.scalar_type().is_none()
    }

    pub fn same_type(&self, other: &AttributeValue) -> bool {
        self.type_name() == other.type_name()
    }

    pub fn to_wire(&self) -> WireValue {
        match self {
            AttributeValue::S(s) => WireValue::S(s.clone()),
            AttributeValue::N(n) => WireValue::N(n.to_string()),
            AttributeValue::B(b) => WireValue::B(STANDARD.encode(b)),
            AttributeValue::SS(v) => WireValue::SS(v.clone()),
            AttributeValue::NS(v) => WireValue::NS(v.iter().map(Number::to_string).collect()),
            AttributeValue::BS(v) => WireValue::BS(v.iter().map(|b| STANDARD.encode(b)).collect()),
        }
    }

    /// The JSON form of [`to_wire`](Self::to_wire).
    pub fn to_json(&self) -> Value {
        match self.to_wire() {
            WireValue::S(s) => json!({ "S": s }),
            WireValue::N(n) => json!({ "N": n }),
            WireValue::B(b) => json!({ "B": b }),
            WireValue::SS(v) => json!({ "SS": v }),
            WireValue::NS(v) => json!({ "NS": v }),
            WireValue::BS(v) => json!({ "BS": v }),
        }
    }

    /// Approximate stored size in bytes, used for item size limits and
    /// response budgets.
    pub fn size(&self) -> usize {
        match self {
            AttributeValue::S(s) => s.len(),
            AttributeValue::N(n) => n.to_string().len(),
            AttributeValue::B(b) => b.len(),
            AttributeValue::SS(v) => v.iter().map(String::len).sum(),
            AttributeValue::NS(v) => v.iter().map(|n| n.to_string().len()).sum(),
            AttributeValue::BS(v) => v.iter().map(Vec::len).sum(),
        }
    }

    /// Set union that keeps existing members first and skips duplicates.
    /// Both values must be sets of the same type.
    pub fn set_union(&self, other: &AttributeValue) -> Option<AttributeValue> {
        match (self, other) {
            (AttributeValue::SS(a), AttributeValue::SS(b)) => Some(AttributeValue::SS(union(a, b))),
            (AttributeValue::NS(a), AttributeValue::NS(b)) => Some(AttributeValue::NS(union(a, b))),
            (AttributeValue::BS(a), AttributeValue::BS(b)) => Some(AttributeValue::BS(union(a, b))),
            _ => None,
        }
    }

    /// Set difference. Returns `Some(None)` when every member was removed.
    pub fn set_difference(&self, other: &AttributeValue) -> Option<Option<AttributeValue>> {
        let result = match (self, other) {
            (AttributeValue::SS(a), AttributeValue::SS(b)) => {
                non_empty(difference(a, b)).map(AttributeValue::SS)
            }
            (AttributeValue::NS(a), AttributeValue::NS(b)) => {
                non_empty(difference(a, b)).map(AttributeValue::NS)
            }
            (AttributeValue::BS(a), AttributeValue::BS(b)) => {
                non_empty(difference(a, b)).map(AttributeValue::BS)
            }
            _ => return None,
        };
        Some(result)
    }

    fn type_rank(&self) -> u8 {
        match self {
            AttributeValue::S(_) => 0,
            AttributeValue::N(_) => 1,
            AttributeValue::B(_) => 2,
            AttributeValue::SS(_) => 3,
            AttributeValue::NS(_) => 4,
            AttributeValue::BS(_) => 5,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AttributeValue {}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Values of different types order by type tag. Numbers order by decimal
/// value, strings and binaries byte-wise, sets by their sorted members.
impl Ord for AttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttributeValue::S(a), AttributeValue::S(b)) => a.cmp(b),
            (AttributeValue::N(a), AttributeValue::N(b)) => a.cmp(b),
            (AttributeValue::B(a), AttributeValue::B(b)) => a.cmp(b),
            (AttributeValue::SS(a), AttributeValue::SS(b)) => sorted(a).cmp(&sorted(b)),
            (AttributeValue::NS(a), AttributeValue::NS(b)) => sorted(a).cmp(&sorted(b)),
            (AttributeValue::BS(a), AttributeValue::BS(b)) => sorted(a).cmp(&sorted(b)),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

/// Reject empty attribute names.
pub fn validate_attribute_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("Empty attribute name"));
    }
    Ok(())
}

/// Decode a whole wire map, validating names and values.
pub fn decode_map(map: &WireMap) -> Result<AttributeMap> {
    map.iter()
        .map(|(name, wire)| {
            validate_attribute_name(name)?;
            Ok((name.clone(), AttributeValue::decode(wire)?))
        })
        .collect()
}

/// Render a decoded map as a JSON object of wire values.
pub fn map_to_json<'a>(attrs: impl IntoIterator<Item = (&'a String, &'a AttributeValue)>) -> Value {
    let obj: serde_json::Map<String, Value> = attrs
        .into_iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    Value::Object(obj)
}

fn decode_binary(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| Error::validation(format!("Invalid binary value: {encoded}")))
}

fn has_duplicates<T: Ord>(values: &[T]) -> bool {
    let sorted = sorted(values);
    sorted.windows(2).any(|w| w[0] == w[1])
}

fn sorted<T: Ord>(values: &[T]) -> Vec<&T> {
    let mut refs: Vec<&T> = values.iter().collect();
    refs.sort();
    refs
}

fn union<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = a.to_vec();
    for v in b {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

fn difference<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().filter(|v| !b.contains(v)).cloned().collect()
}

fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() { None } else { Some(v) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: Value) -> Result<AttributeValue> {
        let wire: WireValue = serde_json::from_value(v).unwrap();
        AttributeValue::decode(&wire)
    }

    #[test]
    fn test_decode_all_types() {
        let b64 = STANDARD.encode(b"binary");
        let cases = [
            json!({"S": "hello"}),
            json!({"N": "4.44444"}),
            json!({"B": b64}),
            json!({"SS": ["a", "b"]}),
            json!({"NS": ["1", "2.5"]}),
            json!({"BS": [b64]}),
        ];
        for case in cases {
            let value = decode(case.clone()).unwrap();
            assert_eq!(value.to_json(), case);
        }
    }

    #[test]
    fn test_number_spellings_round_trip() {
        let a = decode(json!({"N": "4.444440"})).unwrap();
        let b = decode(json!({"N": ".444444e1"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_json(), json!({"N": "4.44444"}));
    }

    #[test]
    fn test_binary_with_line_breaks() {
        let value = decode(json!({"B": "YmluYXJ5\n"})).unwrap();
        assert!(matches!(value, AttributeValue::B(ref b) if b == b"binary"));
    }

    #[test]
    fn test_invalid_binary() {
        let err = decode(json!({"B": "!!!"})).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_set_rejected() {
        let err = decode(json!({"SS": []})).unwrap_err();
        assert!(err.to_string().contains("empty set"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = decode(json!({"NS": ["1", "3", "3"]})).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
        let err = decode(json!({"NS": ["1", "1.0"]})).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }

    #[test]
    fn test_empty_string_rejected() {
        let err = decode(json!({"S": ""})).unwrap_err();
        assert!(err.to_string().contains("empty string"));
        let err = decode(json!({"SS": ["x", ""]})).unwrap_err();
        assert!(err.to_string().contains("empty string"));
    }

    #[test]
    fn test_non_numeric_in_set() {
        let err = decode(json!({"NS": ["1", "3", "one"]})).unwrap_err();
        assert!(err.to_string().contains("numeric"));
    }

    #[test]
    fn test_multiple_type_tags_rejected() {
        let parsed: std::result::Result<WireValue, _> =
            serde_json::from_value(json!({"S": "a", "N": "1"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = decode(json!({"SS": ["a", "b"]})).unwrap();
        let b = decode(json!({"SS": ["b", "a"]})).unwrap();
        assert_eq!(a, b);
        let c = decode(json!({"NS": ["1", "2"]})).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_ordering_within_type() {
        let n1 = decode(json!({"N": "9"})).unwrap();
        let n2 = decode(json!({"N": "10"})).unwrap();
        assert!(n1 < n2);
        let s1 = decode(json!({"S": "9"})).unwrap();
        let s2 = decode(json!({"S": "10"})).unwrap();
        assert!(s1 > s2);
    }

    #[test]
    fn test_set_union_keeps_order() {
        let a = decode(json!({"SS": ["1", "2"]})).unwrap();
        let b = decode(json!({"SS": ["3", "2"]})).unwrap();
        let merged = a.set_union(&b).unwrap();
        assert_eq!(merged.to_json(), json!({"SS": ["1", "2", "3"]}));
        let n = decode(json!({"NS": ["1"]})).unwrap();
        assert!(a.set_union(&n).is_none());
    }

    #[test]
    fn test_set_difference() {
        let a = decode(json!({"NS": ["1", "2"]})).unwrap();
        let b = decode(json!({"NS": ["2", "4"]})).unwrap();
        let left = a.set_difference(&b).unwrap().unwrap();
        assert_eq!(left.to_json(), json!({"NS": ["1"]}));
        let all = decode(json!({"NS": ["1", "2"]})).unwrap();
        assert!(a.set_difference(&all).unwrap().is_none());
    }

    #[test]
    fn test_decode_map_rejects_empty_name() {
        let map: WireMap = serde_json::from_value(json!({"": {"SS": ["x"]}})).unwrap();
        let err = decode_map(&map).unwrap_err();
        assert!(err.to_string().contains("Empty attribute name"));
    }
}
