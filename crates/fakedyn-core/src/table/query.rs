//! Query and Scan: candidate selection, filtering, and pagination.

use serde_json::{Map, Value, json};

use super::Table;
use crate::error::{Error, Result};
use crate::filter::{ComparisonOperator, Condition, Filter};
use crate::index::SecondaryIndex;
use crate::item::Item;
use crate::key::Key;
use crate::request::{QueryRequest, ScanRequest};
use crate::sack::Sack;
use crate::types::Select;
use crate::value::{self, WireMap};

/// Operators allowed on the range key of a Query.
const RANGE_OPERATORS: &[ComparisonOperator] = &[
    ComparisonOperator::Eq,
    ComparisonOperator::Le,
    ComparisonOperator::Lt,
    ComparisonOperator::Ge,
    ComparisonOperator::Gt,
    ComparisonOperator::BeginsWith,
    ComparisonOperator::Between,
];

/// Sort position of a candidate: its key in the table or index, then the
/// table key to break ties between index entries.
type Position = (Key, Key);

/// Result of walking the candidates of one page.
struct Page<'a> {
    items: Vec<&'a Item>,
    scanned: usize,
    /// Set when the page stopped early; the last item considered.
    last_evaluated: Option<&'a Item>,
}

impl Table {
    pub fn query(&self, req: &QueryRequest) -> Result<Value> {
        let limit = validate_limit(req.limit)?;
        let index = req.index_name.as_deref().map(|name| self.index(name)).transpose()?;
        let select = resolve_select(req.select, req.attributes_to_get.as_deref(), index.is_some())?;
        let schema = index.map_or(&self.key_schema, |index| &index.key_schema);

        let conditions = req.key_conditions.clone().unwrap_or_default();
        for name in conditions.keys() {
            if !schema.contains(name) {
                return Err(Error::validation(
                    "One or more parameter values were invalid: Query key condition not supported",
                ));
            }
        }

        let hash_name = &schema.hash_key.name;
        let hash_condition = conditions.get(hash_name).ok_or_else(|| {
            Error::validation(format!(
                "One or more parameter values were invalid: Query condition missed key schema element {hash_name}"
            ))
        })?;
        let hash_condition = Condition::parse(hash_condition)?;
        let [hash_value] = hash_condition.values.as_slice() else {
            return Err(key_condition_not_supported());
        };
        if hash_condition.operator != ComparisonOperator::Eq {
            return Err(key_condition_not_supported());
        }
        if hash_value.scalar_type() != Some(schema.hash_key.scalar_type) {
            return Err(Error::validation(
                "One or more parameter values were invalid: Condition parameter type does not match schema type",
            ));
        }

        let range = match &schema.range_key {
            Some(element) => match conditions.get(&element.name) {
                Some(spec) => {
                    let condition = Condition::parse(spec)?;
                    if !RANGE_OPERATORS.contains(&condition.operator) {
                        return Err(key_condition_not_supported());
                    }
                    Some((element.name.as_str(), condition))
                }
                None => None,
            },
            None => None,
        };

        let filter = Filter::parse(req.query_filter.as_ref(), req.conditional_operator)?;
        let start = req
            .exclusive_start_key
            .as_ref()
            .map(|esk| self.start_position(esk, index))
            .transpose()?;
        let forward = req.scan_index_forward.unwrap_or(true);

        let mut candidates: Vec<(Position, &Item)> = match index {
            Some(index) => index
                .entries(self.items.values(), &self.key_schema)
                .into_iter()
                .filter(|(entry_key, _)| entry_key.primary == *hash_value)
                .map(|(entry_key, item)| ((entry_key, item.key.clone()), item))
                .collect(),
            // Keys sort by hash first, and a key without range sorts before
            // every key with the same hash.
            None => self
                .items
                .range(Key::new(hash_value.clone(), None)..)
                .take_while(|(key, _)| key.primary == *hash_value)
                .map(|(key, item)| ((key.clone(), key.clone()), item))
                .collect(),
        };
        if !forward {
            candidates.reverse();
        }
        if let Some(start) = &start {
            candidates.retain(|(position, _)| {
                if forward {
                    position > start
                } else {
                    position < start
                }
            });
        }

        let mut in_range = Vec::with_capacity(candidates.len());
        for (_, item) in candidates {
            let matched = match &range {
                Some((name, condition)) => {
                    condition.evaluate(item.get(name, &self.key_schema), true)?
                }
                None => true,
            };
            if matched {
                in_range.push(item);
            }
        }

        let page = self.collect_page(in_range.into_iter(), &filter, limit)?;
        Ok(self.page_response(
            page,
            select,
            req.attributes_to_get.as_deref(),
            index,
            req.return_consumed_capacity.is_some_and(|r| r.is_requested()),
        ))
    }

    pub fn scan(&self, req: &ScanRequest) -> Result<Value> {
        let limit = validate_limit(req.limit)?;
        let select = resolve_select(req.select, req.attributes_to_get.as_deref(), false)?;
        let filter = Filter::parse(req.scan_filter.as_ref(), req.conditional_operator)?;

        let items: Vec<&Item> = self.items.values().collect();
        let segment = match (req.segment, req.total_segments) {
            (None, None) => &items[..],
            (Some(segment), Some(total)) => {
                let (segment, total) = validate_segments(segment, total)?;
                let chunk = items.len().div_ceil(total);
                let begin = (segment * chunk).min(items.len());
                let end = (begin + chunk).min(items.len());
                &items[begin..end]
            }
            (Some(_), None) => {
                return Err(Error::validation(
                    "The TotalSegments parameter is required but was not present in the request when Segment parameter is present",
                ));
            }
            (None, Some(_)) => {
                return Err(Error::validation(
                    "The Segment parameter is required but was not present in the request when parameter TotalSegments is present",
                ));
            }
        };

        let start = req
            .exclusive_start_key
            .as_ref()
            .map(|esk| self.start_position(esk, None))
            .transpose()?;
        let candidates = segment
            .iter()
            .copied()
            .filter(|item| start.as_ref().is_none_or(|(start, _)| item.key > *start));

        let page = self.collect_page(candidates, &filter, limit)?;
        Ok(self.page_response(
            page,
            select,
            req.attributes_to_get.as_deref(),
            None,
            req.return_consumed_capacity.is_some_and(|r| r.is_requested()),
        ))
    }

    /// Decode an `ExclusiveStartKey` into a sort position.
    fn start_position(&self, esk: &WireMap, index: Option<&SecondaryIndex>) -> Result<Position> {
        let invalid = |err: Error| {
            Error::validation(format!("The provided starting key is invalid: {err}"))
        };
        match index {
            None => {
                let key = Key::from_key_data(esk, &self.key_schema).map_err(invalid)?;
                Ok((key.clone(), key))
            }
            Some(index) => {
                let item = Item::from_wire(esk, &self.key_schema).map_err(invalid)?;
                let entry_key = index.entry_key(&item, &self.key_schema).ok_or_else(|| {
                    Error::validation(
                        "The provided starting key is invalid: The provided key element does not match the schema",
                    )
                })?;
                Ok((entry_key, item.key))
            }
        }
    }

    /// Walk candidates until `limit` matches or the response budget runs out.
    fn collect_page<'a>(
        &'a self,
        candidates: impl Iterator<Item = &'a Item>,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Page<'a>> {
        let mut sack = Sack::new(self.limits.response_size_limit);
        let mut page = Page {
            items: Vec::new(),
            scanned: 0,
            last_evaluated: None,
        };
        let mut last = None;

        for item in candidates {
            if limit.is_some_and(|limit| page.items.len() >= limit) {
                page.last_evaluated = last;
                break;
            }
            if filter.matches(item, &self.key_schema)? {
                let size = item.to_json(&self.key_schema).to_string().len();
                if !sack.try_add(size) {
                    page.last_evaluated = last;
                    break;
                }
                page.items.push(item);
            }
            page.scanned += 1;
            last = Some(item);
        }
        Ok(page)
    }

    fn page_response(
        &self,
        page: Page<'_>,
        select: Select,
        attributes_to_get: Option<&[String]>,
        index: Option<&SecondaryIndex>,
        capacity: bool,
    ) -> Value {
        let mut response = Map::new();
        response.insert("Count".into(), json!(page.items.len()));
        response.insert("ScannedCount".into(), json!(page.scanned));

        if select != Select::Count {
            let items = page
                .items
                .iter()
                .map(|item| match (select, index) {
                    (Select::AllProjectedAttributes, Some(index)) => {
                        value::map_to_json(&index.project(item, &self.key_schema))
                    }
                    _ => self.render(item, attributes_to_get),
                })
                .collect();
            response.insert("Items".into(), Value::Array(items));
        }

        if let Some(last) = page.last_evaluated {
            let key = match index {
                Some(index) => index.last_evaluated_key(last, &self.key_schema),
                None => last.key.to_json(&self.key_schema),
            };
            response.insert("LastEvaluatedKey".into(), key);
        }
        if capacity {
            response.insert(
                "ConsumedCapacity".into(),
                json!({ "CapacityUnits": 1, "TableName": self.name }),
            );
        }
        Value::Object(response)
    }
}

fn key_condition_not_supported() -> Error {
    Error::validation("One or more parameter values were invalid: Query key condition not supported")
}

fn validate_limit(limit: Option<i64>) -> Result<Option<usize>> {
    match limit {
        None => Ok(None),
        Some(limit) if limit >= 1 => Ok(Some(limit as usize)),
        Some(limit) => Err(Error::validation(format!(
            "Value '{limit}' at 'limit' failed to satisfy constraint: Limit must be greater than or equal to 1"
        ))),
    }
}

/// Resolve `Select` against `AttributesToGet`. Index queries default to the
/// projected attributes, everything else to all attributes.
fn resolve_select(
    select: Option<Select>,
    attributes_to_get: Option<&[String]>,
    has_index: bool,
) -> Result<Select> {
    match (select, attributes_to_get) {
        (Some(Select::Count), Some(_)) => Err(Error::validation(
            "Cannot specify the AttributesToGet when choosing to get only the Count",
        )),
        (Some(Select::AllAttributes), Some(_)) => Err(Error::validation(
            "Cannot specify the AttributesToGet when choosing to get ALL_ATTRIBUTES",
        )),
        (Some(Select::AllProjectedAttributes), _) if !has_index => Err(Error::validation(
            "ALL_PROJECTED_ATTRIBUTES can be used only when Querying using an IndexName",
        )),
        (Some(Select::AllProjectedAttributes), Some(_)) => Err(Error::validation(
            "Cannot specify the AttributesToGet when choosing to get ALL_PROJECTED_ATTRIBUTES",
        )),
        (Some(Select::SpecificAttributes), None) => Err(Error::validation(
            "AttributesToGet must be specified when choosing to get SPECIFIC_ATTRIBUTES",
        )),
        (Some(select), _) => Ok(select),
        (None, Some(_)) => Ok(Select::SpecificAttributes),
        (None, None) if has_index => Ok(Select::AllProjectedAttributes),
        (None, None) => Ok(Select::AllAttributes),
    }
}

fn validate_segments(segment: i64, total: i64) -> Result<(usize, usize)> {
    if total < 1 {
        return Err(Error::validation(format!(
            "Value '{total}' at 'totalSegments' failed to satisfy constraint: Member must have value greater than or equal to 1"
        )));
    }
    if segment < 0 || segment >= total {
        return Err(Error::validation(format!(
            "The Segment parameter is zero-based and must be less than parameter TotalSegments: Segment: {segment} is >= TotalSegments: {total}"
        )));
    }
    Ok((segment as usize, total as usize))
}
