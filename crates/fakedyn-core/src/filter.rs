//! Comparison predicates for Query key conditions, `QueryFilter`, and
//! `ScanFilter`.
//!
//! Every operator has a fixed argument arity and a set of argument types it
//! accepts; both are checked once when the condition is parsed. Evaluation
//! against an item attribute never fails unless the caller asks for strict
//! type checking, which Query does for its range key condition.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::Item;
use crate::key::KeySchema;
use crate::request::{ConditionSpec, Conditions};
use crate::types::ScalarType;
use crate::value::{self, AttributeValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    NotNull,
    Null,
    Contains,
    NotContains,
    BeginsWith,
    In,
    Between,
}

/// How the conditions of a filter combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionalOperator {
    #[default]
    And,
    Or,
}

const SCALARS: &[ScalarType] = &[ScalarType::S, ScalarType::N, ScalarType::B];
const PREFIXABLE: &[ScalarType] = &[ScalarType::S, ScalarType::B];

impl ComparisonOperator {
    /// Minimum and maximum number of arguments.
    fn arity(self) -> (usize, usize) {
        use ComparisonOperator::*;
        match self {
            Null | NotNull => (0, 0),
            Between => (2, 2),
            In => (1, usize::MAX),
            Eq | Ne | Le | Lt | Ge | Gt | Contains | NotContains | BeginsWith => (1, 1),
        }
    }

    fn supported_types(self) -> &'static [ScalarType] {
        match self {
            ComparisonOperator::BeginsWith => PREFIXABLE,
            _ => SCALARS,
        }
    }

    /// Operators that order or prefix-match their argument against the
    /// attribute and so require both to have the same type.
    fn is_typed(self) -> bool {
        use ComparisonOperator::*;
        matches!(self, Eq | Le | Lt | Ge | Gt | Between | BeginsWith)
    }
}

/// A parsed condition: an operator and its decoded arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operator: ComparisonOperator,
    pub values: Vec<AttributeValue>,
}

impl Condition {
    pub fn parse(spec: &ConditionSpec) -> Result<Self> {
        let operator = spec.comparison_operator;
        let wire = spec.attribute_value_list.as_deref().unwrap_or_default();

        let (min, max) = operator.arity();
        if wire.len() < min || wire.len() > max {
            return Err(Error::validation(
                "One or more parameter values were invalid: The attempted filter operation is not supported for the provided filter argument count",
            ));
        }

        let values = wire
            .iter()
            .map(AttributeValue::decode)
            .collect::<Result<Vec<_>>>()?;
        let supported = operator.supported_types();
        for v in &values {
            if !v.scalar_type().is_some_and(|t| supported.contains(&t)) {
                return Err(Error::validation(
                    "One or more parameter values were invalid: The attempted filter operation is not supported for the provided type",
                ));
            }
        }

        Ok(Condition { operator, values })
    }

    /// Evaluate against an attribute, `None` when the attribute is absent.
    ///
    /// An absent attribute satisfies only `NULL`. With
    /// `fail_on_type_mismatch`, a typed comparison whose argument type differs
    /// from the attribute's is an error instead of a non-match.
    pub fn evaluate(
        &self,
        target: Option<&AttributeValue>,
        fail_on_type_mismatch: bool,
    ) -> Result<bool> {
        use ComparisonOperator::*;

        let Some(target) = target else {
            return Ok(self.operator == Null);
        };

        if self.operator.is_typed() && !self.values.iter().all(|v| v.same_type(target)) {
            if fail_on_type_mismatch {
                return Err(Error::validation(
                    "One or more parameter values were invalid: Condition parameter type does not match schema type",
                ));
            }
            return Ok(false);
        }

        let matched = match (self.operator, self.values.as_slice()) {
            (Null, _) => false,
            (NotNull, _) => true,
            (Eq, [v]) => target == v,
            (Ne, [v]) => target != v,
            (Le, [v]) => target <= v,
            (Lt, [v]) => target < v,
            (Ge, [v]) => target >= v,
            (Gt, [v]) => target > v,
            (Between, [low, high]) => low <= target && target <= high,
            (BeginsWith, [v]) => begins_with(target, v),
            (Contains, [v]) => contains(target, v).unwrap_or(false),
            (NotContains, [v]) => contains(target, v).is_some_and(|found| !found),
            (In, values) => values.contains(target),
            _ => false,
        };
        Ok(matched)
    }
}

fn begins_with(target: &AttributeValue, prefix: &AttributeValue) -> bool {
    match (target, prefix) {
        (AttributeValue::S(s), AttributeValue::S(p)) => s.starts_with(p.as_str()),
        (AttributeValue::B(b), AttributeValue::B(p)) => b.starts_with(p),
        _ => false,
    }
}

/// Substring, byte-window, or set-membership test. `None` when the argument
/// type cannot occur inside the attribute.
fn contains(target: &AttributeValue, needle: &AttributeValue) -> Option<bool> {
    match (target, needle) {
        (AttributeValue::S(s), AttributeValue::S(n)) => Some(s.contains(n.as_str())),
        (AttributeValue::B(b), AttributeValue::B(n)) => {
            Some(b.windows(n.len()).any(|window| window == n.as_slice()))
        }
        (AttributeValue::SS(set), AttributeValue::S(n)) => Some(set.contains(n)),
        (AttributeValue::NS(set), AttributeValue::N(n)) => Some(set.contains(n)),
        (AttributeValue::BS(set), AttributeValue::B(n)) => Some(set.contains(n)),
        _ => None,
    }
}

/// A set of named attribute conditions joined by AND or OR.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
    operator: ConditionalOperator,
}

impl Filter {
    pub fn parse(
        conditions: Option<&Conditions>,
        operator: Option<ConditionalOperator>,
    ) -> Result<Self> {
        let conditions = conditions
            .into_iter()
            .flatten()
            .map(|(name, spec)| {
                value::validate_attribute_name(name)?;
                Ok((name.clone(), Condition::parse(spec)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Filter {
            conditions,
            operator: operator.unwrap_or_default(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether the item passes. An empty filter passes everything.
    pub fn matches(&self, item: &Item, schema: &KeySchema) -> Result<bool> {
        if self.conditions.is_empty() {
            return Ok(true);
        }
        for (name, condition) in &self.conditions {
            let matched = condition.evaluate(item.get(name, schema), false)?;
            match self.operator {
                ConditionalOperator::And if !matched => return Ok(false),
                ConditionalOperator::Or if matched => return Ok(true),
                _ => {}
            }
        }
        Ok(self.operator == ConditionalOperator::And)
    }
}
