//! Filter compiler.
//!
//! A [`FilterGroup`] tree is resolved against an attribute set and compiled into a
//! [`CompiledFilter`] whose leaves are slot-typed [`Predicate`]s. Every leaf asks "does
//! this record have a row for attribute A that satisfies C", so leaves on different
//! attributes only meet through the boolean combinators.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::clock::{parse_date, parse_timestamp};
use crate::value::{coerce_bool, coerce_id, coerce_number, encode_element, expect_string};
use crate::{
    Attribute, AttributeType, FilterOperator, Id, Slot, SlotValue, TabulaError, TabulaResult,
    is_blank, normalize_text, operators_for_attribute, same_member,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub attribute: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: JsonValue,
}

impl FilterCondition {
    pub fn new(attribute: impl Into<String>, operator: FilterOperator, value: JsonValue) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Condition(FilterCondition),
    Group(FilterGroup),
}

impl From<FilterCondition> for FilterNode {
    fn from(value: FilterCondition) -> Self {
        FilterNode::Condition(value)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(value: FilterGroup) -> Self {
        FilterNode::Group(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub operator: LogicalOperator,
    pub conditions: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn and(conditions: impl IntoIterator<Item = FilterNode>) -> Self {
        Self {
            operator: LogicalOperator::And,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn or(conditions: impl IntoIterator<Item = FilterNode>) -> Self {
        Self {
            operator: LogicalOperator::Or,
            conditions: conditions.into_iter().collect(),
        }
    }
}

/// What to do with a filter or sort that names an attribute the object does not have.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownAttributes {
    /// Drop the condition and keep going (fail-open).
    #[default]
    Ignore,
    /// Fail the whole query with a validation error.
    Reject,
}

impl UnknownAttributes {
    pub(crate) fn resolve<'a>(
        self,
        attributes: &'a [Attribute],
        slug: &str,
        context: &str,
    ) -> TabulaResult<Option<&'a Attribute>> {
        match attributes.iter().find(|attribute| attribute.slug == slug) {
            Some(attribute) => Ok(Some(attribute)),
            None => match self {
                UnknownAttributes::Ignore => {
                    debug!("{context}: dropping unknown attribute '{slug}'");
                    Ok(None)
                }
                UnknownAttributes::Reject => Err(TabulaError::validation(format!(
                    "{context}: unknown attribute '{slug}'"
                ))),
            },
        }
    }
}

/// One coerced comparison operand, already in the slot's domain.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(i64),
    Reference(Id),
    Member(JsonValue),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub attribute_id: Id,
    pub operator: FilterOperator,
    pub operands: Vec<Operand>,
}

impl Predicate {
    pub fn matches(&self, value: Option<&SlotValue>) -> bool {
        match (self.operator, value) {
            (FilterOperator::IsEmpty, value) => value.is_none(),
            (FilterOperator::IsNotEmpty, value) => value.is_some(),
            (operator, None) => operator.is_negated(),
            (operator, Some(value)) => {
                let holds = self.holds(positive(operator), value);
                if operator.is_negated() { !holds } else { holds }
            }
        }
    }

    fn holds(&self, operator: FilterOperator, value: &SlotValue) -> bool {
        let Some(first) = self.operands.first() else {
            return false;
        };
        match value {
            SlotValue::Structured(JsonValue::Array(members)) => match operator {
                FilterOperator::Contains => has_member(members, first),
                FilterOperator::In => self
                    .operands
                    .iter()
                    .any(|operand| has_member(members, operand)),
                _ => false,
            },
            SlotValue::Text(text) => {
                let text = normalize_text(text);
                let Operand::Text(expected) = first else {
                    return false;
                };
                match operator {
                    FilterOperator::Equals => text == *expected,
                    FilterOperator::Contains => text.contains(expected.as_str()),
                    FilterOperator::StartsWith => text.starts_with(expected.as_str()),
                    FilterOperator::EndsWith => text.ends_with(expected.as_str()),
                    FilterOperator::In => self
                        .operands
                        .iter()
                        .any(|operand| matches!(operand, Operand::Text(t) if *t == text)),
                    _ => false,
                }
            }
            SlotValue::Number { value, .. } => match operator {
                FilterOperator::In => self
                    .operands
                    .iter()
                    .any(|operand| matches!(operand, Operand::Number(n) if n == value)),
                _ => match first {
                    Operand::Number(expected) => compare_ordered(operator, value, expected),
                    _ => false,
                },
            },
            SlotValue::Date(micros) => match first {
                Operand::Date(expected) => compare_ordered(operator, micros, expected),
                _ => false,
            },
            SlotValue::Boolean(flag) => {
                operator == FilterOperator::Equals && matches!(first, Operand::Boolean(b) if b == flag)
            }
            SlotValue::Reference(id) => match operator {
                FilterOperator::Equals => matches!(first, Operand::Reference(r) if r == id),
                FilterOperator::In => self
                    .operands
                    .iter()
                    .any(|operand| matches!(operand, Operand::Reference(r) if r == id)),
                _ => false,
            },
            SlotValue::Structured(_) => false,
        }
    }
}

fn has_member(members: &[JsonValue], operand: &Operand) -> bool {
    match operand {
        Operand::Member(candidate) => members.iter().any(|member| same_member(member, candidate)),
        _ => false,
    }
}

fn positive(operator: FilterOperator) -> FilterOperator {
    match operator {
        FilterOperator::NotEquals => FilterOperator::Equals,
        FilterOperator::NotContains => FilterOperator::Contains,
        FilterOperator::NotIn => FilterOperator::In,
        other => other,
    }
}

fn compare_ordered<T: PartialOrd>(operator: FilterOperator, actual: &T, expected: &T) -> bool {
    match operator {
        FilterOperator::Equals => actual == expected,
        FilterOperator::GreaterThan => actual > expected,
        FilterOperator::GreaterThanOrEquals => actual >= expected,
        FilterOperator::LessThan => actual < expected,
        FilterOperator::LessThanOrEquals => actual <= expected,
        _ => false,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompiledFilter {
    All,
    And(Vec<CompiledFilter>),
    Or(Vec<CompiledFilter>),
    Leaf(Predicate),
}

impl CompiledFilter {
    pub fn matches(&self, values: &HashMap<Id, SlotValue>) -> bool {
        match self {
            CompiledFilter::All => true,
            CompiledFilter::And(children) => children.iter().all(|child| child.matches(values)),
            CompiledFilter::Or(children) => children.iter().any(|child| child.matches(values)),
            CompiledFilter::Leaf(predicate) => {
                predicate.matches(values.get(&predicate.attribute_id))
            }
        }
    }

    /// Attributes whose rows must be loaded to evaluate this filter.
    pub fn attribute_ids(&self) -> HashSet<Id> {
        let mut ids = HashSet::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut HashSet<Id>) {
        match self {
            CompiledFilter::All => {}
            CompiledFilter::And(children) | CompiledFilter::Or(children) => {
                for child in children {
                    child.collect_ids(ids);
                }
            }
            CompiledFilter::Leaf(predicate) => {
                ids.insert(predicate.attribute_id);
            }
        }
    }
}

pub fn compile_filter(
    filter: Option<&FilterGroup>,
    attributes: &[Attribute],
    unknown: UnknownAttributes,
) -> TabulaResult<CompiledFilter> {
    let Some(group) = filter else {
        return Ok(CompiledFilter::All);
    };
    Ok(compile_group(group, attributes, unknown)?.unwrap_or(CompiledFilter::All))
}

/// `None` means every condition in the group was dropped.
fn compile_group(
    group: &FilterGroup,
    attributes: &[Attribute],
    unknown: UnknownAttributes,
) -> TabulaResult<Option<CompiledFilter>> {
    if group.conditions.is_empty() {
        return Ok(Some(CompiledFilter::All));
    }
    let mut children = Vec::with_capacity(group.conditions.len());
    for node in &group.conditions {
        let compiled = match node {
            FilterNode::Condition(condition) => compile_condition(condition, attributes, unknown)?,
            FilterNode::Group(nested) => compile_group(nested, attributes, unknown)?,
        };
        if let Some(compiled) = compiled {
            children.push(compiled);
        }
    }
    if children.is_empty() {
        return Ok(None);
    }
    let combined = match group.operator {
        LogicalOperator::And => {
            children.retain(|child| *child != CompiledFilter::All);
            match children.len() {
                0 => CompiledFilter::All,
                1 => children.remove(0),
                _ => CompiledFilter::And(children),
            }
        }
        LogicalOperator::Or => {
            if children.contains(&CompiledFilter::All) {
                CompiledFilter::All
            } else if children.len() == 1 {
                children.remove(0)
            } else {
                CompiledFilter::Or(children)
            }
        }
    };
    Ok(Some(combined))
}

fn compile_condition(
    condition: &FilterCondition,
    attributes: &[Attribute],
    unknown: UnknownAttributes,
) -> TabulaResult<Option<CompiledFilter>> {
    let Some(attribute) = unknown.resolve(attributes, &condition.attribute, "filter")? else {
        return Ok(None);
    };
    let operator = condition.operator;
    if !operators_for_attribute(attribute).contains(&operator) {
        return Err(TabulaError::validation(format!(
            "operator {operator} is not supported on {} ({})",
            attribute.slug, attribute.attribute_type
        )));
    }
    let operands = if operator.takes_operand() {
        coerce_operands(attribute, operator, &condition.value)?
    } else {
        Vec::new()
    };
    Ok(Some(CompiledFilter::Leaf(Predicate {
        attribute_id: attribute.id,
        operator,
        operands,
    })))
}

fn coerce_operands(
    attribute: &Attribute,
    operator: FilterOperator,
    raw: &JsonValue,
) -> TabulaResult<Vec<Operand>> {
    let slug = attribute.slug.as_str();
    if is_blank(raw) {
        return Err(TabulaError::validation(format!(
            "{slug}: operator {operator} requires a value"
        )));
    }
    let raw_operands: Vec<&JsonValue> = match (operator, raw) {
        (FilterOperator::In | FilterOperator::NotIn, JsonValue::Array(items)) => {
            items.iter().collect()
        }
        (_, JsonValue::Array(_)) => {
            return Err(TabulaError::validation(format!(
                "{slug}: operator {operator} takes a single value"
            )));
        }
        (_, other) => vec![other],
    };
    raw_operands
        .into_iter()
        .map(|raw| coerce_operand(attribute, raw))
        .collect()
}

fn coerce_operand(attribute: &Attribute, raw: &JsonValue) -> TabulaResult<Operand> {
    let slug = attribute.slug.as_str();
    let operand = match attribute.storage_slot() {
        Slot::Structured => {
            let member = encode_element(attribute, raw)?.ok_or_else(|| {
                TabulaError::validation(format!("{slug}: empty set member in filter"))
            })?;
            Operand::Member(member)
        }
        Slot::Text => Operand::Text(normalize_text(expect_string(slug, raw)?)),
        Slot::Number => Operand::Number(coerce_number(slug, raw)?),
        Slot::Boolean => Operand::Boolean(coerce_bool(slug, raw)?),
        Slot::Date => {
            let text = expect_string(slug, raw)?;
            Operand::Date(match attribute.attribute_type {
                AttributeType::Date => parse_date(text)?,
                _ => parse_timestamp(text)?,
            })
        }
        Slot::Reference => Operand::Reference(coerce_id(slug, raw)?),
    };
    Ok(operand)
}

/// Free-text search over the text-bearing attributes of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct TextSearch {
    pub needle: String,
    pub attribute_ids: HashSet<Id>,
}

impl TextSearch {
    pub fn matches(&self, values: &HashMap<Id, SlotValue>) -> bool {
        self.attribute_ids
            .iter()
            .any(|id| values.get(id).is_some_and(|slot| mentions(slot, &self.needle)))
    }
}

/// Text-slot attributes, personal names and locations take part in search.
pub fn is_searchable(attribute_type: AttributeType) -> bool {
    attribute_type.slot() == Slot::Text
        || matches!(
            attribute_type,
            AttributeType::PersonalName | AttributeType::Location
        )
}

/// `None` when there is nothing to search for.
pub fn compile_search(search: Option<&str>, attributes: &[Attribute]) -> Option<TextSearch> {
    let needle = normalize_text(search?);
    if needle.is_empty() {
        return None;
    }
    let attribute_ids = attributes
        .iter()
        .filter(|attribute| is_searchable(attribute.attribute_type))
        .map(|attribute| attribute.id)
        .collect();
    Some(TextSearch {
        needle,
        attribute_ids,
    })
}

const SEARCHED_FIELDS: &[&str] = &[
    "fullName",
    "firstName",
    "lastName",
    "line1",
    "line2",
    "city",
    "state",
    "postcode",
    "country",
];

fn mentions(slot: &SlotValue, needle: &str) -> bool {
    let hit = |text: &str| normalize_text(text).contains(needle);
    match slot {
        SlotValue::Text(text) => hit(text),
        SlotValue::Structured(JsonValue::Array(items)) => {
            items.iter().filter_map(JsonValue::as_str).any(hit)
        }
        SlotValue::Structured(JsonValue::Object(fields)) => SEARCHED_FIELDS
            .iter()
            .filter_map(|field| fields.get(*field))
            .filter_map(JsonValue::as_str)
            .any(hit),
        _ => false,
    }
}
