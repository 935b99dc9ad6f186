//! Attribute type registry.
//!
//! Every tenant-defined field type maps to exactly one physical storage [`Slot`], and the
//! slot decides which [`FilterOperator`]s are legal. The compilers only ever branch on
//! slots, never on individual types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Attribute, TabulaError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Text,
    Number,
    Currency,
    Rating,
    Checkbox,
    Date,
    Timestamp,
    EmailAddress,
    PhoneNumber,
    Domain,
    Select,
    Status,
    PersonalName,
    Location,
    RecordReference,
    ActorReference,
    Interaction,
}

impl AttributeType {
    pub const ALL: [AttributeType; 17] = [
        AttributeType::Text,
        AttributeType::Number,
        AttributeType::Currency,
        AttributeType::Rating,
        AttributeType::Checkbox,
        AttributeType::Date,
        AttributeType::Timestamp,
        AttributeType::EmailAddress,
        AttributeType::PhoneNumber,
        AttributeType::Domain,
        AttributeType::Select,
        AttributeType::Status,
        AttributeType::PersonalName,
        AttributeType::Location,
        AttributeType::RecordReference,
        AttributeType::ActorReference,
        AttributeType::Interaction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::Text => "text",
            AttributeType::Number => "number",
            AttributeType::Currency => "currency",
            AttributeType::Rating => "rating",
            AttributeType::Checkbox => "checkbox",
            AttributeType::Date => "date",
            AttributeType::Timestamp => "timestamp",
            AttributeType::EmailAddress => "email_address",
            AttributeType::PhoneNumber => "phone_number",
            AttributeType::Domain => "domain",
            AttributeType::Select => "select",
            AttributeType::Status => "status",
            AttributeType::PersonalName => "personal_name",
            AttributeType::Location => "location",
            AttributeType::RecordReference => "record_reference",
            AttributeType::ActorReference => "actor_reference",
            AttributeType::Interaction => "interaction",
        }
    }

    pub fn slot(self) -> Slot {
        slot_for(self)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = TabulaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AttributeType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| TabulaError::validation(format!("unknown attribute type '{value}'")))
    }
}

/// Physical storage kind of a value row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Text,
    Number,
    Boolean,
    Date,
    Structured,
    Reference,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::GreaterThanOrEquals => "greater_than_or_equals",
            FilterOperator::LessThan => "less_than",
            FilterOperator::LessThanOrEquals => "less_than_or_equals",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::IsEmpty => "is_empty",
            FilterOperator::IsNotEmpty => "is_not_empty",
        }
    }

    /// Negated operators hold for records that have no value at all.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            FilterOperator::NotEquals | FilterOperator::NotContains | FilterOperator::NotIn
        )
    }

    pub fn takes_operand(self) -> bool {
        !matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TEXT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::Contains,
    FilterOperator::NotContains,
    FilterOperator::StartsWith,
    FilterOperator::EndsWith,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const NUMBER_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::GreaterThan,
    FilterOperator::GreaterThanOrEquals,
    FilterOperator::LessThan,
    FilterOperator::LessThanOrEquals,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const BOOLEAN_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const DATE_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::GreaterThan,
    FilterOperator::GreaterThanOrEquals,
    FilterOperator::LessThan,
    FilterOperator::LessThanOrEquals,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const REFERENCE_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const SET_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Contains,
    FilterOperator::NotContains,
    FilterOperator::In,
    FilterOperator::NotIn,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const EXISTENCE_OPERATORS: &[FilterOperator] =
    &[FilterOperator::IsEmpty, FilterOperator::IsNotEmpty];

pub fn slot_for(attribute_type: AttributeType) -> Slot {
    match attribute_type {
        AttributeType::Text
        | AttributeType::EmailAddress
        | AttributeType::PhoneNumber
        | AttributeType::Domain => Slot::Text,
        AttributeType::Number | AttributeType::Currency | AttributeType::Rating => Slot::Number,
        AttributeType::Checkbox => Slot::Boolean,
        AttributeType::Date | AttributeType::Timestamp => Slot::Date,
        AttributeType::PersonalName | AttributeType::Location | AttributeType::Interaction => {
            Slot::Structured
        }
        AttributeType::Select
        | AttributeType::Status
        | AttributeType::RecordReference
        | AttributeType::ActorReference => Slot::Reference,
    }
}

pub fn operators_for(attribute_type: AttributeType) -> &'static [FilterOperator] {
    match slot_for(attribute_type) {
        Slot::Text => TEXT_OPERATORS,
        Slot::Number => NUMBER_OPERATORS,
        Slot::Boolean => BOOLEAN_OPERATORS,
        Slot::Date => DATE_OPERATORS,
        Slot::Reference => REFERENCE_OPERATORS,
        Slot::Structured => EXISTENCE_OPERATORS,
    }
}

/// Multiselect attributes store a set, so they get set-membership operators.
pub fn operators_for_attribute(attribute: &Attribute) -> &'static [FilterOperator] {
    if attribute.is_multiselect {
        SET_OPERATORS
    } else {
        operators_for(attribute.attribute_type)
    }
}

pub fn supports_multiselect(attribute_type: AttributeType) -> bool {
    matches!(
        attribute_type,
        AttributeType::Select
            | AttributeType::RecordReference
            | AttributeType::ActorReference
            | AttributeType::EmailAddress
            | AttributeType::PhoneNumber
            | AttributeType::Domain
    )
}

pub fn is_sortable(attribute_type: AttributeType) -> bool {
    slot_for(attribute_type) != Slot::Structured
}
