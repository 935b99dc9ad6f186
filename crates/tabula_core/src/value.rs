//! Value codec.
//!
//! Writes go `JSON -> SlotValue` through [`encode_value`]; reads go
//! `SlotValue -> AttributeValue` through [`decode_value`]. Nothing above this module
//! touches raw slot columns.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use unicode_normalization::UnicodeNormalization;

use crate::clock::{format_date, format_timestamp, parse_date, parse_timestamp};
use crate::{Attribute, AttributeType, Id, Slot, TabulaError, TabulaResult, slot_for};

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_RATING_MAX: u64 = 5;

/// Contents of one physical value row, already decoded from its columns.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotValue {
    Text(String),
    /// `unit` carries the ISO-4217 code for currency rows.
    Number { value: f64, unit: Option<String> },
    Boolean(bool),
    /// Microseconds since the Unix epoch, UTC.
    Date(i64),
    Structured(JsonValue),
    Reference(Id),
}

impl SlotValue {
    pub fn slot(&self) -> Slot {
        match self {
            SlotValue::Text(_) => Slot::Text,
            SlotValue::Number { .. } => Slot::Number,
            SlotValue::Boolean(_) => Slot::Boolean,
            SlotValue::Date(_) => Slot::Date,
            SlotValue::Structured(_) => Slot::Structured,
            SlotValue::Reference(_) => Slot::Reference,
        }
    }

    pub fn number(value: f64) -> Self {
        SlotValue::Number { value, unit: None }
    }

    /// Canonical text used for uniqueness and natural-key matching.
    pub fn canonical_key(&self) -> String {
        match self {
            SlotValue::Text(text) => normalize_text(text),
            SlotValue::Number { value, unit } => match unit {
                Some(unit) => format!("{value}:{unit}"),
                None => value.to_string(),
            },
            SlotValue::Boolean(value) => value.to_string(),
            SlotValue::Date(micros) => micros.to_string(),
            SlotValue::Structured(json) => json.to_string(),
            SlotValue::Reference(id) => id.to_uuid_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    #[serde(serialize_with = "serialize_number")]
    pub amount: f64,
    pub currency: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl PersonalName {
    fn normalized(self) -> Self {
        let first_name = non_blank(self.first_name);
        let last_name = non_blank(self.last_name);
        let full_name = non_blank(self.full_name).or_else(|| {
            let parts: Vec<&str> = [first_name.as_deref(), last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });
        Self {
            first_name,
            last_name,
            full_name,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.full_name.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Location {
    fn normalized(self) -> Self {
        Self {
            line1: non_blank(self.line1),
            line2: non_blank(self.line2),
            city: non_blank(self.city),
            state: non_blank(self.state),
            postcode: non_blank(self.postcode),
            country: non_blank(self.country),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Location::default()
    }
}

/// A hydrated attribute value in its public shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    #[serde(serialize_with = "serialize_number")]
    Number(f64),
    Currency(Currency),
    Boolean(bool),
    /// ISO-8601 date or RFC 3339 timestamp.
    Date(String),
    Reference(Id),
    PersonalName(PersonalName),
    Location(Location),
    Json(JsonValue),
    Multi(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(value) => Some(*value),
            AttributeValue::Currency(currency) => Some(currency.amount),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) | AttributeValue::Date(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Id> {
        match self {
            AttributeValue::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

/// Whole numbers that fit an `i64` serialize as JSON integers, so `100` reads back as `100`.
fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && *value >= i64::MIN as f64 && *value < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Encodes a raw JSON value for `attribute`; `None` means "absent, write no row".
pub fn encode_value(attribute: &Attribute, raw: &JsonValue) -> TabulaResult<Option<SlotValue>> {
    if is_blank(raw) {
        return Ok(None);
    }
    if !attribute.is_multiselect {
        return encode_single(attribute, raw);
    }
    let items: Vec<&JsonValue> = match raw {
        JsonValue::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut set: Vec<JsonValue> = Vec::new();
    for item in items {
        let Some(element) = encode_element(attribute, item)? else {
            continue;
        };
        if !set.iter().any(|member| same_member(member, &element)) {
            set.push(element);
        }
    }
    if set.is_empty() {
        return Ok(None);
    }
    Ok(Some(SlotValue::Structured(JsonValue::Array(set))))
}

/// Canonical JSON shape of one member of a multiselect set.
pub fn encode_element(attribute: &Attribute, raw: &JsonValue) -> TabulaResult<Option<JsonValue>> {
    if is_blank(raw) {
        return Ok(None);
    }
    let Some(slot) = encode_single(attribute, raw)? else {
        return Ok(None);
    };
    decode_single(attribute.attribute_type, &slot).map(|value| Some(value.to_json()))
}

fn encode_single(attribute: &Attribute, raw: &JsonValue) -> TabulaResult<Option<SlotValue>> {
    let slug = attribute.slug.as_str();
    let value = match attribute.attribute_type {
        AttributeType::Text | AttributeType::PhoneNumber => {
            SlotValue::Text(expect_string(slug, raw)?.to_string())
        }
        AttributeType::EmailAddress => {
            let email = expect_string(slug, raw)?.trim();
            match email.split_once('@') {
                Some((local, domain))
                    if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
                _ => {
                    return Err(TabulaError::validation(format!(
                        "{slug}: '{email}' is not an email address"
                    )));
                }
            }
            SlotValue::Text(email.to_string())
        }
        AttributeType::Domain => SlotValue::Text(normalize_domain(expect_string(slug, raw)?)),
        AttributeType::Number => SlotValue::number(coerce_number(slug, raw)?),
        AttributeType::Rating => {
            let rating = coerce_number(slug, raw)?;
            let max = attribute
                .config_u64("max")
                .unwrap_or(DEFAULT_RATING_MAX) as f64;
            if rating.fract() != 0.0 || rating < 0.0 || rating > max {
                return Err(TabulaError::validation(format!(
                    "{slug}: rating must be a whole number between 0 and {max}"
                )));
            }
            SlotValue::number(rating)
        }
        AttributeType::Currency => {
            let default_code = attribute.config_str("currency").unwrap_or(DEFAULT_CURRENCY);
            let (amount, code) = match raw {
                JsonValue::Object(map) => {
                    let amount = map
                        .get("amount")
                        .ok_or_else(|| TabulaError::validation(format!("{slug}: amount is required")))?;
                    let code = match map.get("currency") {
                        Some(code) => expect_string(slug, code)?,
                        None => default_code,
                    };
                    (coerce_number(slug, amount)?, code)
                }
                other => (coerce_number(slug, other)?, default_code),
            };
            SlotValue::Number {
                value: amount,
                unit: Some(normalize_currency_code(slug, code)?),
            }
        }
        AttributeType::Checkbox => SlotValue::Boolean(coerce_bool(slug, raw)?),
        AttributeType::Date => SlotValue::Date(parse_date(expect_string(slug, raw)?)?),
        AttributeType::Timestamp => SlotValue::Date(parse_timestamp(expect_string(slug, raw)?)?),
        AttributeType::Select => {
            let id = coerce_id(slug, raw)?;
            if !attribute.has_option(id) {
                return Err(TabulaError::validation(format!(
                    "{slug}: {id} is not an option of this attribute"
                )));
            }
            SlotValue::Reference(id)
        }
        AttributeType::Status => {
            let id = coerce_id(slug, raw)?;
            if !attribute.has_status(id) {
                return Err(TabulaError::validation(format!(
                    "{slug}: {id} is not a status of this attribute"
                )));
            }
            SlotValue::Reference(id)
        }
        AttributeType::RecordReference | AttributeType::ActorReference => {
            SlotValue::Reference(coerce_id(slug, raw)?)
        }
        AttributeType::PersonalName => {
            let name = match raw {
                JsonValue::String(full_name) => PersonalName {
                    full_name: Some(full_name.clone()),
                    ..PersonalName::default()
                },
                other => serde_json::from_value::<PersonalName>(other.clone()).map_err(|err| {
                    TabulaError::validation(format!("{slug}: invalid personal name: {err}"))
                })?,
            }
            .normalized();
            if name.is_empty() {
                return Ok(None);
            }
            SlotValue::Structured(serde_json::to_value(name)?)
        }
        AttributeType::Location => {
            let location = serde_json::from_value::<Location>(raw.clone())
                .map_err(|err| TabulaError::validation(format!("{slug}: invalid location: {err}")))?
                .normalized();
            if location.is_empty() {
                return Ok(None);
            }
            SlotValue::Structured(serde_json::to_value(location)?)
        }
        AttributeType::Interaction => {
            if !raw.is_object() {
                return Err(TabulaError::validation(format!(
                    "{slug}: interaction must be an object"
                )));
            }
            SlotValue::Structured(raw.clone())
        }
    };
    Ok(Some(value))
}

/// Maps a stored row back to the attribute's public shape.
pub fn decode_value(attribute: &Attribute, slot: &SlotValue) -> TabulaResult<AttributeValue> {
    if !attribute.is_multiselect {
        return decode_single(attribute.attribute_type, slot);
    }
    let SlotValue::Structured(JsonValue::Array(items)) = slot else {
        return Err(TabulaError::storage(format!(
            "{}: multiselect row is not a set",
            attribute.slug
        )));
    };
    items
        .iter()
        .map(|item| decode_element(attribute, item))
        .collect::<TabulaResult<Vec<_>>>()
        .map(AttributeValue::Multi)
}

fn decode_single(attribute_type: AttributeType, slot: &SlotValue) -> TabulaResult<AttributeValue> {
    if slot.slot() != slot_for(attribute_type) {
        return Err(TabulaError::storage(format!(
            "{attribute_type} value stored in {:?} slot",
            slot.slot()
        )));
    }
    let value = match slot {
        SlotValue::Text(text) => AttributeValue::Text(text.clone()),
        SlotValue::Number { value, unit } => match attribute_type {
            AttributeType::Currency => AttributeValue::Currency(Currency {
                amount: *value,
                currency: unit.clone().unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            }),
            _ => AttributeValue::Number(*value),
        },
        SlotValue::Boolean(value) => AttributeValue::Boolean(*value),
        SlotValue::Date(micros) => match attribute_type {
            AttributeType::Date => AttributeValue::Date(format_date(*micros)?),
            _ => AttributeValue::Date(format_timestamp(*micros)?),
        },
        SlotValue::Reference(id) => AttributeValue::Reference(*id),
        SlotValue::Structured(json) => match attribute_type {
            AttributeType::PersonalName => {
                AttributeValue::PersonalName(serde_json::from_value(json.clone())?)
            }
            AttributeType::Location => AttributeValue::Location(serde_json::from_value(json.clone())?),
            _ => AttributeValue::Json(json.clone()),
        },
    };
    Ok(value)
}

fn decode_element(attribute: &Attribute, item: &JsonValue) -> TabulaResult<AttributeValue> {
    match (slot_for(attribute.attribute_type), item) {
        (Slot::Reference, JsonValue::String(id)) => Ok(AttributeValue::Reference(Id::from_uuid_str(id)?)),
        (Slot::Text, JsonValue::String(text)) => Ok(AttributeValue::Text(text.clone())),
        _ => Ok(AttributeValue::Json(item.clone())),
    }
}

/// Set membership test; string members compare through [`normalize_text`].
pub fn same_member(stored: &JsonValue, candidate: &JsonValue) -> bool {
    match (stored, candidate) {
        (JsonValue::String(stored), JsonValue::String(candidate)) => {
            normalize_text(stored) == normalize_text(candidate)
        }
        _ => stored == candidate,
    }
}

/// Null, blank strings, empty arrays and empty objects all mean "no value".
pub fn is_blank(raw: &JsonValue) -> bool {
    match raw {
        JsonValue::Null => true,
        JsonValue::String(text) => text.trim().is_empty(),
        JsonValue::Array(items) => items.iter().all(is_blank),
        JsonValue::Object(map) => map.values().all(is_blank),
        _ => false,
    }
}

/// Case- and composition-insensitive form used by every text comparison.
pub fn normalize_text(value: &str) -> String {
    value.trim().nfc().collect::<String>().to_lowercase()
}

pub(crate) fn coerce_number(slug: &str, raw: &JsonValue) -> TabulaResult<f64> {
    let number = match raw {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse::<f64>().ok(),
        JsonValue::Object(map) => map.get("amount").and_then(|amount| match amount {
            JsonValue::Number(number) => number.as_f64(),
            JsonValue::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }),
        _ => None,
    };
    match number {
        Some(number) if number.is_finite() => Ok(number),
        _ => Err(TabulaError::validation(format!(
            "{slug}: expected a number, got {raw}"
        ))),
    }
}

pub(crate) fn coerce_bool(slug: &str, raw: &JsonValue) -> TabulaResult<bool> {
    match raw {
        JsonValue::Bool(value) => Ok(*value),
        JsonValue::String(text) if text.eq_ignore_ascii_case("true") => Ok(true),
        JsonValue::String(text) if text.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(TabulaError::validation(format!(
            "{slug}: expected a boolean, got {raw}"
        ))),
    }
}

pub(crate) fn coerce_id(slug: &str, raw: &JsonValue) -> TabulaResult<Id> {
    let text = expect_string(slug, raw)?;
    Id::from_uuid_str(text).map_err(|_| TabulaError::validation(format!("{slug}: '{text}' is not an id")))
}

pub(crate) fn expect_string<'a>(slug: &str, raw: &'a JsonValue) -> TabulaResult<&'a str> {
    raw.as_str()
        .ok_or_else(|| TabulaError::validation(format!("{slug}: expected a string, got {raw}")))
}

fn normalize_domain(value: &str) -> String {
    let value = value.trim();
    let value = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    value.trim_end_matches('/').to_lowercase()
}

fn normalize_currency_code(slug: &str, code: &str) -> TabulaResult<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(TabulaError::validation(format!(
            "{slug}: '{code}' is not a currency code"
        )))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
