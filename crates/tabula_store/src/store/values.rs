//! Slot-column plumbing shared by record values and list-entry values.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use sea_orm::sea_query::{Expr, ExprTrait, OnConflict, Query, Value as SeaValue};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult};
use serde_json::Value as JsonValue;

use super::{col_name, exec, id_value, id_values, none_id_value, query_all, query_one, read_id, read_opt_id};
use crate::db::{ValueCol, ValueTable};
use tabula_core::{
    Attribute, AttributeValue, Id, Slot, SlotValue, TabulaError, TabulaResult, Timestamp,
    ValueMap, decode_value, encode_value,
};

const UNIQUE_KEY_LEN: usize = 255;

const SLOT_COLUMNS: [ValueCol; 6] = [
    ValueCol::ValueText,
    ValueCol::ValueNumber,
    ValueCol::ValueBool,
    ValueCol::ValueDate,
    ValueCol::ValueJson,
    ValueCol::ValueRef,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum WriteMode {
    Create,
    Update,
}

/// Encoded values ready to write: rows to upsert and attributes to clear.
pub(super) struct PreparedValues<'a> {
    pub(super) sets: Vec<(&'a Attribute, SlotValue)>,
    pub(super) clears: Vec<&'a Attribute>,
}

pub(super) fn prepare_values<'a>(
    attributes: &'a [Attribute],
    values: &ValueMap,
    mode: WriteMode,
) -> TabulaResult<PreparedValues<'a>> {
    let mut prepared = PreparedValues {
        sets: Vec::new(),
        clears: Vec::new(),
    };
    for (slug, raw) in values {
        let attribute = attributes
            .iter()
            .find(|attribute| attribute.slug == *slug)
            .ok_or_else(|| TabulaError::validation(format!("unknown attribute '{slug}'")))?;
        match encode_value(attribute, raw)? {
            Some(slot) => {
                if attribute.is_unique {
                    unique_key(attribute, &slot)?;
                }
                prepared.sets.push((attribute, slot));
            }
            None => prepared.clears.push(attribute),
        }
    }
    match mode {
        WriteMode::Create => {
            for attribute in attributes.iter().filter(|attribute| attribute.is_required) {
                if !prepared.sets.iter().any(|(set, _)| set.id == attribute.id) {
                    return Err(TabulaError::validation(format!(
                        "{} is required",
                        attribute.slug
                    )));
                }
            }
            prepared.clears.clear();
        }
        WriteMode::Update => {
            if let Some(attribute) = prepared.clears.iter().find(|attribute| attribute.is_required) {
                return Err(TabulaError::validation(format!(
                    "{} is required and cannot be cleared",
                    attribute.slug
                )));
            }
        }
    }
    Ok(prepared)
}

/// Writes prepared values for one owner. Must run inside the caller's transaction.
pub(super) async fn apply_values<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    owner_id: Id,
    prepared: &PreparedValues<'_>,
    now: Timestamp,
) -> TabulaResult<()> {
    for (attribute, slot) in &prepared.sets {
        let unique_key = if attribute.is_unique {
            let key = unique_key(attribute, slot)?;
            ensure_unique(conn, backend, table, attribute, owner_id, &key).await?;
            Some(key)
        } else {
            None
        };
        upsert_value(conn, backend, table, owner_id, attribute.id, slot, unique_key, now).await?;
    }
    for attribute in &prepared.clears {
        let delete = Query::delete()
            .from_table(table)
            .and_where(Expr::col(ValueCol::OwnerId).eq(id_value(backend, owner_id)))
            .and_where(Expr::col(ValueCol::AttributeId).eq(id_value(backend, attribute.id)))
            .to_owned();
        exec(conn, &delete).await?;
    }
    Ok(())
}

async fn ensure_unique<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    attribute: &Attribute,
    owner_id: Id,
    key: &str,
) -> TabulaResult<()> {
    let select = Query::select()
        .from(table)
        .column(ValueCol::OwnerId)
        .and_where(Expr::col(ValueCol::AttributeId).eq(id_value(backend, attribute.id)))
        .and_where(Expr::col(ValueCol::UniqueKey).eq(key))
        .and_where(Expr::col(ValueCol::OwnerId).ne(id_value(backend, owner_id)))
        .limit(1)
        .to_owned();
    if query_one(conn, &select).await?.is_some() {
        return Err(TabulaError::conflict(format!(
            "{} must be unique; value already in use",
            attribute.slug
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(super) async fn upsert_value<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    owner_id: Id,
    attribute_id: Id,
    slot: &SlotValue,
    unique_key: Option<String>,
    now: Timestamp,
) -> TabulaResult<()> {
    let [text, number, boolean, date, json, reference] = slot_values(backend, slot);
    let insert = Query::insert()
        .into_table(table)
        .columns([
            ValueCol::OwnerId,
            ValueCol::AttributeId,
            ValueCol::ValueText,
            ValueCol::ValueNumber,
            ValueCol::ValueBool,
            ValueCol::ValueDate,
            ValueCol::ValueJson,
            ValueCol::ValueRef,
            ValueCol::UniqueKey,
            ValueCol::UpdatedAt,
        ])
        .values_panic([
            id_value(backend, owner_id).into(),
            id_value(backend, attribute_id).into(),
            text.into(),
            number.into(),
            boolean.into(),
            date.into(),
            json.into(),
            reference.into(),
            SeaValue::String(unique_key).into(),
            now.as_micros().into(),
        ])
        .on_conflict(
            OnConflict::columns([ValueCol::OwnerId, ValueCol::AttributeId])
                .update_columns([
                    ValueCol::ValueText,
                    ValueCol::ValueNumber,
                    ValueCol::ValueBool,
                    ValueCol::ValueDate,
                    ValueCol::ValueJson,
                    ValueCol::ValueRef,
                    ValueCol::UniqueKey,
                    ValueCol::UpdatedAt,
                ])
                .to_owned(),
        )
        .to_owned();
    exec(conn, &insert).await
}

/// Column values in `SLOT_COLUMNS` order; every column but the populated one is null.
fn slot_values(backend: DatabaseBackend, slot: &SlotValue) -> [SeaValue; 6] {
    let mut text = SeaValue::String(None);
    let mut number = SeaValue::Double(None);
    let mut boolean = SeaValue::Bool(None);
    let mut date = SeaValue::BigInt(None);
    let mut json = SeaValue::String(None);
    let mut reference = none_id_value(backend);
    match slot {
        SlotValue::Text(value) => text = SeaValue::String(Some(value.clone())),
        SlotValue::Number { value, unit } => {
            number = SeaValue::Double(Some(*value));
            text = SeaValue::String(unit.clone());
        }
        SlotValue::Boolean(value) => boolean = SeaValue::Bool(Some(*value)),
        SlotValue::Date(value) => date = SeaValue::BigInt(Some(*value)),
        SlotValue::Structured(value) => json = SeaValue::String(Some(value.to_string())),
        SlotValue::Reference(id) => reference = id_value(backend, *id),
    }
    [text, number, boolean, date, json, reference]
}

/// Indexed form of a unique value. Keys are never truncated, so an over-long value is
/// rejected instead of colliding with another value sharing its prefix.
pub(super) fn unique_key(attribute: &Attribute, slot: &SlotValue) -> TabulaResult<String> {
    let key = slot.canonical_key();
    if key.chars().count() > UNIQUE_KEY_LEN {
        return Err(TabulaError::validation(format!(
            "{}: unique values are limited to {UNIQUE_KEY_LEN} characters",
            attribute.slug
        )));
    }
    Ok(key)
}

/// Decoded slot values, `owner -> attribute -> value`, for the given attributes.
pub(super) async fn load_slot_values<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    attributes: &[&Attribute],
    owners: Option<&[Id]>,
) -> TabulaResult<HashMap<Id, HashMap<Id, SlotValue>>> {
    let mut loaded: HashMap<Id, HashMap<Id, SlotValue>> = HashMap::new();
    if attributes.is_empty() || owners.is_some_and(|owners| owners.is_empty()) {
        return Ok(loaded);
    }
    let by_id: HashMap<Id, &Attribute> =
        attributes.iter().map(|attribute| (attribute.id, *attribute)).collect();
    let mut select = Query::select()
        .from(table)
        .columns([ValueCol::OwnerId, ValueCol::AttributeId])
        .columns(SLOT_COLUMNS)
        .and_where(
            Expr::col(ValueCol::AttributeId)
                .is_in(id_values(backend, by_id.keys().copied())),
        )
        .to_owned();
    if let Some(owners) = owners {
        select.and_where(
            Expr::col(ValueCol::OwnerId).is_in(id_values(backend, owners.iter().copied())),
        );
    }
    for row in query_all(conn, &select).await? {
        let owner_id = read_id(&row, ValueCol::OwnerId)?;
        let attribute_id = read_id(&row, ValueCol::AttributeId)?;
        let Some(attribute) = by_id.get(&attribute_id) else {
            continue;
        };
        match read_slot(&row, attribute) {
            Ok(Some(slot)) => {
                loaded.entry(owner_id).or_default().insert(attribute_id, slot);
            }
            Ok(None) => {}
            Err(err) => warn!(
                "skipping undecodable value {owner_id}/{}: {err}",
                attribute.slug
            ),
        }
    }
    Ok(loaded)
}

/// Reads the slot the attribute currently stores into; `None` when that column is empty.
pub(super) fn read_slot(row: &QueryResult, attribute: &Attribute) -> TabulaResult<Option<SlotValue>> {
    let slot = match attribute.storage_slot() {
        Slot::Text => row
            .try_get::<Option<String>>("", &col_name(ValueCol::ValueText))?
            .map(SlotValue::Text),
        Slot::Number => {
            let value: Option<f64> = row.try_get("", &col_name(ValueCol::ValueNumber))?;
            let unit: Option<String> = row.try_get("", &col_name(ValueCol::ValueText))?;
            value.map(|value| SlotValue::Number { value, unit })
        }
        Slot::Boolean => row
            .try_get::<Option<bool>>("", &col_name(ValueCol::ValueBool))?
            .map(SlotValue::Boolean),
        Slot::Date => row
            .try_get::<Option<i64>>("", &col_name(ValueCol::ValueDate))?
            .map(SlotValue::Date),
        Slot::Structured => {
            match row.try_get::<Option<String>>("", &col_name(ValueCol::ValueJson))? {
                Some(raw) => Some(SlotValue::Structured(serde_json::from_str::<JsonValue>(&raw)?)),
                None => None,
            }
        }
        Slot::Reference => read_opt_id(row, ValueCol::ValueRef)?.map(SlotValue::Reference),
    };
    Ok(slot)
}

/// Public `{slug: value}` map. Rows that no longer decode under the attribute's type are
/// logged and left out.
pub(super) fn hydrate_values(
    attributes: &[Attribute],
    slots: Option<&HashMap<Id, SlotValue>>,
) -> BTreeMap<String, AttributeValue> {
    let mut values = BTreeMap::new();
    let Some(slots) = slots else {
        return values;
    };
    for attribute in attributes {
        let Some(slot) = slots.get(&attribute.id) else {
            continue;
        };
        match decode_value(attribute, slot) {
            Ok(value) => {
                values.insert(attribute.slug.clone(), value);
            }
            Err(err) => warn!("skipping undecodable value for {}: {err}", attribute.slug),
        }
    }
    values
}

pub(super) async fn delete_owner_values<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    owners: &[Id],
) -> TabulaResult<()> {
    if owners.is_empty() {
        return Ok(());
    }
    let delete = Query::delete()
        .from_table(table)
        .and_where(Expr::col(ValueCol::OwnerId).is_in(id_values(backend, owners.iter().copied())))
        .to_owned();
    exec(conn, &delete).await
}

pub(super) async fn delete_attribute_values<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    attribute_ids: &[Id],
) -> TabulaResult<()> {
    if attribute_ids.is_empty() {
        return Ok(());
    }
    let delete = Query::delete()
        .from_table(table)
        .and_where(
            Expr::col(ValueCol::AttributeId).is_in(id_values(backend, attribute_ids.iter().copied())),
        )
        .to_owned();
    exec(conn, &delete).await
}

pub(super) async fn attribute_has_values<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    attribute_id: Id,
) -> TabulaResult<bool> {
    let select = Query::select()
        .from(table)
        .column(ValueCol::OwnerId)
        .and_where(Expr::col(ValueCol::AttributeId).eq(id_value(backend, attribute_id)))
        .limit(1)
        .to_owned();
    Ok(query_one(conn, &select).await?.is_some())
}

/// Rewrites `unique_key` for every row of the attribute; `None` drops the keys.
pub(super) async fn rekey_unique_values<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    table: ValueTable,
    attribute: &Attribute,
    unique: bool,
) -> TabulaResult<()> {
    if !unique {
        let update = Query::update()
            .table(table)
            .values([(ValueCol::UniqueKey, SeaValue::String(None).into())])
            .and_where(Expr::col(ValueCol::AttributeId).eq(id_value(backend, attribute.id)))
            .to_owned();
        return exec(conn, &update).await;
    }
    let loaded = load_slot_values(conn, backend, table, &[attribute], None).await?;
    let mut seen: HashMap<String, Id> = HashMap::new();
    for (owner_id, slots) in &loaded {
        let Some(slot) = slots.get(&attribute.id) else {
            continue;
        };
        let key = unique_key(attribute, slot)?;
        if seen.insert(key.clone(), *owner_id).is_some() {
            return Err(TabulaError::conflict(format!(
                "{} has duplicate values and cannot be made unique",
                attribute.slug
            )));
        }
        let update = Query::update()
            .table(table)
            .values([(ValueCol::UniqueKey, key.into())])
            .and_where(Expr::col(ValueCol::OwnerId).eq(id_value(backend, *owner_id)))
            .and_where(Expr::col(ValueCol::AttributeId).eq(id_value(backend, attribute.id)))
            .to_owned();
        exec(conn, &update).await?;
    }
    Ok(())
}
