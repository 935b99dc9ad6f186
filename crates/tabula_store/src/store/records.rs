use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::{debug, warn};
use sea_orm::sea_query::{Expr, ExprTrait, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, QueryResult, TransactionTrait};
use serde_json::Value as JsonValue;

use super::values::{
    WriteMode, apply_values, delete_owner_values, hydrate_values, load_slot_values,
    prepare_values,
};
use super::{
    FAILPOINT_AFTER_ENTRY_DELETE, FAILPOINT_AFTER_VALUE_DELETE, TabulaStore, col_name, exec,
    id_value, id_values, opt_id_value, query_all, query_one, read_id, read_opt_id,
    read_timestamp,
};
use crate::db::*;
use tabula_core::{
    ActorId, AssertRecordInput, Attribute, AttributeParent, AttributeType, CreateRecordInput, ForwardReference,
    Id, RecordApi, RecordRow, RecordView, RelatedRecord, SlotValue, TabulaError, TabulaResult,
    Timestamp, UpdateRecordInput, encode_value,
};

#[derive(Clone, Debug)]
pub(super) struct RecordMeta {
    pub(super) id: Id,
    pub(super) object_id: Id,
    pub(super) position: Option<i64>,
    pub(super) created_at: Timestamp,
    pub(super) created_by: Option<ActorId>,
    pub(super) updated_at: Timestamp,
}

impl RecordMeta {
    pub(super) fn to_row(&self) -> RecordRow {
        RecordRow::new(self.id, self.created_at, self.updated_at, self.position)
    }

    fn into_view(
        self,
        attributes: &[Attribute],
        slots: Option<&HashMap<Id, SlotValue>>,
    ) -> RecordView {
        RecordView {
            id: self.id,
            object_id: self.object_id,
            created_at: self.created_at,
            created_by: self.created_by,
            updated_at: self.updated_at,
            position: self.position,
            values: hydrate_values(attributes, slots),
        }
    }
}

impl TabulaStore {
    pub(super) async fn fetch_record_meta<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: Id,
    ) -> TabulaResult<Option<RecordMeta>> {
        let select = record_select()
            .and_where(Expr::col(TabulaRecords::RecordId).eq(id_value(self.backend, record_id)))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_record_meta(&row))
            .transpose()
    }

    /// Metadata of an object's records, optionally narrowed to `ids`.
    pub(super) async fn fetch_record_metas<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
        ids: Option<&[Id]>,
    ) -> TabulaResult<Vec<RecordMeta>> {
        if ids.is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }
        let mut select = record_select()
            .and_where(Expr::col(TabulaRecords::ObjectId).eq(id_value(self.backend, object_id)))
            .order_by(TabulaRecords::CreatedAt, Order::Desc)
            .to_owned();
        if let Some(ids) = ids {
            select.and_where(
                Expr::col(TabulaRecords::RecordId).is_in(id_values(self.backend, ids.iter().copied())),
            );
        }
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_record_meta)
            .collect()
    }

    async fn require_record<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
        record_id: Id,
    ) -> TabulaResult<RecordMeta> {
        match self.fetch_record_meta(conn, record_id).await? {
            Some(meta) if meta.object_id == object_id => Ok(meta),
            _ => Err(TabulaError::not_found(format!("record {record_id}"))),
        }
    }

    /// Fully hydrated views keyed by id; ids that no longer exist are absent.
    pub(super) async fn load_record_views<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
        ids: &[Id],
    ) -> TabulaResult<HashMap<Id, RecordView>> {
        let metas = self.fetch_record_metas(conn, object_id, Some(ids)).await?;
        if metas.is_empty() {
            return Ok(HashMap::new());
        }
        let attributes = self
            .fetch_attributes(conn, AttributeParent::Object(object_id))
            .await?;
        let owners: Vec<Id> = metas.iter().map(|meta| meta.id).collect();
        let all: Vec<&Attribute> = attributes.iter().collect();
        let slots = load_slot_values(conn, self.backend, ValueTable::Record, &all, Some(&owners))
            .await?;
        Ok(metas
            .into_iter()
            .map(|meta| {
                let id = meta.id;
                (id, meta.into_view(&attributes, slots.get(&id)))
            })
            .collect())
    }

    async fn load_record_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
        record_id: Id,
    ) -> TabulaResult<Option<RecordView>> {
        Ok(self
            .load_record_views(conn, object_id, &[record_id])
            .await?
            .remove(&record_id))
    }

    async fn find_by_natural_key<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
        attribute: &Attribute,
        key: &SlotValue,
    ) -> TabulaResult<Option<Id>> {
        let wanted = key.canonical_key();
        let loaded =
            load_slot_values(conn, self.backend, ValueTable::Record, &[attribute], None).await?;
        let candidates: Vec<Id> = loaded
            .into_iter()
            .filter(|(_, slots)| {
                slots
                    .get(&attribute.id)
                    .is_some_and(|slot| slot.canonical_key() == wanted)
            })
            .map(|(owner, _)| owner)
            .collect();
        // Oldest match wins when a non-unique attribute has duplicates.
        let metas = self
            .fetch_record_metas(conn, object_id, Some(&candidates))
            .await?;
        Ok(metas
            .iter()
            .min_by_key(|meta| (meta.created_at, meta.id))
            .map(|meta| meta.id))
    }
}

#[async_trait]
impl RecordApi for TabulaStore {
    async fn create_record(&self, input: CreateRecordInput) -> TabulaResult<RecordView> {
        self.require_object(&self.conn, input.object_id).await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::Object(input.object_id))
            .await?;
        let prepared = prepare_values(&attributes, &input.values, WriteMode::Create)?;
        let record_id = Id::new();
        let now = Timestamp::now();

        let tx = self.conn.begin().await?;
        let insert = Query::insert()
            .into_table(TabulaRecords::Table)
            .columns([
                TabulaRecords::RecordId,
                TabulaRecords::ObjectId,
                TabulaRecords::Position,
                TabulaRecords::CreatedAt,
                TabulaRecords::CreatedBy,
                TabulaRecords::UpdatedAt,
            ])
            .values_panic([
                id_value(self.backend, record_id).into(),
                id_value(self.backend, input.object_id).into(),
                Option::<i64>::None.into(),
                now.as_micros().into(),
                opt_id_value(self.backend, input.actor.map(|actor| actor.0)).into(),
                now.as_micros().into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        apply_values(&tx, self.backend, ValueTable::Record, record_id, &prepared, now).await?;
        tx.commit().await?;

        self.load_record_view(&self.conn, input.object_id, record_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("record {record_id}")))
    }

    async fn update_record(&self, input: UpdateRecordInput) -> TabulaResult<RecordView> {
        self.require_record(&self.conn, input.object_id, input.record_id)
            .await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::Object(input.object_id))
            .await?;
        let prepared = prepare_values(&attributes, &input.values, WriteMode::Update)?;
        let now = Timestamp::now();

        let tx = self.conn.begin().await?;
        apply_values(&tx, self.backend, ValueTable::Record, input.record_id, &prepared, now)
            .await?;
        let touch = Query::update()
            .table(TabulaRecords::Table)
            .values([(TabulaRecords::UpdatedAt, now.as_micros().into())])
            .and_where(
                Expr::col(TabulaRecords::RecordId).eq(id_value(self.backend, input.record_id)),
            )
            .to_owned();
        exec(&tx, &touch).await?;
        tx.commit().await?;
        debug!(
            "updated record {} ({} set, {} cleared) by {:?}",
            input.record_id,
            prepared.sets.len(),
            prepared.clears.len(),
            input.actor.map(|actor| actor.0.to_uuid_string())
        );

        self.load_record_view(&self.conn, input.object_id, input.record_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("record {}", input.record_id)))
    }

    async fn delete_record(&self, object_id: Id, record_id: Id) -> TabulaResult<()> {
        self.require_record(&self.conn, object_id, record_id).await?;
        let tx = self.conn.begin().await?;
        let entries = Query::select()
            .from(TabulaListEntries::Table)
            .column(TabulaListEntries::EntryId)
            .and_where(
                Expr::col(TabulaListEntries::RecordId).eq(id_value(self.backend, record_id)),
            )
            .to_owned();
        let entry_ids = query_all(&tx, &entries)
            .await?
            .iter()
            .map(|row| read_id(row, TabulaListEntries::EntryId))
            .collect::<TabulaResult<Vec<_>>>()?;
        delete_owner_values(&tx, self.backend, ValueTable::ListEntry, &entry_ids).await?;
        let delete_entries = Query::delete()
            .from_table(TabulaListEntries::Table)
            .and_where(
                Expr::col(TabulaListEntries::RecordId).eq(id_value(self.backend, record_id)),
            )
            .to_owned();
        exec(&tx, &delete_entries).await?;
        self.maybe_failpoint(FAILPOINT_AFTER_ENTRY_DELETE)?;
        delete_owner_values(&tx, self.backend, ValueTable::Record, &[record_id]).await?;
        self.maybe_failpoint(FAILPOINT_AFTER_VALUE_DELETE)?;
        let delete_record = Query::delete()
            .from_table(TabulaRecords::Table)
            .and_where(Expr::col(TabulaRecords::RecordId).eq(id_value(self.backend, record_id)))
            .to_owned();
        exec(&tx, &delete_record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_record(&self, object_id: Id, record_id: Id) -> TabulaResult<Option<RecordView>> {
        self.load_record_view(&self.conn, object_id, record_id).await
    }

    async fn assert_record(&self, input: AssertRecordInput) -> TabulaResult<RecordView> {
        self.require_object(&self.conn, input.object_id).await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::Object(input.object_id))
            .await?;
        let attribute = attributes
            .iter()
            .find(|attribute| attribute.slug == input.matching_attribute)
            .ok_or_else(|| {
                TabulaError::validation(format!(
                    "unknown matching attribute '{}'",
                    input.matching_attribute
                ))
            })?;
        let key = encode_value(attribute, &input.matching_value)?.ok_or_else(|| {
            TabulaError::validation(format!("{}: a matching value is required", attribute.slug))
        })?;
        let mut values = input.values.clone();
        values
            .entry(attribute.slug.clone())
            .or_insert_with(|| input.matching_value.clone());

        match self
            .find_by_natural_key(&self.conn, input.object_id, attribute, &key)
            .await?
        {
            Some(record_id) => {
                self.update_record(UpdateRecordInput {
                    object_id: input.object_id,
                    record_id,
                    values,
                    actor: input.actor,
                })
                .await
            }
            None => {
                self.create_record(CreateRecordInput {
                    object_id: input.object_id,
                    values,
                    actor: input.actor,
                })
                .await
            }
        }
    }

    async fn get_related_records(&self, record_id: Id) -> TabulaResult<Vec<RelatedRecord>> {
        let attributes = self.fetch_record_reference_attributes(&self.conn).await?;
        let target = record_id.to_uuid_string();
        let mut pointers: Vec<(Id, &Attribute)> = Vec::new();

        let singles: Vec<&Attribute> = attributes.iter().filter(|a| !a.is_multiselect).collect();
        if !singles.is_empty() {
            let select = Query::select()
                .from(ValueTable::Record)
                .columns([ValueCol::OwnerId, ValueCol::AttributeId])
                .and_where(
                    Expr::col(ValueCol::AttributeId)
                        .is_in(id_values(self.backend, singles.iter().map(|a| a.id))),
                )
                .and_where(Expr::col(ValueCol::ValueRef).eq(id_value(self.backend, record_id)))
                .to_owned();
            for row in query_all(&self.conn, &select).await? {
                let owner = read_id(&row, ValueCol::OwnerId)?;
                let attribute_id = read_id(&row, ValueCol::AttributeId)?;
                if let Some(attribute) = singles.iter().find(|a| a.id == attribute_id) {
                    pointers.push((owner, *attribute));
                }
            }
        }
        let multis: Vec<&Attribute> = attributes.iter().filter(|a| a.is_multiselect).collect();
        let loaded =
            load_slot_values(&self.conn, self.backend, ValueTable::Record, &multis, None).await?;
        for (owner, slots) in loaded {
            for attribute in &multis {
                let Some(SlotValue::Structured(JsonValue::Array(items))) = slots.get(&attribute.id)
                else {
                    continue;
                };
                if items.iter().any(|item| item.as_str() == Some(target.as_str())) {
                    pointers.push((owner, *attribute));
                }
            }
        }

        let mut related = Vec::new();
        for (owner, attribute) in pointers {
            let Some(meta) = self.fetch_record_meta(&self.conn, owner).await? else {
                continue;
            };
            related.push(RelatedRecord {
                record_id: owner,
                object_id: meta.object_id,
                attribute_id: attribute.id,
                attribute_slug: attribute.slug.clone(),
            });
        }
        related.sort_by(|a, b| {
            (a.attribute_slug.as_str(), a.record_id).cmp(&(b.attribute_slug.as_str(), b.record_id))
        });
        Ok(related)
    }

    async fn get_forward_references(
        &self,
        object_id: Id,
        record_id: Id,
    ) -> TabulaResult<Vec<ForwardReference>> {
        self.require_record(&self.conn, object_id, record_id).await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::Object(object_id))
            .await?;
        let references: Vec<&Attribute> = attributes
            .iter()
            .filter(|attribute| attribute.attribute_type == AttributeType::RecordReference)
            .collect();
        let loaded = load_slot_values(
            &self.conn,
            self.backend,
            ValueTable::Record,
            &references,
            Some(&[record_id]),
        )
        .await?;
        let Some(slots) = loaded.get(&record_id) else {
            return Ok(Vec::new());
        };

        let mut forward = Vec::new();
        let mut seen = HashSet::new();
        for attribute in references {
            let targets: Vec<Id> = match slots.get(&attribute.id) {
                Some(SlotValue::Reference(id)) => vec![*id],
                Some(SlotValue::Structured(JsonValue::Array(items))) => items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .filter_map(|raw| Id::from_uuid_str(raw).ok())
                    .collect(),
                _ => Vec::new(),
            };
            for target in targets {
                if !seen.insert((attribute.id, target)) {
                    continue;
                }
                match self.fetch_record_meta(&self.conn, target).await? {
                    Some(meta) => forward.push(ForwardReference {
                        attribute_id: attribute.id,
                        attribute_slug: attribute.slug.clone(),
                        target_record_id: target,
                        target_object_id: meta.object_id,
                    }),
                    None => warn!(
                        "record {record_id} references missing record {target} via {}",
                        attribute.slug
                    ),
                }
            }
        }
        Ok(forward)
    }
}

fn record_select() -> SelectStatement {
    Query::select()
        .from(TabulaRecords::Table)
        .columns([
            TabulaRecords::RecordId,
            TabulaRecords::ObjectId,
            TabulaRecords::Position,
            TabulaRecords::CreatedAt,
            TabulaRecords::CreatedBy,
            TabulaRecords::UpdatedAt,
        ])
        .to_owned()
}

fn read_record_meta(row: &QueryResult) -> TabulaResult<RecordMeta> {
    Ok(RecordMeta {
        id: read_id(row, TabulaRecords::RecordId)?,
        object_id: read_id(row, TabulaRecords::ObjectId)?,
        position: row.try_get("", &col_name(TabulaRecords::Position))?,
        created_at: read_timestamp(row, TabulaRecords::CreatedAt)?,
        created_by: read_opt_id(row, TabulaRecords::CreatedBy)?.map(ActorId),
        updated_at: read_timestamp(row, TabulaRecords::UpdatedAt)?,
    })
}
