use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::{debug, info, warn};
use sea_orm::sea_query::{Expr, ExprTrait, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, QueryResult, TransactionTrait};

use super::query::in_page_order;
use super::values::{
    WriteMode, apply_values, delete_owner_values, hydrate_values, load_slot_values,
    prepare_values,
};
use super::{
    FAILPOINT_AFTER_ENTRY_DELETE, TabulaStore, col_name, exec, id_value, id_values, opt_id_value,
    query_all, query_one, read_id, read_opt_id, read_timestamp, require_name,
};
use crate::db::*;
use tabula_core::{
    ActorId, AddListEntryInput, Attribute, AttributeParent, CreateListInput, Id, List,
    ListApi, ListEntriesInput, ListEntryPage, ListEntryView, ListRecordsInput, RecordRow,
    RecordView, TabulaError, TabulaResult, Timestamp, UpdateListInput, ValueMap,
    validate_slug,
};

#[derive(Clone, Debug)]
struct EntryMeta {
    id: Id,
    list_id: Id,
    record_id: Id,
    created_at: Timestamp,
    created_by: Option<ActorId>,
    updated_at: Timestamp,
}

impl TabulaStore {
    pub(super) async fn fetch_list<C: ConnectionTrait>(
        &self,
        conn: &C,
        list_id: Id,
    ) -> TabulaResult<Option<List>> {
        let select = list_select()
            .and_where(Expr::col(TabulaLists::ListId).eq(id_value(self.backend, list_id)))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_list(&row))
            .transpose()
    }

    async fn require_list<C: ConnectionTrait>(&self, conn: &C, list_id: Id) -> TabulaResult<List> {
        self.fetch_list(conn, list_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("list {list_id}")))
    }

    pub(super) async fn fetch_lists_for_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
    ) -> TabulaResult<Vec<List>> {
        let select = list_select()
            .and_where(Expr::col(TabulaLists::ObjectId).eq(id_value(self.backend, object_id)))
            .order_by(TabulaLists::CreatedAt, Order::Asc)
            .to_owned();
        query_all(conn, &select).await?.iter().map(read_list).collect()
    }

    /// Removes a list with its attributes, entries and entry values. Records are untouched.
    /// Runs inside the caller's transaction.
    pub(super) async fn purge_list<C: ConnectionTrait>(
        &self,
        conn: &C,
        list_id: Id,
    ) -> TabulaResult<()> {
        let attribute_ids: Vec<Id> = self
            .fetch_attributes(conn, AttributeParent::List(list_id))
            .await?
            .iter()
            .map(|attribute| attribute.id)
            .collect();
        self.purge_attributes(conn, ValueTable::ListEntry, &attribute_ids)
            .await?;
        let entry_ids: Vec<Id> = self
            .fetch_entry_metas(conn, list_id, None)
            .await?
            .iter()
            .map(|entry| entry.id)
            .collect();
        delete_owner_values(conn, self.backend, ValueTable::ListEntry, &entry_ids).await?;
        let delete_entries = Query::delete()
            .from_table(TabulaListEntries::Table)
            .and_where(Expr::col(TabulaListEntries::ListId).eq(id_value(self.backend, list_id)))
            .to_owned();
        exec(conn, &delete_entries).await?;
        self.maybe_failpoint(FAILPOINT_AFTER_ENTRY_DELETE)?;
        let delete_list = Query::delete()
            .from_table(TabulaLists::Table)
            .and_where(Expr::col(TabulaLists::ListId).eq(id_value(self.backend, list_id)))
            .to_owned();
        exec(conn, &delete_list).await
    }

    async fn fetch_entry_meta<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry_id: Id,
    ) -> TabulaResult<Option<EntryMeta>> {
        let select = entry_select()
            .and_where(Expr::col(TabulaListEntries::EntryId).eq(id_value(self.backend, entry_id)))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_entry(&row))
            .transpose()
    }

    async fn fetch_entry_metas<C: ConnectionTrait>(
        &self,
        conn: &C,
        list_id: Id,
        ids: Option<&[Id]>,
    ) -> TabulaResult<Vec<EntryMeta>> {
        if ids.is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }
        let mut select = entry_select()
            .and_where(Expr::col(TabulaListEntries::ListId).eq(id_value(self.backend, list_id)))
            .order_by(TabulaListEntries::CreatedAt, Order::Desc)
            .to_owned();
        if let Some(ids) = ids {
            select.and_where(
                Expr::col(TabulaListEntries::EntryId)
                    .is_in(id_values(self.backend, ids.iter().copied())),
            );
        }
        query_all(conn, &select).await?.iter().map(read_entry).collect()
    }

    async fn require_entry<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry_id: Id,
    ) -> TabulaResult<EntryMeta> {
        self.fetch_entry_meta(conn, entry_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("list entry {entry_id}")))
    }

    /// Hydrated entries keyed by id. Entries whose record vanished are left out.
    async fn load_entry_views<C: ConnectionTrait>(
        &self,
        conn: &C,
        list: &List,
        ids: &[Id],
    ) -> TabulaResult<HashMap<Id, ListEntryView>> {
        let metas = self.fetch_entry_metas(conn, list.id, Some(ids)).await?;
        if metas.is_empty() {
            return Ok(HashMap::new());
        }
        let attributes = self
            .fetch_attributes(conn, AttributeParent::List(list.id))
            .await?;
        let owners: Vec<Id> = metas.iter().map(|entry| entry.id).collect();
        let all: Vec<&Attribute> = attributes.iter().collect();
        let slots =
            load_slot_values(conn, self.backend, ValueTable::ListEntry, &all, Some(&owners))
                .await?;
        let record_ids: Vec<Id> = metas.iter().map(|entry| entry.record_id).collect();
        let mut records = self
            .load_record_views(conn, list.object_id, &record_ids)
            .await?;

        let mut views = HashMap::with_capacity(metas.len());
        for entry in metas {
            let Some(record) = records.remove(&entry.record_id) else {
                warn!("list entry {} points at missing record {}", entry.id, entry.record_id);
                continue;
            };
            views.insert(
                entry.id,
                ListEntryView {
                    id: entry.id,
                    list_id: entry.list_id,
                    record_id: entry.record_id,
                    created_at: entry.created_at,
                    created_by: entry.created_by,
                    updated_at: entry.updated_at,
                    values: hydrate_values(&attributes, slots.get(&entry.id)),
                    record,
                },
            );
        }
        Ok(views)
    }

    async fn load_entry_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        list: &List,
        entry_id: Id,
    ) -> TabulaResult<ListEntryView> {
        self.load_entry_views(conn, list, &[entry_id])
            .await?
            .remove(&entry_id)
            .ok_or_else(|| TabulaError::not_found(format!("list entry {entry_id}")))
    }

    async fn listed_record_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        list_id: Id,
    ) -> TabulaResult<HashSet<Id>> {
        Ok(self
            .fetch_entry_metas(conn, list_id, None)
            .await?
            .into_iter()
            .map(|entry| entry.record_id)
            .collect())
    }
}

#[async_trait]
impl ListApi for TabulaStore {
    async fn create_list(&self, input: CreateListInput) -> TabulaResult<List> {
        validate_slug(&input.slug)?;
        let name = require_name("list name", &input.name)?;
        self.require_object(&self.conn, input.object_id).await?;
        if self
            .get_list_by_slug(input.object_id, &input.slug)
            .await?
            .is_some()
        {
            return Err(TabulaError::conflict(format!(
                "list slug '{}' already exists",
                input.slug
            )));
        }
        let list = List {
            id: Id::new(),
            object_id: input.object_id,
            name,
            slug: input.slug,
            is_private: input.is_private,
            created_by: input.actor,
            created_at: Timestamp::now(),
        };
        let insert = Query::insert()
            .into_table(TabulaLists::Table)
            .columns([
                TabulaLists::ListId,
                TabulaLists::ObjectId,
                TabulaLists::Name,
                TabulaLists::Slug,
                TabulaLists::IsPrivate,
                TabulaLists::CreatedBy,
                TabulaLists::CreatedAt,
            ])
            .values_panic([
                id_value(self.backend, list.id).into(),
                id_value(self.backend, list.object_id).into(),
                list.name.clone().into(),
                list.slug.clone().into(),
                list.is_private.into(),
                opt_id_value(self.backend, list.created_by.map(|actor| actor.0)).into(),
                list.created_at.as_micros().into(),
            ])
            .to_owned();
        exec(&self.conn, &insert).await?;
        info!("created list {} ({})", list.slug, list.id);
        Ok(list)
    }

    async fn get_list(&self, list_id: Id) -> TabulaResult<Option<List>> {
        self.fetch_list(&self.conn, list_id).await
    }

    async fn get_list_by_slug(&self, object_id: Id, slug: &str) -> TabulaResult<Option<List>> {
        let select = list_select()
            .and_where(Expr::col(TabulaLists::ObjectId).eq(id_value(self.backend, object_id)))
            .and_where(Expr::col(TabulaLists::Slug).eq(slug))
            .to_owned();
        query_one(&self.conn, &select)
            .await?
            .map(|row| read_list(&row))
            .transpose()
    }

    async fn lists_for_object(&self, object_id: Id) -> TabulaResult<Vec<List>> {
        self.fetch_lists_for_object(&self.conn, object_id).await
    }

    async fn update_list(&self, list_id: Id, input: UpdateListInput) -> TabulaResult<List> {
        let mut list = self.require_list(&self.conn, list_id).await?;
        if let Some(name) = &input.name {
            list.name = require_name("list name", name)?;
        }
        if let Some(is_private) = input.is_private {
            list.is_private = is_private;
        }
        let update = Query::update()
            .table(TabulaLists::Table)
            .values([
                (TabulaLists::Name, list.name.clone().into()),
                (TabulaLists::IsPrivate, list.is_private.into()),
            ])
            .and_where(Expr::col(TabulaLists::ListId).eq(id_value(self.backend, list_id)))
            .to_owned();
        exec(&self.conn, &update).await?;
        Ok(list)
    }

    async fn delete_list(&self, list_id: Id) -> TabulaResult<()> {
        let list = self.require_list(&self.conn, list_id).await?;
        let tx = self.conn.begin().await?;
        self.purge_list(&tx, list_id).await?;
        tx.commit().await?;
        info!("deleted list {} ({list_id})", list.slug);
        Ok(())
    }

    async fn add_list_entry(&self, input: AddListEntryInput) -> TabulaResult<ListEntryView> {
        let list = self.require_list(&self.conn, input.list_id).await?;
        let record = self
            .fetch_record_meta(&self.conn, input.record_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("record {}", input.record_id)))?;
        if record.object_id != list.object_id {
            return Err(TabulaError::validation(format!(
                "record {} does not belong to the object of list {}",
                record.id, list.slug
            )));
        }
        if self
            .listed_record_ids(&self.conn, list.id)
            .await?
            .contains(&record.id)
        {
            return Err(TabulaError::conflict(format!(
                "record {} is already in list {}",
                record.id, list.slug
            )));
        }
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::List(list.id))
            .await?;
        let prepared = prepare_values(&attributes, &input.values, WriteMode::Create)?;
        let entry_id = Id::new();
        let now = Timestamp::now();

        let tx = self.conn.begin().await?;
        let insert = Query::insert()
            .into_table(TabulaListEntries::Table)
            .columns([
                TabulaListEntries::EntryId,
                TabulaListEntries::ListId,
                TabulaListEntries::RecordId,
                TabulaListEntries::CreatedAt,
                TabulaListEntries::CreatedBy,
                TabulaListEntries::UpdatedAt,
            ])
            .values_panic([
                id_value(self.backend, entry_id).into(),
                id_value(self.backend, list.id).into(),
                id_value(self.backend, record.id).into(),
                now.as_micros().into(),
                opt_id_value(self.backend, input.actor.map(|actor| actor.0)).into(),
                now.as_micros().into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        apply_values(&tx, self.backend, ValueTable::ListEntry, entry_id, &prepared, now).await?;
        tx.commit().await?;

        self.load_entry_view(&self.conn, &list, entry_id).await
    }

    async fn get_list_entry(&self, entry_id: Id) -> TabulaResult<Option<ListEntryView>> {
        let Some(entry) = self.fetch_entry_meta(&self.conn, entry_id).await? else {
            return Ok(None);
        };
        let Some(list) = self.fetch_list(&self.conn, entry.list_id).await? else {
            return Ok(None);
        };
        Ok(self
            .load_entry_views(&self.conn, &list, &[entry_id])
            .await?
            .remove(&entry_id))
    }

    async fn list_entries(
        &self,
        list_id: Id,
        input: ListEntriesInput,
    ) -> TabulaResult<ListEntryPage> {
        let list = self.require_list(&self.conn, list_id).await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::List(list_id))
            .await?;
        let rows = self
            .fetch_entry_metas(&self.conn, list_id, None)
            .await?
            .iter()
            .map(|entry| RecordRow::new(entry.id, entry.created_at, entry.updated_at, None))
            .collect();
        let selection = self
            .select_page(&self.conn, ValueTable::ListEntry, &attributes, rows, &input)
            .await?;
        let hydrated = self
            .load_entry_views(&self.conn, &list, &selection.ids)
            .await?;
        Ok(ListEntryPage {
            entries: in_page_order(&selection.ids, hydrated),
            total: selection.total,
        })
    }

    async fn update_entry_values(
        &self,
        entry_id: Id,
        values: ValueMap,
        actor: Option<ActorId>,
    ) -> TabulaResult<ListEntryView> {
        let entry = self.require_entry(&self.conn, entry_id).await?;
        let list = self.require_list(&self.conn, entry.list_id).await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::List(list.id))
            .await?;
        let prepared = prepare_values(&attributes, &values, WriteMode::Update)?;
        let now = Timestamp::now();

        let tx = self.conn.begin().await?;
        apply_values(&tx, self.backend, ValueTable::ListEntry, entry_id, &prepared, now).await?;
        let touch = Query::update()
            .table(TabulaListEntries::Table)
            .values([(TabulaListEntries::UpdatedAt, now.as_micros().into())])
            .and_where(Expr::col(TabulaListEntries::EntryId).eq(id_value(self.backend, entry_id)))
            .to_owned();
        exec(&tx, &touch).await?;
        tx.commit().await?;
        debug!(
            "updated list entry {entry_id} by {:?}",
            actor.map(|actor| actor.0.to_uuid_string())
        );

        self.load_entry_view(&self.conn, &list, entry_id).await
    }

    async fn remove_list_entry(&self, entry_id: Id) -> TabulaResult<()> {
        self.require_entry(&self.conn, entry_id).await?;
        let tx = self.conn.begin().await?;
        delete_owner_values(&tx, self.backend, ValueTable::ListEntry, &[entry_id]).await?;
        let delete = Query::delete()
            .from_table(TabulaListEntries::Table)
            .and_where(Expr::col(TabulaListEntries::EntryId).eq(id_value(self.backend, entry_id)))
            .to_owned();
        exec(&tx, &delete).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_available_records(
        &self,
        list_id: Id,
        object_id: Id,
        search: Option<String>,
    ) -> TabulaResult<Vec<RecordView>> {
        let list = self.require_list(&self.conn, list_id).await?;
        if list.object_id != object_id {
            return Err(TabulaError::validation(format!(
                "list {} does not belong to object {object_id}",
                list.slug
            )));
        }
        let input = ListRecordsInput {
            search,
            ..ListRecordsInput::default()
        };
        let listed = self.listed_record_ids(&self.conn, list_id).await?;
        let available: Vec<Id> = self
            .matching_record_ids(&self.conn, object_id, &input)
            .await?
            .into_iter()
            .filter(|id| !listed.contains(id))
            .collect();
        let hydrated = self
            .load_record_views(&self.conn, object_id, &available)
            .await?;
        Ok(in_page_order(&available, hydrated))
    }
}

fn list_select() -> SelectStatement {
    Query::select()
        .from(TabulaLists::Table)
        .columns([
            TabulaLists::ListId,
            TabulaLists::ObjectId,
            TabulaLists::Name,
            TabulaLists::Slug,
            TabulaLists::IsPrivate,
            TabulaLists::CreatedBy,
            TabulaLists::CreatedAt,
        ])
        .to_owned()
}

fn read_list(row: &QueryResult) -> TabulaResult<List> {
    Ok(List {
        id: read_id(row, TabulaLists::ListId)?,
        object_id: read_id(row, TabulaLists::ObjectId)?,
        name: row.try_get("", &col_name(TabulaLists::Name))?,
        slug: row.try_get("", &col_name(TabulaLists::Slug))?,
        is_private: row.try_get("", &col_name(TabulaLists::IsPrivate))?,
        created_by: read_opt_id(row, TabulaLists::CreatedBy)?.map(ActorId),
        created_at: read_timestamp(row, TabulaLists::CreatedAt)?,
    })
}

fn entry_select() -> SelectStatement {
    Query::select()
        .from(TabulaListEntries::Table)
        .columns([
            TabulaListEntries::EntryId,
            TabulaListEntries::ListId,
            TabulaListEntries::RecordId,
            TabulaListEntries::CreatedAt,
            TabulaListEntries::CreatedBy,
            TabulaListEntries::UpdatedAt,
        ])
        .to_owned()
}

fn read_entry(row: &QueryResult) -> TabulaResult<EntryMeta> {
    Ok(EntryMeta {
        id: read_id(row, TabulaListEntries::EntryId)?,
        list_id: read_id(row, TabulaListEntries::ListId)?,
        record_id: read_id(row, TabulaListEntries::RecordId)?,
        created_at: read_timestamp(row, TabulaListEntries::CreatedAt)?,
        created_by: read_opt_id(row, TabulaListEntries::CreatedBy)?.map(ActorId),
        updated_at: read_timestamp(row, TabulaListEntries::UpdatedAt)?,
    })
}
