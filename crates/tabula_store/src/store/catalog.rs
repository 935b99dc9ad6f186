use std::collections::HashMap;

use async_trait::async_trait;
use log::info;
use sea_orm::sea_query::{Expr, ExprTrait, Order, Query};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, TransactionTrait};
use serde_json::Value as JsonValue;

use super::values::{
    attribute_has_values, delete_attribute_values, load_slot_values, rekey_unique_values,
    unique_key, upsert_value,
};
use super::{
    FAILPOINT_AFTER_ATTRIBUTE_INSERT, FAILPOINT_AFTER_OPTION_INSERT,
    FAILPOINT_AFTER_VALUE_DELETE, TabulaStore, col_name, exec, id_value, id_values, query_all,
    query_one, read_id, read_timestamp, require_name,
};
use crate::db::*;
use tabula_core::{
    Attribute, AttributeParent, AttributeType, CatalogApi, CreateAttributeInput,
    CreateObjectInput, Id, NewSelectOption, NewStatus, Object, SelectOption, SlotValue,
    Status, TabulaError, TabulaResult, Timestamp, UpdateAttributeInput, UpdateObjectInput,
    WorkspaceId, supports_multiselect, validate_slug,
};

impl TabulaStore {
    pub(super) async fn fetch_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
    ) -> TabulaResult<Option<Object>> {
        let select = object_select()
            .and_where(Expr::col(TabulaObjects::ObjectId).eq(id_value(self.backend, object_id)))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_object(&row))
            .transpose()
    }

    pub(super) async fn require_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
    ) -> TabulaResult<Object> {
        self.fetch_object(conn, object_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("object {object_id}")))
    }

    /// Attributes of one parent with their options and statuses, in display order.
    pub(super) async fn fetch_attributes<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: AttributeParent,
    ) -> TabulaResult<Vec<Attribute>> {
        let select = attribute_select()
            .and_where(Expr::col(TabulaAttributes::ParentKind).eq(parent.kind_code()))
            .and_where(Expr::col(TabulaAttributes::ParentId).eq(id_value(self.backend, parent.id())))
            .order_by(TabulaAttributes::SortOrder, Order::Asc)
            .order_by(TabulaAttributes::Slug, Order::Asc)
            .to_owned();
        let mut attributes = query_all(conn, &select)
            .await?
            .iter()
            .map(read_attribute)
            .collect::<TabulaResult<Vec<_>>>()?;
        self.attach_choices(conn, &mut attributes).await?;
        Ok(attributes)
    }

    pub(super) async fn fetch_attribute<C: ConnectionTrait>(
        &self,
        conn: &C,
        attribute_id: Id,
    ) -> TabulaResult<Option<Attribute>> {
        let select = attribute_select()
            .and_where(
                Expr::col(TabulaAttributes::AttributeId).eq(id_value(self.backend, attribute_id)),
            )
            .to_owned();
        let Some(row) = query_one(conn, &select).await? else {
            return Ok(None);
        };
        let mut attributes = vec![read_attribute(&row)?];
        self.attach_choices(conn, &mut attributes).await?;
        Ok(attributes.pop())
    }

    /// Record-reference attributes across every object.
    pub(super) async fn fetch_record_reference_attributes<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> TabulaResult<Vec<Attribute>> {
        let select = attribute_select()
            .and_where(
                Expr::col(TabulaAttributes::ParentKind)
                    .eq(AttributeParent::OBJECT_KIND),
            )
            .and_where(
                Expr::col(TabulaAttributes::AttributeType)
                    .eq(AttributeType::RecordReference.as_str()),
            )
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_attribute)
            .collect()
    }

    async fn attach_choices<C: ConnectionTrait>(
        &self,
        conn: &C,
        attributes: &mut [Attribute],
    ) -> TabulaResult<()> {
        let select_ids: Vec<Id> = attributes
            .iter()
            .filter(|attribute| attribute.attribute_type == AttributeType::Select)
            .map(|attribute| attribute.id)
            .collect();
        let status_ids: Vec<Id> = attributes
            .iter()
            .filter(|attribute| attribute.attribute_type == AttributeType::Status)
            .map(|attribute| attribute.id)
            .collect();
        let mut options: HashMap<Id, Vec<SelectOption>> = HashMap::new();
        if !select_ids.is_empty() {
            let select = option_select()
                .and_where(
                    Expr::col(TabulaSelectOptions::AttributeId)
                        .is_in(id_values(self.backend, select_ids)),
                )
                .order_by(TabulaSelectOptions::SortOrder, Order::Asc)
                .to_owned();
            for row in query_all(conn, &select).await? {
                let option = read_option(&row)?;
                options.entry(option.attribute_id).or_default().push(option);
            }
        }
        let mut statuses: HashMap<Id, Vec<Status>> = HashMap::new();
        if !status_ids.is_empty() {
            let select = status_select()
                .and_where(
                    Expr::col(TabulaStatuses::AttributeId).is_in(id_values(self.backend, status_ids)),
                )
                .order_by(TabulaStatuses::SortOrder, Order::Asc)
                .to_owned();
            for row in query_all(conn, &select).await? {
                let status = read_status(&row)?;
                statuses.entry(status.attribute_id).or_default().push(status);
            }
        }
        for attribute in attributes.iter_mut() {
            attribute.options = options.remove(&attribute.id).unwrap_or_default();
            attribute.statuses = statuses.remove(&attribute.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn parent_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: AttributeParent,
    ) -> TabulaResult<bool> {
        Ok(match parent {
            AttributeParent::Object(object_id) => {
                self.fetch_object(conn, object_id).await?.is_some()
            }
            AttributeParent::List(list_id) => self.fetch_list(conn, list_id).await?.is_some(),
        })
    }

    /// Deletes attributes with their options, statuses and value rows. Runs inside the
    /// caller's transaction.
    pub(super) async fn purge_attributes<C: ConnectionTrait>(
        &self,
        conn: &C,
        table: ValueTable,
        attribute_ids: &[Id],
    ) -> TabulaResult<()> {
        if attribute_ids.is_empty() {
            return Ok(());
        }
        let ids = || id_values(self.backend, attribute_ids.iter().copied());
        let delete_options = Query::delete()
            .from_table(TabulaSelectOptions::Table)
            .and_where(Expr::col(TabulaSelectOptions::AttributeId).is_in(ids()))
            .to_owned();
        exec(conn, &delete_options).await?;
        let delete_statuses = Query::delete()
            .from_table(TabulaStatuses::Table)
            .and_where(Expr::col(TabulaStatuses::AttributeId).is_in(ids()))
            .to_owned();
        exec(conn, &delete_statuses).await?;
        delete_attribute_values(conn, self.backend, table, attribute_ids).await?;
        self.maybe_failpoint(FAILPOINT_AFTER_VALUE_DELETE)?;
        let delete_attributes = Query::delete()
            .from_table(TabulaAttributes::Table)
            .and_where(Expr::col(TabulaAttributes::AttributeId).is_in(ids()))
            .to_owned();
        exec(conn, &delete_attributes).await
    }

    /// Clears single-valued rows pointing at a removed choice and drops it from sets.
    async fn detach_choice<C: ConnectionTrait>(
        &self,
        conn: &C,
        attribute: &Attribute,
        choice_id: Id,
    ) -> TabulaResult<()> {
        let table = value_table_for(attribute.parent);
        if !attribute.is_multiselect {
            let delete = Query::delete()
                .from_table(table)
                .and_where(Expr::col(ValueCol::AttributeId).eq(id_value(self.backend, attribute.id)))
                .and_where(Expr::col(ValueCol::ValueRef).eq(id_value(self.backend, choice_id)))
                .to_owned();
            return exec(conn, &delete).await;
        }
        let member = JsonValue::String(choice_id.to_uuid_string());
        let loaded = load_slot_values(conn, self.backend, table, &[attribute], None).await?;
        let now = Timestamp::now();
        for (owner_id, slots) in loaded {
            let Some(SlotValue::Structured(JsonValue::Array(items))) = slots.get(&attribute.id)
            else {
                continue;
            };
            if !items.contains(&member) {
                continue;
            }
            let remaining: Vec<JsonValue> =
                items.iter().filter(|item| **item != member).cloned().collect();
            if remaining.is_empty() {
                let delete = Query::delete()
                    .from_table(table)
                    .and_where(Expr::col(ValueCol::OwnerId).eq(id_value(self.backend, owner_id)))
                    .and_where(
                        Expr::col(ValueCol::AttributeId).eq(id_value(self.backend, attribute.id)),
                    )
                    .to_owned();
                exec(conn, &delete).await?;
            } else {
                let slot = SlotValue::Structured(JsonValue::Array(remaining));
                let key = attribute
                    .is_unique
                    .then(|| unique_key(attribute, &slot))
                    .transpose()?;
                upsert_value(conn, self.backend, table, owner_id, attribute.id, &slot, key, now)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogApi for TabulaStore {
    async fn create_object(&self, input: CreateObjectInput) -> TabulaResult<Object> {
        validate_slug(&input.slug)?;
        let singular_name = require_name("singular name", &input.singular_name)?;
        let plural_name = require_name("plural name", &input.plural_name)?;
        if self.get_object(input.workspace_id, &input.slug).await?.is_some() {
            return Err(TabulaError::conflict(format!(
                "object slug '{}' already exists",
                input.slug
            )));
        }
        let object = Object {
            id: Id::new(),
            workspace_id: input.workspace_id,
            slug: input.slug,
            singular_name,
            plural_name,
            icon: input.icon,
            is_system: input.is_system,
            created_at: Timestamp::now(),
        };
        let insert = Query::insert()
            .into_table(TabulaObjects::Table)
            .columns([
                TabulaObjects::ObjectId,
                TabulaObjects::WorkspaceId,
                TabulaObjects::Slug,
                TabulaObjects::SingularName,
                TabulaObjects::PluralName,
                TabulaObjects::Icon,
                TabulaObjects::IsSystem,
                TabulaObjects::CreatedAt,
            ])
            .values_panic([
                id_value(self.backend, object.id).into(),
                id_value(self.backend, object.workspace_id.0).into(),
                object.slug.clone().into(),
                object.singular_name.clone().into(),
                object.plural_name.clone().into(),
                object.icon.clone().into(),
                object.is_system.into(),
                object.created_at.as_micros().into(),
            ])
            .to_owned();
        exec(&self.conn, &insert).await?;
        info!("created object {} ({})", object.slug, object.id);
        Ok(object)
    }

    async fn get_object(&self, workspace: WorkspaceId, slug: &str) -> TabulaResult<Option<Object>> {
        let select = object_select()
            .and_where(Expr::col(TabulaObjects::WorkspaceId).eq(id_value(self.backend, workspace.0)))
            .and_where(Expr::col(TabulaObjects::Slug).eq(slug))
            .to_owned();
        query_one(&self.conn, &select)
            .await?
            .map(|row| read_object(&row))
            .transpose()
    }

    async fn get_object_by_id(&self, object_id: Id) -> TabulaResult<Option<Object>> {
        self.fetch_object(&self.conn, object_id).await
    }

    async fn list_objects(&self, workspace: WorkspaceId) -> TabulaResult<Vec<Object>> {
        let select = object_select()
            .and_where(Expr::col(TabulaObjects::WorkspaceId).eq(id_value(self.backend, workspace.0)))
            .order_by(TabulaObjects::Slug, Order::Asc)
            .to_owned();
        query_all(&self.conn, &select)
            .await?
            .iter()
            .map(read_object)
            .collect()
    }

    async fn update_object(
        &self,
        object_id: Id,
        input: UpdateObjectInput,
    ) -> TabulaResult<Object> {
        let mut object = self.require_object(&self.conn, object_id).await?;
        if let Some(name) = input.singular_name {
            object.singular_name = require_name("singular name", &name)?;
        }
        if let Some(name) = input.plural_name {
            object.plural_name = require_name("plural name", &name)?;
        }
        if input.icon.is_some() {
            object.icon = input.icon;
        }
        let update = Query::update()
            .table(TabulaObjects::Table)
            .values([
                (TabulaObjects::SingularName, object.singular_name.clone().into()),
                (TabulaObjects::PluralName, object.plural_name.clone().into()),
                (TabulaObjects::Icon, object.icon.clone().into()),
            ])
            .and_where(Expr::col(TabulaObjects::ObjectId).eq(id_value(self.backend, object_id)))
            .to_owned();
        exec(&self.conn, &update).await?;
        Ok(object)
    }

    async fn delete_object(&self, object_id: Id) -> TabulaResult<()> {
        let object = self.require_object(&self.conn, object_id).await?;
        if object.is_system {
            return Err(TabulaError::policy(format!(
                "system object '{}' cannot be deleted",
                object.slug
            )));
        }
        let tx = self.conn.begin().await?;
        for list in self.fetch_lists_for_object(&tx, object_id).await? {
            self.purge_list(&tx, list.id).await?;
        }
        let attribute_ids: Vec<Id> = self
            .fetch_attributes(&tx, AttributeParent::Object(object_id))
            .await?
            .iter()
            .map(|attribute| attribute.id)
            .collect();
        self.purge_attributes(&tx, ValueTable::Record, &attribute_ids)
            .await?;
        let delete_records = Query::delete()
            .from_table(TabulaRecords::Table)
            .and_where(Expr::col(TabulaRecords::ObjectId).eq(id_value(self.backend, object_id)))
            .to_owned();
        exec(&tx, &delete_records).await?;
        let delete_object = Query::delete()
            .from_table(TabulaObjects::Table)
            .and_where(Expr::col(TabulaObjects::ObjectId).eq(id_value(self.backend, object_id)))
            .to_owned();
        exec(&tx, &delete_object).await?;
        tx.commit().await?;
        info!("deleted object {} ({object_id})", object.slug);
        Ok(())
    }

    async fn get_attributes_for_object(&self, object_id: Id) -> TabulaResult<Vec<Attribute>> {
        self.fetch_attributes(&self.conn, AttributeParent::Object(object_id))
            .await
    }

    async fn get_attributes_for_list(&self, list_id: Id) -> TabulaResult<Vec<Attribute>> {
        self.fetch_attributes(&self.conn, AttributeParent::List(list_id))
            .await
    }

    async fn get_attribute(&self, attribute_id: Id) -> TabulaResult<Option<Attribute>> {
        self.fetch_attribute(&self.conn, attribute_id).await
    }

    async fn create_attribute(&self, input: CreateAttributeInput) -> TabulaResult<Attribute> {
        input.validate()?;
        let title = require_name("attribute title", &input.title)?;
        if !self.parent_exists(&self.conn, input.parent).await? {
            return Err(TabulaError::not_found(format!(
                "attribute parent {}",
                input.parent.id()
            )));
        }
        let existing = self.fetch_attributes(&self.conn, input.parent).await?;
        if existing.iter().any(|attribute| attribute.slug == input.slug) {
            return Err(TabulaError::conflict(format!(
                "attribute slug '{}' already exists",
                input.slug
            )));
        }
        let sort_order = input.sort_order.unwrap_or_else(|| {
            existing
                .iter()
                .map(|attribute| attribute.sort_order)
                .max()
                .map(|max| max + 1)
                .unwrap_or(0)
        });
        let mut attribute = Attribute {
            id: Id::new(),
            parent: input.parent,
            slug: input.slug.clone(),
            title,
            attribute_type: input.attribute_type,
            config: input.config_or_default(),
            is_system: input.is_system,
            is_required: input.is_required,
            is_unique: input.is_unique,
            is_multiselect: input.is_multiselect,
            sort_order,
            options: Vec::new(),
            statuses: Vec::new(),
            created_at: Timestamp::now(),
        };

        let tx = self.conn.begin().await?;
        let insert = Query::insert()
            .into_table(TabulaAttributes::Table)
            .columns([
                TabulaAttributes::AttributeId,
                TabulaAttributes::ParentKind,
                TabulaAttributes::ParentId,
                TabulaAttributes::Slug,
                TabulaAttributes::Title,
                TabulaAttributes::AttributeType,
                TabulaAttributes::ConfigJson,
                TabulaAttributes::IsSystem,
                TabulaAttributes::IsRequired,
                TabulaAttributes::IsUnique,
                TabulaAttributes::IsMultiselect,
                TabulaAttributes::SortOrder,
                TabulaAttributes::CreatedAt,
            ])
            .values_panic([
                id_value(self.backend, attribute.id).into(),
                attribute.parent.kind_code().into(),
                id_value(self.backend, attribute.parent.id()).into(),
                attribute.slug.clone().into(),
                attribute.title.clone().into(),
                attribute.attribute_type.as_str().into(),
                attribute.config.to_string().into(),
                attribute.is_system.into(),
                attribute.is_required.into(),
                attribute.is_unique.into(),
                attribute.is_multiselect.into(),
                attribute.sort_order.into(),
                attribute.created_at.as_micros().into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        self.maybe_failpoint(FAILPOINT_AFTER_ATTRIBUTE_INSERT)?;
        for (index, option) in input.options.iter().enumerate() {
            let option =
                insert_option(&tx, self.backend, attribute.id, option, index as i32).await?;
            attribute.options.push(option);
            self.maybe_failpoint(FAILPOINT_AFTER_OPTION_INSERT)?;
        }
        for (index, status) in input.statuses.iter().enumerate() {
            let status =
                insert_status(&tx, self.backend, attribute.id, status, index as i32).await?;
            attribute.statuses.push(status);
            self.maybe_failpoint(FAILPOINT_AFTER_OPTION_INSERT)?;
        }
        tx.commit().await?;
        info!(
            "created {} attribute {} ({})",
            attribute.attribute_type, attribute.slug, attribute.id
        );
        Ok(attribute)
    }

    async fn update_attribute(
        &self,
        attribute_id: Id,
        input: UpdateAttributeInput,
    ) -> TabulaResult<Attribute> {
        let current = self
            .fetch_attribute(&self.conn, attribute_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("attribute {attribute_id}")))?;
        let mut next = current.clone();
        if let Some(slug) = input.slug {
            validate_slug(&slug)?;
            if slug != current.slug {
                let siblings = self.fetch_attributes(&self.conn, current.parent).await?;
                if siblings.iter().any(|attribute| attribute.slug == slug) {
                    return Err(TabulaError::conflict(format!(
                        "attribute slug '{slug}' already exists"
                    )));
                }
            }
            next.slug = slug;
        }
        if let Some(title) = input.title {
            next.title = require_name("attribute title", &title)?;
        }
        if let Some(attribute_type) = input.attribute_type {
            if attribute_type != current.attribute_type && current.is_system {
                return Err(TabulaError::policy(format!(
                    "system attribute '{}' cannot change type",
                    current.slug
                )));
            }
            next.attribute_type = attribute_type;
        }
        if let Some(config) = input.config {
            if !config.is_object() {
                return Err(TabulaError::validation("attribute config must be an object"));
            }
            next.config = config;
        }
        if let Some(is_required) = input.is_required {
            next.is_required = is_required;
        }
        if let Some(is_unique) = input.is_unique {
            next.is_unique = is_unique;
        }
        if let Some(is_multiselect) = input.is_multiselect {
            next.is_multiselect = is_multiselect;
        }
        if let Some(sort_order) = input.sort_order {
            next.sort_order = sort_order;
        }
        if next.is_multiselect && !supports_multiselect(next.attribute_type) {
            return Err(TabulaError::validation(format!(
                "{} attributes cannot be multiselect",
                next.attribute_type
            )));
        }

        let table = value_table_for(current.parent);
        let tx = self.conn.begin().await?;
        if storage_changes(&current, &next)
            && attribute_has_values(&tx, self.backend, table, attribute_id).await?
        {
            return Err(TabulaError::validation(format!(
                "{} has values; its storage cannot change",
                current.slug
            )));
        }
        let update = Query::update()
            .table(TabulaAttributes::Table)
            .values([
                (TabulaAttributes::Slug, next.slug.clone().into()),
                (TabulaAttributes::Title, next.title.clone().into()),
                (
                    TabulaAttributes::AttributeType,
                    next.attribute_type.as_str().into(),
                ),
                (TabulaAttributes::ConfigJson, next.config.to_string().into()),
                (TabulaAttributes::IsRequired, next.is_required.into()),
                (TabulaAttributes::IsUnique, next.is_unique.into()),
                (TabulaAttributes::IsMultiselect, next.is_multiselect.into()),
                (TabulaAttributes::SortOrder, next.sort_order.into()),
            ])
            .and_where(
                Expr::col(TabulaAttributes::AttributeId).eq(id_value(self.backend, attribute_id)),
            )
            .to_owned();
        exec(&tx, &update).await?;
        if next.is_unique != current.is_unique {
            rekey_unique_values(&tx, self.backend, table, &next, next.is_unique).await?;
        }
        tx.commit().await?;
        Ok(next)
    }

    async fn delete_attribute(&self, attribute_id: Id) -> TabulaResult<()> {
        let attribute = self
            .fetch_attribute(&self.conn, attribute_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("attribute {attribute_id}")))?;
        if attribute.is_system {
            return Err(TabulaError::policy(format!(
                "system attribute '{}' cannot be deleted",
                attribute.slug
            )));
        }
        let tx = self.conn.begin().await?;
        self.purge_attributes(&tx, value_table_for(attribute.parent), &[attribute_id])
            .await?;
        tx.commit().await?;
        info!("deleted attribute {} ({attribute_id})", attribute.slug);
        Ok(())
    }

    async fn add_select_option(
        &self,
        attribute_id: Id,
        option: NewSelectOption,
    ) -> TabulaResult<SelectOption> {
        let attribute = self.require_choice_attribute(attribute_id, AttributeType::Select).await?;
        insert_option(
            &self.conn,
            self.backend,
            attribute_id,
            &option,
            next_choice_order(&attribute),
        )
        .await
    }

    async fn add_status(&self, attribute_id: Id, status: NewStatus) -> TabulaResult<Status> {
        let attribute = self.require_choice_attribute(attribute_id, AttributeType::Status).await?;
        insert_status(
            &self.conn,
            self.backend,
            attribute_id,
            &status,
            next_choice_order(&attribute),
        )
        .await
    }

    async fn remove_select_option(&self, option_id: Id) -> TabulaResult<()> {
        let select = option_select()
            .and_where(Expr::col(TabulaSelectOptions::OptionId).eq(id_value(self.backend, option_id)))
            .to_owned();
        let option = query_one(&self.conn, &select)
            .await?
            .map(|row| read_option(&row))
            .transpose()?
            .ok_or_else(|| TabulaError::not_found(format!("select option {option_id}")))?;
        let attribute = self
            .require_choice_attribute(option.attribute_id, AttributeType::Select)
            .await?;
        let tx = self.conn.begin().await?;
        let delete = Query::delete()
            .from_table(TabulaSelectOptions::Table)
            .and_where(Expr::col(TabulaSelectOptions::OptionId).eq(id_value(self.backend, option_id)))
            .to_owned();
        exec(&tx, &delete).await?;
        self.detach_choice(&tx, &attribute, option_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_status(&self, status_id: Id) -> TabulaResult<()> {
        let select = status_select()
            .and_where(Expr::col(TabulaStatuses::StatusId).eq(id_value(self.backend, status_id)))
            .to_owned();
        let status = query_one(&self.conn, &select)
            .await?
            .map(|row| read_status(&row))
            .transpose()?
            .ok_or_else(|| TabulaError::not_found(format!("status {status_id}")))?;
        let attribute = self
            .require_choice_attribute(status.attribute_id, AttributeType::Status)
            .await?;
        let tx = self.conn.begin().await?;
        let delete = Query::delete()
            .from_table(TabulaStatuses::Table)
            .and_where(Expr::col(TabulaStatuses::StatusId).eq(id_value(self.backend, status_id)))
            .to_owned();
        exec(&tx, &delete).await?;
        self.detach_choice(&tx, &attribute, status_id).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl TabulaStore {
    async fn require_choice_attribute(
        &self,
        attribute_id: Id,
        expected: AttributeType,
    ) -> TabulaResult<Attribute> {
        let attribute = self
            .fetch_attribute(&self.conn, attribute_id)
            .await?
            .ok_or_else(|| TabulaError::not_found(format!("attribute {attribute_id}")))?;
        if attribute.attribute_type != expected {
            return Err(TabulaError::validation(format!(
                "{} is not a {expected} attribute",
                attribute.slug
            )));
        }
        Ok(attribute)
    }
}

pub(super) fn value_table_for(parent: AttributeParent) -> ValueTable {
    match parent {
        AttributeParent::Object(_) => ValueTable::Record,
        AttributeParent::List(_) => ValueTable::ListEntry,
    }
}

fn next_choice_order(attribute: &Attribute) -> i32 {
    let max = match attribute.attribute_type {
        AttributeType::Select => attribute.options.iter().map(|o| o.sort_order).max(),
        _ => attribute.statuses.iter().map(|s| s.sort_order).max(),
    };
    max.map(|max| max + 1).unwrap_or(0)
}

/// Existing rows only survive a retype that keeps both the slot and its meaning; ids of
/// select options, statuses and records are not interchangeable, and currency rows carry
/// a code column.
fn storage_changes(current: &Attribute, next: &Attribute) -> bool {
    let qualified = |attribute_type: AttributeType| {
        matches!(
            attribute_type,
            AttributeType::Currency
                | AttributeType::Select
                | AttributeType::Status
                | AttributeType::RecordReference
                | AttributeType::ActorReference
        )
    };
    current.storage_slot() != next.storage_slot()
        || (current.attribute_type != next.attribute_type
            && (qualified(current.attribute_type) || qualified(next.attribute_type)))
}

async fn insert_option<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    attribute_id: Id,
    option: &NewSelectOption,
    sort_order: i32,
) -> TabulaResult<SelectOption> {
    let option = SelectOption {
        id: Id::new(),
        attribute_id,
        title: require_name("option title", &option.title)?,
        color: option.color.clone(),
        sort_order,
    };
    let insert = Query::insert()
        .into_table(TabulaSelectOptions::Table)
        .columns([
            TabulaSelectOptions::OptionId,
            TabulaSelectOptions::AttributeId,
            TabulaSelectOptions::Title,
            TabulaSelectOptions::Color,
            TabulaSelectOptions::SortOrder,
        ])
        .values_panic([
            id_value(backend, option.id).into(),
            id_value(backend, attribute_id).into(),
            option.title.clone().into(),
            option.color.clone().into(),
            option.sort_order.into(),
        ])
        .to_owned();
    exec(conn, &insert).await?;
    Ok(option)
}

async fn insert_status<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    attribute_id: Id,
    status: &NewStatus,
    sort_order: i32,
) -> TabulaResult<Status> {
    let status = Status {
        id: Id::new(),
        attribute_id,
        title: require_name("status title", &status.title)?,
        color: status.color.clone(),
        sort_order,
        is_active: status.is_active,
        celebration_enabled: status.celebration_enabled,
    };
    let insert = Query::insert()
        .into_table(TabulaStatuses::Table)
        .columns([
            TabulaStatuses::StatusId,
            TabulaStatuses::AttributeId,
            TabulaStatuses::Title,
            TabulaStatuses::Color,
            TabulaStatuses::SortOrder,
            TabulaStatuses::IsActive,
            TabulaStatuses::CelebrationEnabled,
        ])
        .values_panic([
            id_value(backend, status.id).into(),
            id_value(backend, attribute_id).into(),
            status.title.clone().into(),
            status.color.clone().into(),
            status.sort_order.into(),
            status.is_active.into(),
            status.celebration_enabled.into(),
        ])
        .to_owned();
    exec(conn, &insert).await?;
    Ok(status)
}

fn object_select() -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .from(TabulaObjects::Table)
        .columns([
            TabulaObjects::ObjectId,
            TabulaObjects::WorkspaceId,
            TabulaObjects::Slug,
            TabulaObjects::SingularName,
            TabulaObjects::PluralName,
            TabulaObjects::Icon,
            TabulaObjects::IsSystem,
            TabulaObjects::CreatedAt,
        ])
        .to_owned()
}

fn read_object(row: &QueryResult) -> TabulaResult<Object> {
    Ok(Object {
        id: read_id(row, TabulaObjects::ObjectId)?,
        workspace_id: WorkspaceId(read_id(row, TabulaObjects::WorkspaceId)?),
        slug: row.try_get("", &col_name(TabulaObjects::Slug))?,
        singular_name: row.try_get("", &col_name(TabulaObjects::SingularName))?,
        plural_name: row.try_get("", &col_name(TabulaObjects::PluralName))?,
        icon: row.try_get("", &col_name(TabulaObjects::Icon))?,
        is_system: row.try_get("", &col_name(TabulaObjects::IsSystem))?,
        created_at: read_timestamp(row, TabulaObjects::CreatedAt)?,
    })
}

fn attribute_select() -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .from(TabulaAttributes::Table)
        .columns([
            TabulaAttributes::AttributeId,
            TabulaAttributes::ParentKind,
            TabulaAttributes::ParentId,
            TabulaAttributes::Slug,
            TabulaAttributes::Title,
            TabulaAttributes::AttributeType,
            TabulaAttributes::ConfigJson,
            TabulaAttributes::IsSystem,
            TabulaAttributes::IsRequired,
            TabulaAttributes::IsUnique,
            TabulaAttributes::IsMultiselect,
            TabulaAttributes::SortOrder,
            TabulaAttributes::CreatedAt,
        ])
        .to_owned()
}

fn read_attribute(row: &QueryResult) -> TabulaResult<Attribute> {
    let parent_kind: i16 = row.try_get("", &col_name(TabulaAttributes::ParentKind))?;
    let parent_id = read_id(row, TabulaAttributes::ParentId)?;
    let parent = AttributeParent::from_parts(parent_kind, parent_id)
        .ok_or_else(|| TabulaError::storage(format!("unknown attribute parent kind {parent_kind}")))?;
    let attribute_type: String = row.try_get("", &col_name(TabulaAttributes::AttributeType))?;
    let config: String = row.try_get("", &col_name(TabulaAttributes::ConfigJson))?;
    Ok(Attribute {
        id: read_id(row, TabulaAttributes::AttributeId)?,
        parent,
        slug: row.try_get("", &col_name(TabulaAttributes::Slug))?,
        title: row.try_get("", &col_name(TabulaAttributes::Title))?,
        attribute_type: attribute_type
            .parse()
            .map_err(|_| TabulaError::storage(format!("unknown attribute type '{attribute_type}'")))?,
        config: serde_json::from_str(&config)?,
        is_system: row.try_get("", &col_name(TabulaAttributes::IsSystem))?,
        is_required: row.try_get("", &col_name(TabulaAttributes::IsRequired))?,
        is_unique: row.try_get("", &col_name(TabulaAttributes::IsUnique))?,
        is_multiselect: row.try_get("", &col_name(TabulaAttributes::IsMultiselect))?,
        sort_order: row.try_get("", &col_name(TabulaAttributes::SortOrder))?,
        options: Vec::new(),
        statuses: Vec::new(),
        created_at: read_timestamp(row, TabulaAttributes::CreatedAt)?,
    })
}

fn option_select() -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .from(TabulaSelectOptions::Table)
        .columns([
            TabulaSelectOptions::OptionId,
            TabulaSelectOptions::AttributeId,
            TabulaSelectOptions::Title,
            TabulaSelectOptions::Color,
            TabulaSelectOptions::SortOrder,
        ])
        .to_owned()
}

fn read_option(row: &QueryResult) -> TabulaResult<SelectOption> {
    Ok(SelectOption {
        id: read_id(row, TabulaSelectOptions::OptionId)?,
        attribute_id: read_id(row, TabulaSelectOptions::AttributeId)?,
        title: row.try_get("", &col_name(TabulaSelectOptions::Title))?,
        color: row.try_get("", &col_name(TabulaSelectOptions::Color))?,
        sort_order: row.try_get("", &col_name(TabulaSelectOptions::SortOrder))?,
    })
}

fn status_select() -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .from(TabulaStatuses::Table)
        .columns([
            TabulaStatuses::StatusId,
            TabulaStatuses::AttributeId,
            TabulaStatuses::Title,
            TabulaStatuses::Color,
            TabulaStatuses::SortOrder,
            TabulaStatuses::IsActive,
            TabulaStatuses::CelebrationEnabled,
        ])
        .to_owned()
}

fn read_status(row: &QueryResult) -> TabulaResult<Status> {
    Ok(Status {
        id: read_id(row, TabulaStatuses::StatusId)?,
        attribute_id: read_id(row, TabulaStatuses::AttributeId)?,
        title: row.try_get("", &col_name(TabulaStatuses::Title))?,
        color: row.try_get("", &col_name(TabulaStatuses::Color))?,
        sort_order: row.try_get("", &col_name(TabulaStatuses::SortOrder))?,
        is_active: row.try_get("", &col_name(TabulaStatuses::IsActive))?,
        celebration_enabled: row.try_get("", &col_name(TabulaStatuses::CelebrationEnabled))?,
    })
}
