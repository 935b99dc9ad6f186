use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::debug;
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use sea_orm::{ConnectionTrait, TransactionTrait};

use super::values::load_slot_values;
use super::{TabulaStore, exec, id_value};
use crate::db::*;
use tabula_core::{
    Attribute, AttributeParent, Id, ListRecordsInput, QueryApi, QueryInput, RecordPage,
    RecordRow, TabulaError, TabulaResult, compile_filter, compile_search, compile_sorts,
};

/// Ids of one page in display order plus the number of matches before windowing.
pub(super) struct PageSelection {
    pub(super) ids: Vec<Id>,
    pub(super) total: u64,
}

impl TabulaStore {
    /// Loads the values the filter, search and sorts reference for `rows`, then keeps
    /// the matching rows in display order.
    pub(super) async fn select_matches<C: ConnectionTrait>(
        &self,
        conn: &C,
        table: ValueTable,
        attributes: &[Attribute],
        mut rows: Vec<RecordRow>,
        input: &QueryInput,
    ) -> TabulaResult<Vec<RecordRow>> {
        let filter = compile_filter(input.filter.as_ref(), attributes, self.unknown_attributes)?;
        let search = compile_search(input.search.as_deref(), attributes);
        let sort = compile_sorts(&input.sorts, attributes, self.unknown_attributes)?;

        let mut referenced: HashSet<Id> = filter.attribute_ids();
        referenced.extend(sort.attribute_ids());
        if let Some(search) = &search {
            referenced.extend(search.attribute_ids.iter().copied());
        }
        let needed: Vec<&Attribute> = attributes
            .iter()
            .filter(|attribute| referenced.contains(&attribute.id))
            .collect();
        if !needed.is_empty() && !rows.is_empty() {
            let owners: Vec<Id> = rows.iter().map(|row| row.id).collect();
            let mut loaded =
                load_slot_values(conn, self.backend, table, &needed, Some(&owners)).await?;
            for row in &mut rows {
                if let Some(values) = loaded.remove(&row.id) {
                    row.values = values;
                }
            }
        }

        rows.retain(|row| {
            filter.matches(&row.values)
                && search.as_ref().is_none_or(|search| search.matches(&row.values))
        });
        sort.sort(&mut rows);
        debug!(
            "{table:?} query: {} filter attrs, {} sort keys, search {}, {} matched",
            filter.attribute_ids().len(),
            sort.keys.len(),
            search.is_some(),
            rows.len(),
        );
        Ok(rows)
    }

    /// First read of a listing: matches, counts and windows `rows`.
    pub(super) async fn select_page<C: ConnectionTrait>(
        &self,
        conn: &C,
        table: ValueTable,
        attributes: &[Attribute],
        rows: Vec<RecordRow>,
        input: &QueryInput,
    ) -> TabulaResult<PageSelection> {
        let limit = input.effective_limit(self.default_page_size, self.max_page_size);
        let matched = self
            .select_matches(conn, table, attributes, rows, input)
            .await?;
        let total = matched.len() as u64;
        let offset = usize::try_from(input.offset).unwrap_or(usize::MAX);
        let ids: Vec<Id> = matched
            .iter()
            .skip(offset)
            .take(limit as usize)
            .map(|row| row.id)
            .collect();
        Ok(PageSelection { ids, total })
    }

    /// Every record of `object_id` the query matches, in display order.
    pub(super) async fn matching_record_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_id: Id,
        input: &QueryInput,
    ) -> TabulaResult<Vec<Id>> {
        let attributes = self
            .fetch_attributes(conn, AttributeParent::Object(object_id))
            .await?;
        let rows = self
            .fetch_record_metas(conn, object_id, None)
            .await?
            .iter()
            .map(|meta| meta.to_row())
            .collect();
        let matched = self
            .select_matches(conn, ValueTable::Record, &attributes, rows, input)
            .await?;
        Ok(matched.into_iter().map(|row| row.id).collect())
    }
}

/// Reorders hydrated items to follow `ids`, dropping ids that vanished in between.
pub(super) fn in_page_order<T>(ids: &[Id], mut hydrated: HashMap<Id, T>) -> Vec<T> {
    ids.iter().filter_map(|id| hydrated.remove(id)).collect()
}

#[async_trait]
impl QueryApi for TabulaStore {
    async fn list_records(
        &self,
        object_id: Id,
        input: ListRecordsInput,
    ) -> TabulaResult<RecordPage> {
        self.require_object(&self.conn, object_id).await?;
        let attributes = self
            .fetch_attributes(&self.conn, AttributeParent::Object(object_id))
            .await?;
        let rows = self
            .fetch_record_metas(&self.conn, object_id, None)
            .await?
            .iter()
            .map(|meta| meta.to_row())
            .collect();
        let selection = self
            .select_page(&self.conn, ValueTable::Record, &attributes, rows, &input)
            .await?;
        let hydrated = self
            .load_record_views(&self.conn, object_id, &selection.ids)
            .await?;
        Ok(RecordPage {
            records: in_page_order(&selection.ids, hydrated),
            total: selection.total,
        })
    }

    async fn reorder_records(&self, object_id: Id, ordered_ids: Vec<Id>) -> TabulaResult<()> {
        self.require_object(&self.conn, object_id).await?;
        let distinct: HashSet<Id> = ordered_ids.iter().copied().collect();
        if distinct.len() != ordered_ids.len() {
            return Err(TabulaError::validation("reorder contains duplicate record ids"));
        }
        let known = self
            .fetch_record_metas(&self.conn, object_id, Some(&ordered_ids))
            .await?;
        if known.len() != ordered_ids.len() {
            return Err(TabulaError::validation(format!(
                "reorder contains ids that are not records of object {object_id}"
            )));
        }
        let tx = self.conn.begin().await?;
        for (position, record_id) in ordered_ids.iter().enumerate() {
            let update = Query::update()
                .table(TabulaRecords::Table)
                .values([(TabulaRecords::Position, (position as i64).into())])
                .and_where(
                    Expr::col(TabulaRecords::RecordId).eq(id_value(self.backend, *record_id)),
                )
                .to_owned();
            exec(&tx, &update).await?;
        }
        tx.commit().await?;
        debug!("reordered {} records of {object_id}", ordered_ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use tempfile::tempdir;

    use super::in_page_order;
    use crate::db::ValueTable;
    use crate::{TabulaConfig, TabulaStore};
    use tabula_core::{
        AttributeParent, AttributeType, CatalogApi, CreateAttributeInput, CreateObjectInput,
        CreateRecordInput, Id, QueryInput, RecordApi, TabulaResult, WorkspaceId,
    };

    #[test]
    fn page_order_skips_vanished_rows() {
        let ids = [Id::new(), Id::new(), Id::new()];
        let hydrated = HashMap::from([(ids[2], "third"), (ids[0], "first")]);
        assert_eq!(in_page_order(&ids, hydrated), vec!["first", "third"]);
    }

    #[tokio::test]
    async fn total_is_counted_before_hydration() -> TabulaResult<()> {
        let dir = tempdir().expect("tempdir");
        let config = TabulaConfig::default_sqlite(dir.path().join("tabula.sqlite").to_string_lossy());
        let store = TabulaStore::connect(&config, dir.path()).await?;
        let object = store
            .create_object(CreateObjectInput {
                workspace_id: WorkspaceId(Id::new()),
                slug: "tasks".to_string(),
                singular_name: "Task".to_string(),
                plural_name: "Tasks".to_string(),
                icon: None,
                is_system: false,
            })
            .await?;
        store
            .create_attribute(CreateAttributeInput::new(
                AttributeParent::Object(object.id),
                "title",
                "Title",
                AttributeType::Text,
            ))
            .await?;
        for title in ["one", "two", "three"] {
            store
                .create_record(CreateRecordInput {
                    object_id: object.id,
                    values: json!({ "title": title }).as_object().cloned().unwrap_or_default(),
                    actor: None,
                })
                .await?;
        }

        let attributes = store
            .fetch_attributes(&store.conn, AttributeParent::Object(object.id))
            .await?;
        let rows = store
            .fetch_record_metas(&store.conn, object.id, None)
            .await?
            .iter()
            .map(|meta| meta.to_row())
            .collect();
        let selection = store
            .select_page(
                &store.conn,
                ValueTable::Record,
                &attributes,
                rows,
                &QueryInput::default(),
            )
            .await?;
        assert_eq!(selection.total, 3);

        store.delete_record(object.id, selection.ids[0]).await?;
        let hydrated = store
            .load_record_views(&store.conn, object.id, &selection.ids)
            .await?;
        let page = in_page_order(&selection.ids, hydrated);
        let ids: Vec<Id> = page.iter().map(|record| record.id).collect();
        assert_eq!(selection.total, 3);
        assert_eq!(ids, selection.ids[1..].to_vec());
        Ok(())
    }
}
