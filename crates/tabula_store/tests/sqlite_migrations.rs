use std::collections::HashSet;

use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tabula_store::{TabulaConfig, TabulaResult, TabulaStore};
use tempfile::tempdir;

async fn list_tables(store: &TabulaStore) -> TabulaResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(tabula_store::TabulaError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row
            .try_get("", "name")
            .map_err(tabula_store::TabulaError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

#[tokio::test]
async fn sqlite_migrations_create_catalog_and_value_tables() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = TabulaConfig::default_sqlite(base.join("tabula.sqlite").to_string_lossy());
    let store = TabulaStore::connect(&config, base).await?;
    let tables = list_tables(&store).await?;
    for table in [
        "tabula_objects",
        "tabula_attributes",
        "tabula_select_options",
        "tabula_statuses",
        "tabula_records",
        "tabula_record_values",
        "tabula_lists",
        "tabula_list_entries",
        "tabula_list_entry_values",
    ] {
        assert!(tables.contains(table), "expected table '{table}' to exist");
    }
    // Idempotency check.
    let _store = TabulaStore::connect(&config, base).await?;
    Ok(())
}
