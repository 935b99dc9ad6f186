use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use sea_orm::sea_query;
use sea_orm::sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::migration::Migrator;
use crate::TabulaConfig;
use tabula_core::{Id, TabulaError, TabulaResult, Timestamp, UnknownAttributes};

mod catalog;
mod lists;
mod query;
mod records;
mod values;

/// Failure injection points honoured by multi-row writes.
pub const FAILPOINT_AFTER_ATTRIBUTE_INSERT: &str = "after_attribute_insert";
pub const FAILPOINT_AFTER_OPTION_INSERT: &str = "after_option_insert";
pub const FAILPOINT_AFTER_VALUE_DELETE: &str = "after_value_delete";
pub const FAILPOINT_AFTER_ENTRY_DELETE: &str = "after_entry_delete";

#[derive(Clone)]
pub struct TabulaStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    default_page_size: u32,
    max_page_size: u32,
    unknown_attributes: UnknownAttributes,
    failpoints: HashSet<String>,
}

impl TabulaStore {
    pub async fn connect(config: &TabulaConfig, base_dir: &Path) -> TabulaResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await?;
        let backend = conn.get_database_backend();
        let (default_page_size, max_page_size) = config.page_sizes();
        let failpoints = config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let store = Self {
            conn,
            backend,
            default_page_size,
            max_page_size,
            unknown_attributes: config.unknown_filter_attributes.unwrap_or_default(),
            failpoints,
        };
        Migrator::up(&store.conn, None).await?;
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> TabulaResult<Self> {
        let config = TabulaConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    fn maybe_failpoint(&self, key: &str) -> TabulaResult<()> {
        if self.failpoints.contains(key) {
            Err(TabulaError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => {
            let uuid = Uuid::from_bytes(id.as_bytes());
            SeaValue::Uuid(Some(uuid))
        }
        DatabaseBackend::MySql => SeaValue::Bytes(Some(id.as_vec())),
        _ => SeaValue::String(Some(id.to_uuid_string())),
    }
}

fn none_id_value(backend: DatabaseBackend) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::Uuid(None),
        DatabaseBackend::MySql => SeaValue::Bytes(None),
        _ => SeaValue::String(None),
    }
}

fn opt_id_value(backend: DatabaseBackend, id: Option<Id>) -> SeaValue {
    match id {
        Some(id) => id_value(backend, id),
        None => none_id_value(backend),
    }
}

fn id_values(backend: DatabaseBackend, ids: impl IntoIterator<Item = Id>) -> Vec<SeaValue> {
    ids.into_iter().map(|id| id_value(backend, id)).collect()
}

fn bytes_to_id(bytes: Vec<u8>) -> Option<Id> {
    if bytes.len() == 16 {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Some(Id::from_bytes(buf))
    } else {
        None
    }
}

fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> TabulaResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&value);
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", &name) {
        return bytes_to_id(value).ok_or_else(|| TabulaError::storage("invalid id length"));
    }
    Err(TabulaError::storage("unsupported id format"))
}

fn read_opt_id(row: &QueryResult, column: impl sea_query::Iden) -> TabulaResult<Option<Id>> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<Option<String>>("", &name) {
        return value.map(|value| Id::from_uuid_str(&value)).transpose();
    }
    if let Ok(value) = row.try_get::<Option<Uuid>>("", &name) {
        return Ok(value.map(|value| Id::from_bytes(*value.as_bytes())));
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>>("", &name) {
        return Ok(value.and_then(bytes_to_id));
    }
    Ok(None)
}

fn read_timestamp(row: &QueryResult, column: impl sea_query::Iden) -> TabulaResult<Timestamp> {
    let value: i64 = row.try_get("", &col_name(column))?;
    Ok(Timestamp::from_micros(value))
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> TabulaResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> TabulaResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> TabulaResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

fn build_connection_url(config: &TabulaConfig, base_dir: &Path) -> TabulaResult<String> {
    match config.connection_url() {
        Some(url) => Ok(url.to_string()),
        None => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
    }
}

fn require_name(field: &str, value: &str) -> TabulaResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TabulaError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
