use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tabula_core::{TabulaError, TabulaResult, UnknownAttributes};

const DEFAULT_CONFIG_NAME: &str = "tabula.json";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub default_page_size: Option<u32>,
    pub max_page_size: Option<u32>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            default_page_size: Some(DEFAULT_PAGE_SIZE),
            max_page_size: Some(MAX_PAGE_SIZE),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabulaConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    /// Policy for filters and sorts naming attributes the object does not have.
    pub unknown_filter_attributes: Option<UnknownAttributes>,
    pub failpoints: Option<Vec<String>>,
}

impl TabulaConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            unknown_filter_attributes: Some(UnknownAttributes::Ignore),
            failpoints: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> TabulaResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| TabulaError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| TabulaError::storage(format!("read config: {err}")))?;
            return serde_json::from_str(&raw)
                .map_err(|err| TabulaError::validation(format!("parse config: {err}")));
        }
        let default = TabulaConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| TabulaError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| TabulaError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> TabulaResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| "tabula.sqlite".to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(TabulaError::validation("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    /// `(default, max)` page sizes; the default never exceeds the max.
    pub fn page_sizes(&self) -> (u32, u32) {
        let limits = self.limits.clone().unwrap_or_else(LimitsConfig::with_defaults);
        let max = limits.max_page_size.unwrap_or(MAX_PAGE_SIZE).max(1);
        let default = limits.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE).min(max);
        (default, max)
    }
}
