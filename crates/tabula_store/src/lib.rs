pub mod config;
pub mod datastore;
mod db;
pub mod migration;
pub mod store;

pub use tabula_core::*;
pub use config::{
    DEFAULT_PAGE_SIZE, DatabaseConfig, LimitsConfig, MAX_PAGE_SIZE, PoolConfig, TabulaConfig,
};
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use store::{
    FAILPOINT_AFTER_ATTRIBUTE_INSERT, FAILPOINT_AFTER_ENTRY_DELETE, FAILPOINT_AFTER_OPTION_INSERT,
    FAILPOINT_AFTER_VALUE_DELETE, TabulaStore,
};
