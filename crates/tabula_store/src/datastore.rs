use std::path::{Path, PathBuf};

use crate::{TabulaConfig, TabulaResult, TabulaStore};

const DEFAULT_DB_NAME: &str = "tabula.sqlite";

pub fn load_or_init_config(base: &Path) -> TabulaResult<TabulaConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    TabulaConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> TabulaResult<TabulaStore> {
    let config = load_or_init_config(base)?;
    TabulaStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

#[cfg(test)]
mod tests {
    use super::{default_sqlite_path, load_or_init_config, open_store};
    use tempfile::tempdir;

    #[tokio::test]
    async fn opens_store_with_default_config() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.backend_name(), "sqlite");
        assert_eq!(config.page_sizes(), (50, 200));
        assert!(base.join("tabula.json").exists());
        let _store = open_store(base).await.expect("open store");
        assert!(default_sqlite_path(base).exists());
    }
}
