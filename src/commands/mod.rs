pub mod content;
pub mod run;
pub mod status;
pub mod topic;

// Re-export command functions for convenience
pub use content::{content_add, content_import};
pub use run::{poll, run};
pub use status::{status, StatusQuery};
pub use topic::{subscribe, topic_add, topic_list};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use newsletter::authoring::NewsletterService;
use newsletter::config::Config;
use newsletter::storage::SqliteStore;

/// Load configuration from `path` or the environment, then validate it
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the SQLite store named by the configuration
pub fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = &config.database.sqlite_path;
    SqliteStore::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Authoring service over a single SQLite store
pub fn service(store: &SqliteStore) -> NewsletterService {
    NewsletterService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    )
}
