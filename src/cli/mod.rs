pub mod apply;
pub mod diff;
pub mod sessions;
pub mod start;
pub mod status;
pub mod stop;
pub mod undo;

use crate::benchmark::SessionBenchmark;
use crate::config::BenchdConfig;
use crate::models::ConfigCatalog;
use crate::session::JsonSessionStore;
use crate::store::GitStore;
use crate::{Context, Result};
use std::sync::Arc;

/// Everything a subcommand needs, wired from the current directory
pub(crate) struct App {
    pub config: BenchdConfig,
    pub store: Arc<GitStore>,
    pub sessions: Arc<JsonSessionStore>,
    pub bench: SessionBenchmark,
}

pub(crate) fn bootstrap() -> Result<App> {
    let workspace = std::env::current_dir().context("Failed to resolve current directory")?;
    let config = BenchdConfig::load(&workspace)?;
    let data_root = config.data_root(&workspace);

    let store = Arc::new(
        GitStore::open(&workspace, &data_root, config.snapshots_enabled)
            .context("Failed to open snapshot store")?,
    );
    let sessions = Arc::new(JsonSessionStore::open(&data_root));
    let catalog = Arc::new(ConfigCatalog::new(config.default_model_ref()));
    let bench = SessionBenchmark::new(
        store.clone(),
        sessions.clone(),
        catalog,
        &data_root,
    );

    Ok(App {
        config,
        store,
        sessions,
        bench,
    })
}

/// First 8 characters of an id, for display
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
