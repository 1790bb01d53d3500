use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::storage::Storage;

/// Shared handles passed to the syncer and the HTTP routes.
#[derive(Clone)]
pub struct State {
    pub storage: Arc<Storage>,
    pub cfg: Arc<Config>,
}

impl State {
    pub async fn new(cfg: Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(&cfg.db_path).await?);
        let cfg = Arc::new(cfg);

        Ok(State { storage, cfg })
    }
}
