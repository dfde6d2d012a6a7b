use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Run `op` against the ledger on the blocking pool. Ledger operations
    /// take a lock and fsync on save.
    pub async fn with_ledger<T, F>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(&Ledger) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || op(&ledger))
            .await
            .map_err(|e| AppError::Internal(format!("Ledger task failed: {}", e)))?
    }
}
