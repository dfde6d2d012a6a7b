//! Durable tabular storage for the ledger.
//!
//! A store holds exactly one table with the columns
//! `referred_person, referral_source, month, batch_id` and is only ever
//! rewritten as a whole.

pub mod csv_store;
pub mod migrations;
pub mod pool;
pub mod queries;
pub mod sqlite_store;

pub use csv_store::{write_ledger, CsvFileStore};
pub use pool::{create_in_memory_pool, create_pool, DbPool};
pub use sqlite_store::SqliteStore;

use crate::config::{Config, StorageBackend};
use crate::error::AppResult;
use crate::models::ReferralRecord;

/// Canonical column order of the persisted table.
pub const LEDGER_COLUMNS: [&str; 4] = ["referred_person", "referral_source", "month", "batch_id"];

/// A row as found in storage, before month validation.
///
/// Rows whose month cannot be resolved are written back in this form
/// unchanged, so saving never loses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub referred_person: String,
    pub referral_source: String,
    pub month: String,
    pub batch_id: Option<String>,
}

impl From<&ReferralRecord> for StoredRow {
    fn from(record: &ReferralRecord) -> Self {
        Self {
            referred_person: record.referred_person.clone(),
            referral_source: record.referral_source.clone(),
            month: record.month.to_string(),
            batch_id: record.batch_id.as_ref().map(|b| b.as_str().to_string()),
        }
    }
}

pub trait LedgerStore: Send + Sync {
    /// Read the whole table. `Ok(None)` when the store does not exist yet.
    fn load(&self) -> AppResult<Option<Vec<StoredRow>>>;

    /// Replace the whole table with `rows`. Readers observe either the
    /// previous table or the new one, never a mix.
    fn save(&self, rows: &[StoredRow]) -> AppResult<()>;

    /// Keep a copy of a store that failed to load before it is overwritten.
    /// Returns where the copy went, if the backend supports it.
    fn preserve_unreadable(&self) -> AppResult<Option<String>> {
        Ok(None)
    }

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Open the store selected by `config`, running schema migrations for SQLite.
pub fn open_store(config: &Config) -> AppResult<Box<dyn LedgerStore>> {
    match config.storage {
        StorageBackend::Csv => Ok(Box::new(CsvFileStore::new(&config.ledger_path))),
        StorageBackend::Sqlite => {
            let pool = create_pool(&config.ledger_path)?;
            {
                let mut conn = pool.get()?;
                migrations::run_migrations(&mut conn, &config.migrations_path)?;
            }
            Ok(Box::new(SqliteStore::new(
                pool,
                config.ledger_path.display().to_string(),
            )))
        }
    }
}
