use crate::db::queries::referrals;
use crate::db::{DbPool, LedgerStore, StoredRow};
use crate::error::AppResult;

/// The ledger as the `referrals` table of a SQLite database.
///
/// Saves replace every row inside one transaction.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    label: String,
}

impl SqliteStore {
    /// `pool` must already have migrations applied.
    pub fn new(pool: DbPool, label: impl Into<String>) -> Self {
        Self {
            pool,
            label: label.into(),
        }
    }
}

impl LedgerStore for SqliteStore {
    fn load(&self) -> AppResult<Option<Vec<StoredRow>>> {
        let conn = self.pool.get()?;
        referrals::list_referrals(&conn).map(Some)
    }

    fn save(&self, rows: &[StoredRow]) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        referrals::replace_referrals(&mut conn, rows)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_in_memory_pool, migrations};
    use std::path::Path;

    fn store() -> SqliteStore {
        let pool = create_in_memory_pool().unwrap();
        {
            let mut conn = pool.get().unwrap();
            migrations::run_migrations(&mut conn, Path::new("migrations")).unwrap();
        }
        SqliteStore::new(pool, ":memory:")
    }

    fn record(person: &str, month: &str, batch: Option<&str>) -> StoredRow {
        StoredRow {
            referred_person: person.into(),
            referral_source: "Clinic".into(),
            month: month.into(),
            batch_id: batch.map(String::from),
        }
    }

    #[test]
    fn test_fresh_database_loads_empty() {
        assert_eq!(store().load().unwrap(), Some(vec![]));
    }

    #[test]
    fn test_save_replaces_all_rows_in_order() {
        let store = store();
        store
            .save(&[record("Ann", "2025-01", Some("b1")), record("Bo", "2025-02", None)])
            .unwrap();
        store
            .save(&[record("Cy", "2025-03", None), record("Di", "2025-01", Some("b2"))])
            .unwrap();

        let rows = store.load().unwrap().unwrap();
        let people: Vec<&str> = rows.iter().map(|r| r.referred_person.as_str()).collect();
        assert_eq!(people, vec!["Cy", "Di"]);
        assert_eq!(rows[0].batch_id, None);
        assert_eq!(rows[1].batch_id.as_deref(), Some("b2"));
        assert_eq!(rows[1].month, "2025-01");
    }

    #[test]
    fn test_unresolved_month_round_trips() {
        let store = store();
        store
            .save(&[record("Ann", "", None), record("Bo", "nan", Some("b1"))])
            .unwrap();

        let rows = store.load().unwrap().unwrap();
        assert_eq!(rows[0].month, "");
        assert_eq!(rows[1].month, "nan");
        assert_eq!(rows[1].batch_id.as_deref(), Some("b1"));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let pool = create_in_memory_pool().unwrap();
        let mut conn = pool.get().unwrap();
        let first = migrations::run_migrations(&mut conn, Path::new("migrations")).unwrap();
        let second = migrations::run_migrations(&mut conn, Path::new("migrations")).unwrap();
        assert!(first >= 1);
        assert_eq!(second, 0);
    }
}
