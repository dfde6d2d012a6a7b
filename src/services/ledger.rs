//! The master referral ledger.
//!
//! Record manipulation is done by pure functions over [`LedgerSnapshot`];
//! [`Ledger`] wraps them in a serialized load-modify-save against a
//! [`LedgerStore`].

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::db::{LedgerStore, StoredRow};
use crate::error::{AppError, AppResult};
use crate::models::{
    AppendOutcome, BatchId, CanonicalMonth, CellValue, ColumnMapping, DeleteOutcome,
    DeleteSelector, InputTable, LedgerEntry, MonthAssignment, ReferralRecord, RowFilter, RowId,
};
use crate::services::month_normalizer;

/// What to do when the store exists but cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Log the failure and continue with an empty ledger.
    #[default]
    Lenient,
    /// Fail the operation with [`AppError::StorageRead`].
    Strict,
}

/// The ledger at one point in time, with derived row identities.
///
/// Stored rows whose month cannot be resolved are not records: listings,
/// pivots and batches never see them. They are kept verbatim, in place, and
/// written back on every save until the ledger is cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    entries: Vec<LedgerEntry>,
    /// Each unresolved row with the number of entries stored before it.
    unresolved: Vec<(usize, StoredRow)>,
}

impl LedgerSnapshot {
    pub fn new(records: Vec<ReferralRecord>) -> Self {
        Self {
            entries: identify(records),
            unresolved: Vec::new(),
        }
    }

    /// Resolve stored rows, normalizing legacy months. Rows that still fail
    /// are carried along untouched.
    pub fn from_stored(rows: Vec<StoredRow>) -> Self {
        let mut records = Vec::with_capacity(rows.len());
        let mut unresolved = Vec::new();
        for row in rows {
            match resolve_stored(&row) {
                Some(record) => records.push(record),
                None => unresolved.push((records.len(), row)),
            }
        }
        Self {
            entries: identify(records),
            unresolved,
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &ReferralRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn to_records(&self) -> Vec<ReferralRecord> {
        self.records().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored rows whose month could not be resolved.
    pub fn unresolved(&self) -> impl Iterator<Item = &StoredRow> {
        self.unresolved.iter().map(|(_, row)| row)
    }

    /// Every row in store order, as it will be saved.
    pub fn to_stored(&self) -> Vec<StoredRow> {
        let mut rows = Vec::with_capacity(self.entries.len() + self.unresolved.len());
        let mut pending = self.unresolved.iter().peekable();
        for (index, entry) in self.entries.iter().enumerate() {
            while let Some((_, row)) = pending.next_if(|(before, _)| *before <= index) {
                rows.push(row.clone());
            }
            rows.push(StoredRow::from(&entry.record));
        }
        rows.extend(pending.map(|(_, row)| row.clone()));
        rows
    }

    /// The most recent batch id present, by id order.
    pub fn latest_batch(&self) -> Option<&BatchId> {
        self.records().filter_map(|r| r.batch_id.as_ref()).max()
    }

    /// Rows matching `filter`, in ledger order.
    pub fn filtered<'a>(&'a self, filter: &'a RowFilter) -> impl Iterator<Item = &'a LedgerEntry> {
        self.entries.iter().filter(move |e| filter.matches(e))
    }

    /// The previous rows followed by `batch`. Existing row ids are unchanged.
    pub fn with_batch(&self, batch: &[ReferralRecord]) -> Self {
        let mut records = self.to_records();
        records.extend_from_slice(batch);
        Self {
            entries: identify(records),
            unresolved: self.unresolved.clone(),
        }
    }

    /// The rows not matched by `selector`, and how many were removed.
    /// Unresolved rows are never matched.
    pub fn without(&self, selector: &DeleteSelector) -> (Self, usize) {
        let mut kept = Vec::with_capacity(self.entries.len());
        let mut kept_before = Vec::with_capacity(self.entries.len() + 1);
        for entry in &self.entries {
            kept_before.push(kept.len());
            if !selector.matches(entry) {
                kept.push(entry.record.clone());
            }
        }
        kept_before.push(kept.len());

        let removed = self.entries.len() - kept.len();
        let unresolved = self
            .unresolved
            .iter()
            .map(|(before, row)| (kept_before[*before], row.clone()))
            .collect();
        (
            Self {
                entries: identify(kept),
                unresolved,
            },
            removed,
        )
    }
}

fn identify(records: Vec<ReferralRecord>) -> Vec<LedgerEntry> {
    let mut seen: HashMap<ReferralRecord, usize> = HashMap::new();
    records
        .into_iter()
        .map(|record| {
            let ordinal = seen.entry(record.clone()).or_insert(0);
            let row_id = RowId::derive(&record, *ordinal);
            *ordinal += 1;
            LedgerEntry { row_id, record }
        })
        .collect()
}

/// Rows of one upload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBatch {
    pub records: Vec<ReferralRecord>,
    pub rejected: usize,
}

/// Map, trim and validate upload rows, tagging accepted rows with `batch_id`.
///
/// Rows with an empty source or an unresolvable month are counted as rejected.
/// Only a mapping that names a column absent from the table is an error.
pub fn prepare_batch(
    table: &InputTable,
    mapping: &ColumnMapping,
    batch_id: &BatchId,
) -> AppResult<PreparedBatch> {
    let person_col = require_column(table, &mapping.person_column)?;
    let source_col = require_column(table, &mapping.source_column)?;
    let month_col = match &mapping.month {
        MonthAssignment::Fixed(_) => None,
        MonthAssignment::Column(name) => Some(require_column(table, name)?),
    };

    let mut records = Vec::with_capacity(table.len());
    let mut rejected = 0;

    for (index, row) in table.rows.iter().enumerate() {
        let referred_person = InputTable::cell(row, person_col).to_text().trim().to_string();
        let referral_source = InputTable::cell(row, source_col).to_text().trim().to_string();
        let month = match (&mapping.month, month_col) {
            (MonthAssignment::Fixed(month), _) => Some(*month),
            (MonthAssignment::Column(_), Some(col)) => {
                month_normalizer::normalize(InputTable::cell(row, col))
            }
            (MonthAssignment::Column(_), None) => None,
        };

        match month {
            Some(month) if !referral_source.is_empty() => records.push(ReferralRecord {
                referred_person,
                referral_source,
                month,
                batch_id: Some(batch_id.clone()),
            }),
            _ => {
                trace!(row = index + 1, source = %referral_source, "Rejected upload row");
                rejected += 1;
            }
        }
    }

    if rejected > 0 {
        warn!(
            batch_id = %batch_id,
            rejected,
            accepted = records.len(),
            "Upload rows missing a source or a resolvable month were dropped"
        );
    }

    Ok(PreparedBatch { records, rejected })
}

fn require_column(table: &InputTable, name: &str) -> AppResult<usize> {
    table
        .column_index(name)
        .ok_or_else(|| AppError::Validation(format!("Column '{}' not found in upload", name)))
}

/// A stored row as a record. Non-canonical months go through the normalizer.
pub fn resolve_stored(row: &StoredRow) -> Option<ReferralRecord> {
    let month = row
        .month
        .parse::<CanonicalMonth>()
        .ok()
        .or_else(|| month_normalizer::normalize(&CellValue::Text(row.month.clone())))?;
    Some(ReferralRecord {
        referred_person: row.referred_person.trim().to_string(),
        referral_source: row.referral_source.trim().to_string(),
        month,
        batch_id: row
            .batch_id
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(BatchId::new),
    })
}

/// Result of reading the store under the ledger's load policy.
struct Loaded {
    snapshot: LedgerSnapshot,
    degraded: bool,
}

/// Serialized access to the durable ledger.
///
/// Every operation runs load-modify-save under one mutex, and every save
/// replaces the whole store, so no reader in this process observes a
/// half-applied mutation.
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    policy: LoadPolicy,
    lock: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Box<dyn LedgerStore>, policy: LoadPolicy) -> Self {
        Self {
            store,
            policy,
            lock: Mutex::new(()),
        }
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    pub fn load(&self) -> AppResult<LedgerSnapshot> {
        let _guard = self.guard();
        Ok(self.load_unlocked()?.snapshot)
    }

    /// Append the valid rows of `table` as one new batch.
    pub fn append(&self, table: &InputTable, mapping: &ColumnMapping) -> AppResult<AppendOutcome> {
        let _guard = self.guard();
        let loaded = self.load_unlocked()?;

        let batch_id = BatchId::generate_after(Utc::now(), loaded.snapshot.latest_batch());
        let prepared = prepare_batch(table, mapping, &batch_id)?;
        let next = loaded.snapshot.with_batch(&prepared.records);

        self.persist(&next, loaded.degraded)?;

        let outcome = AppendOutcome {
            accepted: prepared.records.len(),
            rejected: prepared.rejected,
            batch_id,
        };
        info!(
            batch_id = %outcome.batch_id,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            total_rows = next.len(),
            "Appended batch to ledger"
        );
        Ok(outcome)
    }

    /// Remove every row matched by `selector`.
    pub fn delete(&self, selector: &DeleteSelector) -> AppResult<DeleteOutcome> {
        if let DeleteSelector::Filter { filter } = selector {
            if filter.is_unconstrained() {
                return Err(AppError::Validation(
                    "A delete filter needs at least one criterion; use clear to empty the ledger"
                        .into(),
                ));
            }
        }

        let _guard = self.guard();
        let loaded = self.load_unlocked()?;
        let (next, deleted_count) = loaded.snapshot.without(selector);

        self.persist(&next, loaded.degraded)?;

        info!(
            deleted = deleted_count,
            remaining = next.len(),
            "Deleted rows from ledger"
        );
        Ok(DeleteOutcome {
            deleted_count,
            remaining_count: next.len(),
        })
    }

    /// Replace the store with an empty table.
    pub fn clear(&self) -> AppResult<DeleteOutcome> {
        let _guard = self.guard();
        let (deleted_count, degraded) = match self.store.load() {
            Ok(rows) => (rows.map(|r| r.len()).unwrap_or(0), false),
            Err(e) => {
                warn!(store = %self.store.describe(), error = %e, "Clearing an unreadable ledger store");
                (0, true)
            }
        };
        self.persist(&LedgerSnapshot::default(), degraded)?;
        info!(store = %self.store.describe(), deleted = deleted_count, "Ledger cleared");
        Ok(DeleteOutcome {
            deleted_count,
            remaining_count: 0,
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The mutex guards no data, so a panic elsewhere cannot leave it inconsistent.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_unlocked(&self) -> AppResult<Loaded> {
        match self.store.load() {
            Ok(Some(rows)) => {
                let snapshot = LedgerSnapshot::from_stored(rows);
                let unresolved = snapshot.unresolved().count();
                if unresolved > 0 {
                    warn!(
                        store = %self.store.describe(),
                        unresolved,
                        "Ledger rows with an unresolvable month are kept but left out of reports"
                    );
                }
                debug!(rows = snapshot.len(), unresolved, "Loaded ledger");
                Ok(Loaded {
                    snapshot,
                    degraded: false,
                })
            }
            Ok(None) => Ok(Loaded {
                snapshot: LedgerSnapshot::default(),
                degraded: false,
            }),
            Err(e) => match self.policy {
                LoadPolicy::Lenient => {
                    error!(
                        store = %self.store.describe(),
                        error = %e,
                        "Ledger store is unreadable; continuing with an empty ledger"
                    );
                    Ok(Loaded {
                        snapshot: LedgerSnapshot::default(),
                        degraded: true,
                    })
                }
                LoadPolicy::Strict => Err(AppError::StorageRead(format!(
                    "{}: {}",
                    self.store.describe(),
                    e
                ))),
            },
        }
    }

    fn persist(&self, snapshot: &LedgerSnapshot, overwriting_unreadable: bool) -> AppResult<()> {
        if overwriting_unreadable {
            match self.store.preserve_unreadable() {
                Ok(Some(copy)) => {
                    warn!(store = %self.store.describe(), copy = %copy, "Kept a copy of the unreadable ledger store")
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(AppError::StorageWrite(format!(
                        "could not preserve unreadable store {}: {}",
                        self.store.describe(),
                        e
                    )))
                }
            }
        }

        self.store.save(&snapshot.to_stored()).map_err(|e| {
            error!(store = %self.store.describe(), error = %e, "Failed to save ledger");
            AppError::StorageWrite(format!("{}: {}", self.store.describe(), e))
        })
    }
}
