use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AppError, AppResult};
use crate::models::{BatchId, CanonicalMonth, DeleteOutcome, DeleteSelector, ReferralRecord};
use crate::services::ledger::Ledger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub row_count: usize,
    /// Months covered by the batch, ascending.
    pub distinct_months: Vec<CanonicalMonth>,
}

/// One summary per batch, most recent upload first. Legacy rows without a
/// batch id are left out.
pub fn list_batches<'a, I>(records: I) -> Vec<BatchSummary>
where
    I: IntoIterator<Item = &'a ReferralRecord>,
{
    let mut batches: BTreeMap<&BatchId, (usize, BTreeSet<CanonicalMonth>)> = BTreeMap::new();
    for record in records {
        if let Some(batch_id) = &record.batch_id {
            let entry = batches.entry(batch_id).or_default();
            entry.0 += 1;
            entry.1.insert(record.month);
        }
    }

    batches
        .into_iter()
        .rev()
        .map(|(batch_id, (row_count, months))| BatchSummary {
            batch_id: batch_id.clone(),
            row_count,
            distinct_months: months.into_iter().collect(),
        })
        .collect()
}

/// Remove every row of `batch_id`. A batch with no rows is `NotFound`.
pub fn delete_batch(ledger: &Ledger, batch_id: &BatchId) -> AppResult<DeleteOutcome> {
    let outcome = ledger.delete(&DeleteSelector::Batch {
        batch_id: batch_id.clone(),
    })?;
    if outcome.deleted_count == 0 {
        return Err(AppError::NotFound(format!("Batch {} not found", batch_id)));
    }
    Ok(outcome)
}
