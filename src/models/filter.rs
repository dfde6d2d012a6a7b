use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{BatchId, CanonicalMonth, LedgerEntry, RowId};

/// Column filters over ledger rows. All present criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    #[serde(default)]
    pub month: Option<CanonicalMonth>,
    /// Empty means any source.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Case-insensitive substring of the referred person.
    #[serde(default)]
    pub person_contains: Option<String>,
}

impl RowFilter {
    pub fn is_unconstrained(&self) -> bool {
        self.month.is_none()
            && self.sources.is_empty()
            && self
                .person_contains
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        let record = &entry.record;

        if let Some(month) = self.month {
            if record.month != month {
                return false;
            }
        }

        if !self.sources.is_empty() && !self.sources.iter().any(|s| *s == record.referral_source) {
            return false;
        }

        match self.person_contains.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => record
                .referred_person
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

/// What a delete call removes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum DeleteSelector {
    Batch { batch_id: BatchId },
    Rows { row_ids: HashSet<RowId> },
    Filter { filter: RowFilter },
}

impl DeleteSelector {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        match self {
            Self::Batch { batch_id } => entry.record.batch_id.as_ref() == Some(batch_id),
            Self::Rows { row_ids } => row_ids.contains(&entry.row_id),
            Self::Filter { filter } => filter.matches(entry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub deleted_count: usize,
    pub remaining_count: usize,
}
