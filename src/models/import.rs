use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{BatchId, CanonicalMonth};
use crate::services::month_normalizer;

/// How the month of each appended row is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthAssignment {
    /// Every row of the upload belongs to this month.
    Fixed(CanonicalMonth),
    /// Each row's month is read from this column and normalized.
    Column(String),
}

/// Which upload columns feed which ledger fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub person_column: String,
    pub source_column: String,
    pub month: MonthAssignment,
}

/// Column mapping as submitted by a client, before validation.
///
/// `month_mode` is `fixed` (use `month` for every row) or `column` (read each
/// row's month from `month_column`). Without a mode, a given `month_column`
/// selects per-row months. A fixed `month` may be any date inside the month.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingForm {
    pub person_column: String,
    pub source_column: String,
    #[serde(default)]
    pub month_mode: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub month_column: Option<String>,
}

impl MappingForm {
    pub fn into_mapping(self) -> AppResult<ColumnMapping> {
        let month_column = self.month_column.filter(|c| !c.trim().is_empty());
        let mode = self
            .month_mode
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty());

        let month = match (mode.as_deref(), month_column) {
            (Some("column"), Some(column)) | (None, Some(column)) => MonthAssignment::Column(column),
            (Some("column"), None) => {
                return Err(AppError::Validation(
                    "month_column is required when month_mode is 'column'".into(),
                ))
            }
            (Some("fixed"), _) | (None, None) => {
                let raw = self.month.unwrap_or_default();
                let month = month_normalizer::normalize_text(&raw).ok_or_else(|| {
                    AppError::Validation(format!("Cannot read '{}' as a month", raw.trim()))
                })?;
                MonthAssignment::Fixed(month)
            }
            (Some(other), _) => {
                return Err(AppError::Validation(format!(
                    "Unknown month_mode '{}', expected 'fixed' or 'column'",
                    other
                )))
            }
        };

        Ok(ColumnMapping {
            person_column: self.person_column,
            source_column: self.source_column,
            month,
        })
    }
}

/// Caller feedback for one append call. Rejected rows are normal, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub batch_id: BatchId,
}

impl AppendOutcome {
    pub fn message(&self) -> String {
        format!(
            "Appended {} rows (dropped {} incomplete rows).",
            self.accepted, self.rejected
        )
    }
}
