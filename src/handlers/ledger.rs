use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::AppResult;
use crate::form_utils::{deserialize_optional, empty_as_none};
use crate::models::{
    AppendOutcome, CanonicalMonth, CellValue, DeleteOutcome, DeleteSelector, InputTable,
    LedgerEntry, MappingForm, RowFilter,
};
use crate::services::export;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    #[serde(default, deserialize_with = "deserialize_optional")]
    pub month: Option<CanonicalMonth>,
    pub source: Option<String>,
    /// Case-insensitive search in the referred person.
    pub q: Option<String>,
}

impl LedgerQuery {
    pub fn to_filter(&self) -> RowFilter {
        RowFilter {
            month: self.month,
            sources: empty_as_none(self.source.clone()).into_iter().collect(),
            person_contains: empty_as_none(self.q.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerListing {
    pub total_rows: usize,
    pub matched_rows: usize,
    /// Stored rows kept aside because their month cannot be read.
    pub unresolved_rows: usize,
    pub rows: Vec<LedgerEntry>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<LedgerQuery>,
) -> AppResult<Json<LedgerListing>> {
    let snapshot = state.with_ledger(|ledger| ledger.load()).await?;
    let filter = params.to_filter();
    let rows: Vec<LedgerEntry> = snapshot.filtered(&filter).cloned().collect();

    debug!(total = snapshot.len(), matched = rows.len(), "Ledger listing");

    Ok(Json(LedgerListing {
        total_rows: snapshot.len(),
        matched_rows: rows.len(),
        unresolved_rows: snapshot.unresolved().count(),
        rows,
    }))
}

pub async fn export_csv(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let snapshot = state.with_ledger(|ledger| ledger.load()).await?;
    let body = export::ledger_csv(&snapshot.to_stored())?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"referrals_master.csv\"",
            ),
        ],
        body,
    ))
}

/// An in-memory table plus its column mapping.
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<JsonValue>>,
    pub mapping: MappingForm,
}

impl AppendRequest {
    pub fn table(&self) -> InputTable {
        InputTable::new(
            self.columns.clone(),
            self.rows
                .iter()
                .map(|row| row.iter().map(CellValue::from).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    #[serde(flatten)]
    pub outcome: AppendOutcome,
    pub message: String,
}

impl From<AppendOutcome> for AppendResponse {
    fn from(outcome: AppendOutcome) -> Self {
        Self {
            message: outcome.message(),
            outcome,
        }
    }
}

pub async fn append(
    State(state): State<AppState>,
    Json(request): Json<AppendRequest>,
) -> AppResult<Json<AppendResponse>> {
    let table = request.table();
    let mapping = request.mapping.into_mapping()?;
    let outcome = state
        .with_ledger(move |ledger| ledger.append(&table, &mapping))
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    Json(selector): Json<DeleteSelector>,
) -> AppResult<Json<DeleteOutcome>> {
    let outcome = state
        .with_ledger(move |ledger| ledger.delete(&selector))
        .await?;
    Ok(Json(outcome))
}

pub async fn clear(State(state): State<AppState>) -> AppResult<Json<DeleteOutcome>> {
    Ok(Json(state.with_ledger(|ledger| ledger.clear()).await?))
}
