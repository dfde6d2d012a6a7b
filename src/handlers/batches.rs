use axum::extract::{Path, State};
use axum::response::Json;

use crate::error::AppResult;
use crate::models::{BatchId, DeleteOutcome};
use crate::services::batches::{self, BatchSummary};
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<BatchSummary>>> {
    let snapshot = state.with_ledger(|ledger| ledger.load()).await?;
    Ok(Json(batches::list_batches(snapshot.records())))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<Json<DeleteOutcome>> {
    let batch_id = BatchId::new(batch_id);
    let outcome = state
        .with_ledger(move |ledger| batches::delete_batch(ledger, &batch_id))
        .await?;
    Ok(Json(outcome))
}
