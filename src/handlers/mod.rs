pub mod batches;
pub mod import;
pub mod ledger;
pub mod pivot;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Ledger
        .route("/api/ledger", get(ledger::list))
        .route("/api/ledger/export.csv", get(ledger::export_csv))
        .route("/api/ledger/append", post(ledger::append))
        .route("/api/ledger/delete", post(ledger::delete))
        .route("/api/ledger/clear", post(ledger::clear))
        // Upload decoding
        .route("/api/import/preview", post(import::preview))
        .route("/api/import/append", post(import::append))
        // Reports
        .route("/api/pivot", get(pivot::report))
        .route("/api/pivot/export.csv", get(pivot::export_csv))
        .route("/api/pivot/averages.csv", get(pivot::averages_csv))
        // Batches
        .route("/api/batches", get(batches::list))
        .route("/api/batches/:id", delete(batches::delete))
        // Health check
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "OK"
}
