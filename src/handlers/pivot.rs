use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::form_utils::{deserialize_flag, deserialize_optional};
use crate::models::CanonicalMonth;
use crate::services::pivot::{self, PivotReport, PivotSort, WindowSpec};
use crate::services::export;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PivotParams {
    #[serde(default, deserialize_with = "deserialize_optional")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub ytd: bool,
    #[serde(default, deserialize_with = "deserialize_optional")]
    pub from: Option<CanonicalMonth>,
    #[serde(default, deserialize_with = "deserialize_optional")]
    pub to: Option<CanonicalMonth>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

impl PivotParams {
    pub fn window_spec(&self) -> AppResult<WindowSpec> {
        match (self.from, self.to, self.year) {
            (Some(from), Some(to), _) => Ok(WindowSpec::Range { from, to }),
            (Some(_), None, _) | (None, Some(_), _) => Err(AppError::Validation(
                "Both 'from' and 'to' are required for a month range".into(),
            )),
            (None, None, Some(year)) if self.ytd => Ok(WindowSpec::YearToDate(year)),
            (None, None, Some(year)) => Ok(WindowSpec::Year(year)),
            (None, None, None) if self.ytd => Err(AppError::Validation(
                "'ytd' needs a 'year'".into(),
            )),
            (None, None, None) => Ok(WindowSpec::All),
        }
    }

    pub fn sort(&self) -> AppResult<PivotSort> {
        PivotSort::from_query(self.sort.as_deref(), self.dir.as_deref())
    }
}

#[derive(Debug, Serialize)]
pub struct PivotResponse {
    #[serde(flatten)]
    pub report: PivotReport,
    pub grand_total: u64,
    pub available_years: Vec<i32>,
}

async fn build_report(
    state: &AppState,
    params: &PivotParams,
) -> AppResult<(PivotReport, Vec<i32>)> {
    let spec = params.window_spec()?;
    let sort = params.sort()?;
    let snapshot = state.with_ledger(|ledger| ledger.load()).await?;

    let window = pivot::resolve_window(spec, snapshot.records())?;
    let report = pivot::compute(snapshot.records(), window, sort);
    Ok((report, pivot::available_years(snapshot.records())))
}

pub async fn report(
    State(state): State<AppState>,
    Query(params): Query<PivotParams>,
) -> AppResult<Json<PivotResponse>> {
    let (report, available_years) = build_report(&state, &params).await?;
    Ok(Json(PivotResponse {
        grand_total: report.grand_total(),
        report,
        available_years,
    }))
}

fn csv_download(body: Vec<u8>, file_name: &str) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
}

pub async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<PivotParams>,
) -> AppResult<impl IntoResponse> {
    let (report, _) = build_report(&state, &params).await?;
    Ok(csv_download(export::pivot_csv(&report)?, "referral_pivot.csv"))
}

pub async fn averages_csv(
    State(state): State<AppState>,
    Query(params): Query<PivotParams>,
) -> AppResult<impl IntoResponse> {
    let (report, _) = build_report(&state, &params).await?;
    Ok(csv_download(
        export::averages_csv(&report)?,
        "referral_averages.csv",
    ))
}
