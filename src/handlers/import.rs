use axum::extract::{Multipart, State};
use axum::response::Json;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::form_utils::empty_as_none;
use crate::handlers::ledger::AppendResponse;
use crate::models::{CanonicalMonth, InputTable, MappingForm, Sheet};
use crate::services::{month_normalizer, table_parser};
use crate::state::AppState;

const PREVIEW_ROWS: usize = 20;
const MONTH_PREVIEW_ROWS: usize = 10;

/// A file upload plus the text fields that came with it.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: String,
    content: Vec<u8>,
    sheet: Option<String>,
    person_column: Option<String>,
    source_column: Option<String>,
    month_mode: Option<String>,
    month: Option<String>,
    month_column: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = UploadForm::default();
        let mut has_file = false;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                form.file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "upload.csv".into());
                form.content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Upload(e.to_string()))?
                    .to_vec();
                has_file = true;
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::Upload(e.to_string()))?;
            let value = empty_as_none(Some(value));
            match name.as_str() {
                "sheet" => form.sheet = value,
                "person_column" => form.person_column = value,
                "source_column" => form.source_column = value,
                "month_mode" => form.month_mode = value,
                "month" => form.month = value,
                "month_column" => form.month_column = value,
                other => debug!(field = %other, "Ignoring unknown upload field"),
            }
        }

        if !has_file || form.content.is_empty() {
            warn!("Upload without file content");
            return Err(AppError::Upload("No file uploaded".into()));
        }
        debug!(file_name = %form.file_name, size_bytes = form.content.len(), "Received upload");
        Ok(form)
    }

    fn sheets(&self) -> AppResult<Vec<Sheet>> {
        table_parser::parse_upload(&self.file_name, &self.content)
    }
}

/// The requested sheet, or the first one.
fn select_sheet(sheets: Vec<Sheet>, name: Option<&str>) -> AppResult<Sheet> {
    match name {
        Some(name) => sheets
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AppError::Validation(format!("Sheet '{}' not found in upload", name))),
        None => sheets
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upload("Upload contains no sheets".into())),
    }
}

#[derive(Debug, Serialize)]
pub struct MonthPreview {
    pub raw: String,
    pub month: Option<CanonicalMonth>,
}

#[derive(Debug, Serialize)]
pub struct ImportPreview {
    pub file_name: String,
    pub sheets: Vec<String>,
    pub sheet: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<Vec<String>>,
    /// Conversion of the first values of `month_column`, when one was given.
    pub month_preview: Option<Vec<MonthPreview>>,
}

fn month_preview(table: &InputTable, column: &str) -> AppResult<Vec<MonthPreview>> {
    let index = table
        .column_index(column)
        .ok_or_else(|| AppError::Validation(format!("Column '{}' not found in upload", column)))?;
    Ok(table
        .rows
        .iter()
        .take(MONTH_PREVIEW_ROWS)
        .map(|row| {
            let cell = InputTable::cell(row, index);
            MonthPreview {
                raw: cell.to_text(),
                month: month_normalizer::normalize(cell),
            }
        })
        .collect())
}

pub async fn preview(multipart: Multipart) -> AppResult<Json<ImportPreview>> {
    let form = UploadForm::read(multipart).await?;
    let sheets = form.sheets()?;
    let sheet_names: Vec<String> = sheets.iter().map(|s| s.name.clone()).collect();
    let sheet = select_sheet(sheets, form.sheet.as_deref())?;

    let month_preview = form
        .month_column
        .as_deref()
        .map(|column| month_preview(&sheet.table, column))
        .transpose()?;

    Ok(Json(ImportPreview {
        file_name: form.file_name,
        sheets: sheet_names,
        row_count: sheet.table.len(),
        rows: sheet
            .table
            .rows
            .iter()
            .take(PREVIEW_ROWS)
            .map(|row| row.iter().map(|c| c.to_text()).collect())
            .collect(),
        columns: sheet.table.columns,
        sheet: sheet.name,
        month_preview,
    }))
}

pub async fn append(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<AppendResponse>> {
    let form = UploadForm::read(multipart).await?;
    let sheet = select_sheet(form.sheets()?, form.sheet.as_deref())?;

    let mapping = MappingForm {
        person_column: form
            .person_column
            .ok_or_else(|| AppError::Validation("person_column is required".into()))?,
        source_column: form
            .source_column
            .ok_or_else(|| AppError::Validation("source_column is required".into()))?,
        month_mode: form.month_mode,
        month: form.month,
        month_column: form.month_column,
    }
    .into_mapping()?;

    info!(
        file_name = %form.file_name,
        sheet = %sheet.name,
        rows = sheet.table.len(),
        "Appending uploaded sheet"
    );
    let outcome = state
        .with_ledger(move |ledger| ledger.append(&sheet.table, &mapping))
        .await?;
    Ok(Json(outcome.into()))
}
