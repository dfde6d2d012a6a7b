//! CSV downloads of the ledger and of pivot reports.

use crate::db::{write_ledger, StoredRow};
use crate::error::{AppError, AppResult};
use crate::services::pivot::PivotReport;

pub const TOTALS_LABEL: &str = "TOTALS";

/// The whole stored table, including rows whose month never resolved.
pub fn ledger_csv(rows: &[StoredRow]) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    write_ledger(&mut out, rows)?;
    Ok(out)
}

/// The matrix indexed by source, one column per window month, followed by
/// a `TOTALS` row.
pub fn pivot_csv(report: &PivotReport) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["referral_source".to_string()];
    header.extend(report.months.iter().map(|m| m.to_string()));
    writer.write_record(&header)?;

    for row in &report.rows {
        let mut record = vec![row.source.clone()];
        record.extend(row.counts.iter().map(u64::to_string));
        writer.write_record(&record)?;
    }

    if !report.months.is_empty() {
        let mut totals = vec![TOTALS_LABEL.to_string()];
        totals.extend(report.totals.iter().map(u64::to_string));
        writer.write_record(&totals)?;
    }

    into_bytes(writer)
}

pub fn averages_csv(report: &PivotReport) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["referral_source", "average"])?;
    for average in &report.averages {
        let value = average.average.to_string();
        writer.write_record([average.source.as_str(), value.as_str()])?;
    }
    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> AppResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finish CSV: {}", e)))
}
