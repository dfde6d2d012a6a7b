use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::db::{LedgerStore, StoredRow, LEDGER_COLUMNS};
use crate::error::{AppError, AppResult};

/// The ledger as one CSV file.
///
/// Saves write a sibling temporary file, fsync it, then rename it over the
/// ledger, so a concurrent reader sees either the old file or the new one.
#[derive(Debug, Clone)]
pub struct CsvFileStore {
    path: PathBuf,
}

impl CsvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl LedgerStore for CsvFileStore {
    fn load(&self) -> AppResult<Option<Vec<StoredRow>>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Ledger file does not exist yet");
            return Ok(None);
        }

        let content = fs::read(&self.path)?;
        parse_ledger_csv(&content).map(Some)
    }

    fn save(&self, rows: &[StoredRow]) -> AppResult<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        write_ledger(tmp.as_file_mut(), rows)?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path).map_err(|e| AppError::Io(e.error))?;
        debug!(path = %self.path.display(), rows = rows.len(), "Ledger file replaced");
        Ok(())
    }

    fn preserve_unreadable(&self) -> AppResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".into());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let copy = self.parent_dir().join(format!("{file_name}.unreadable-{stamp}"));
        fs::copy(&self.path, &copy)?;
        Ok(Some(copy.display().to_string()))
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Write `rows` as CSV with the canonical header. Legacy rows without a
/// batch id get an empty cell.
pub fn write_ledger<W: Write>(out: W, rows: &[StoredRow]) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(LEDGER_COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.referred_person.as_str(),
            row.referral_source.as_str(),
            row.month.as_str(),
            row.batch_id.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a persisted ledger. Columns are located by name, case-insensitively;
/// missing `referred_person` / `batch_id` columns are backfilled, while missing
/// `referral_source` / `month` columns make the file unreadable.
pub fn parse_ledger_csv(content: &[u8]) -> AppResult<Vec<StoredRow>> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);

    let headers = reader.headers()?.clone();
    trace!(?headers, "Ledger headers");

    let person_col = find_column(&headers, "referred_person");
    let source_col = find_column(&headers, "referral_source")
        .ok_or_else(|| AppError::StorageRead("missing referral_source column".into()))?;
    let month_col = find_column(&headers, "month")
        .ok_or_else(|| AppError::StorageRead("missing month column".into()))?;
    let batch_col = find_column(&headers, "batch_id");

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(StoredRow {
            referred_person: field(&record, person_col).unwrap_or_default(),
            referral_source: field(&record, Some(source_col)).unwrap_or_default(),
            month: field(&record, Some(month_col)).unwrap_or_default(),
            batch_id: field(&record, batch_col).filter(|b| !b.is_empty()),
        });
    }

    Ok(rows)
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

fn field(record: &csv::StringRecord, col: Option<usize>) -> Option<String> {
    col.and_then(|c| record.get(c)).map(|s| s.trim().to_string())
}
