//! Source × month pivot reports derived from the ledger.
//!
//! Reports are always recomputed from a ledger snapshot. Every month of the
//! requested window gets a column, and sources without activity in a month
//! carry an explicit zero there.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{AppError, AppResult};
use crate::models::{CanonicalMonth, ReferralRecord};
use crate::sort_utils::SortDirection;

/// Inclusive month range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthWindow {
    pub start: CanonicalMonth,
    pub end: CanonicalMonth,
}

impl MonthWindow {
    pub fn new(start: CanonicalMonth, end: CanonicalMonth) -> AppResult<Self> {
        if start > end {
            return Err(AppError::Validation(format!(
                "Window start {} is after window end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn months(&self) -> Vec<CanonicalMonth> {
        CanonicalMonth::range_inclusive(self.start, self.end)
    }
}

/// How the caller asked for the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    Range {
        from: CanonicalMonth,
        to: CanonicalMonth,
    },
    /// January through December of `year`.
    Year(i32),
    /// January through the latest month of `year` that has any record.
    YearToDate(i32),
    /// Earliest through latest month present in the ledger.
    All,
}

/// Resolve `spec` against the data. `Ok(None)` means the window is defined by
/// data that does not exist, which reports as empty.
pub fn resolve_window<'a, I>(spec: WindowSpec, records: I) -> AppResult<Option<MonthWindow>>
where
    I: IntoIterator<Item = &'a ReferralRecord>,
{
    match spec {
        WindowSpec::Range { from, to } => MonthWindow::new(from, to).map(Some),
        WindowSpec::Year(year) => {
            let (start, end) = calendar_year(year)?;
            MonthWindow::new(start, end).map(Some)
        }
        WindowSpec::YearToDate(year) => {
            let (start, _) = calendar_year(year)?;
            let latest = records
                .into_iter()
                .map(|r| r.month)
                .filter(|m| m.year() == year)
                .max();
            latest.map(|end| MonthWindow::new(start, end)).transpose()
        }
        WindowSpec::All => {
            let mut bounds: Option<(CanonicalMonth, CanonicalMonth)> = None;
            for month in records.into_iter().map(|r| r.month) {
                bounds = Some(match bounds {
                    None => (month, month),
                    Some((lo, hi)) => (lo.min(month), hi.max(month)),
                });
            }
            bounds
                .map(|(start, end)| MonthWindow::new(start, end))
                .transpose()
        }
    }
}

fn calendar_year(year: i32) -> AppResult<(CanonicalMonth, CanonicalMonth)> {
    CanonicalMonth::january(year)
        .zip(CanonicalMonth::december(year))
        .ok_or_else(|| AppError::Validation(format!("Year {} is out of range", year)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotSortKey {
    Alphabetical,
    Month(CanonicalMonth),
}

/// Row ordering for a pivot matrix. Ties always break by source ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotSort {
    pub key: PivotSortKey,
    pub direction: SortDirection,
}

impl PivotSort {
    pub fn alphabetical() -> Self {
        Self {
            key: PivotSortKey::Alphabetical,
            direction: SortDirection::Asc,
        }
    }

    pub fn by_month(month: CanonicalMonth, direction: SortDirection) -> Self {
        Self {
            key: PivotSortKey::Month(month),
            direction,
        }
    }

    /// Parse `sort` / `dir` query values. `sort` is `alphabetical` or a
    /// `YYYY-MM` column; the direction defaults to ascending for alphabetical
    /// order and descending for a month column.
    pub fn from_query(sort: Option<&str>, dir: Option<&str>) -> AppResult<Self> {
        let direction = dir
            .filter(|d| !d.trim().is_empty())
            .map(|d| {
                SortDirection::from_str(d).ok_or_else(|| {
                    AppError::Validation(format!("Unknown sort direction '{}'", d))
                })
            })
            .transpose()?;

        match sort.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(Self {
                key: PivotSortKey::Alphabetical,
                direction: direction.unwrap_or(SortDirection::Asc),
            }),
            Some(s) if s.eq_ignore_ascii_case("alphabetical") => Ok(Self {
                key: PivotSortKey::Alphabetical,
                direction: direction.unwrap_or(SortDirection::Asc),
            }),
            Some(s) => {
                let month = s
                    .parse::<CanonicalMonth>()
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                Ok(Self::by_month(
                    month,
                    direction.unwrap_or(SortDirection::Desc),
                ))
            }
        }
    }
}

impl Default for PivotSort {
    fn default() -> Self {
        Self::alphabetical()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub source: String,
    /// One count per window month, aligned with [`PivotReport::months`].
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceAverage {
    pub source: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotReport {
    pub window: Option<MonthWindow>,
    pub months: Vec<CanonicalMonth>,
    pub rows: Vec<PivotRow>,
    /// Column-wise sums aligned with `months`.
    pub totals: Vec<u64>,
    /// Per-source mean over every window month, highest first.
    pub averages: Vec<SourceAverage>,
}

impl PivotReport {
    pub fn empty() -> Self {
        Self {
            window: None,
            months: Vec::new(),
            rows: Vec::new(),
            totals: Vec::new(),
            averages: Vec::new(),
        }
    }

    pub fn grand_total(&self) -> u64 {
        self.totals.iter().sum()
    }
}

/// Build the dense pivot for `window`. `None` yields an empty report.
pub fn compute<'a, I>(records: I, window: Option<MonthWindow>, sort: PivotSort) -> PivotReport
where
    I: IntoIterator<Item = &'a ReferralRecord>,
{
    let Some(window) = window else {
        return PivotReport::empty();
    };

    let months = window.months();
    let column_of: HashMap<CanonicalMonth, usize> =
        months.iter().enumerate().map(|(i, m)| (*m, i)).collect();

    // BTreeMap keeps sources alphabetical before any explicit ordering.
    let mut matrix: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for record in records {
        let Some(&col) = column_of.get(&record.month) else {
            continue;
        };
        let counts = matrix
            .entry(record.referral_source.clone())
            .or_insert_with(|| vec![0; months.len()]);
        counts[col] += 1;
    }

    let mut rows: Vec<PivotRow> = matrix
        .into_iter()
        .map(|(source, counts)| PivotRow { source, counts })
        .collect();
    sort_rows(&mut rows, &months, sort);

    let mut totals = vec![0u64; months.len()];
    for row in &rows {
        for (total, count) in totals.iter_mut().zip(&row.counts) {
            *total += count;
        }
    }

    let averages = averages(&rows, months.len());

    PivotReport {
        window: Some(window),
        months,
        rows,
        totals,
        averages,
    }
}

fn sort_rows(rows: &mut [PivotRow], months: &[CanonicalMonth], sort: PivotSort) {
    match sort.key {
        PivotSortKey::Alphabetical => {
            rows.sort_by(|a, b| sort.direction.apply(a.source.cmp(&b.source)));
        }
        PivotSortKey::Month(month) => {
            // A month outside the window counts as zero everywhere.
            let col = months.iter().position(|m| *m == month);
            let value = |row: &PivotRow| col.map(|c| row.counts[c]).unwrap_or(0);
            rows.sort_by(|a, b| {
                sort.direction
                    .apply(value(a).cmp(&value(b)))
                    .then_with(|| a.source.cmp(&b.source))
            });
        }
    }
}

fn averages(rows: &[PivotRow], month_count: usize) -> Vec<SourceAverage> {
    if month_count == 0 {
        return Vec::new();
    }
    let mut averages: Vec<SourceAverage> = rows
        .iter()
        .map(|row| SourceAverage {
            source: row.source.clone(),
            average: row.counts.iter().sum::<u64>() as f64 / month_count as f64,
        })
        .collect();
    averages.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.source.cmp(&b.source))
    });
    averages
}

/// Distinct years present in `records`, ascending.
pub fn available_years<'a, I>(records: I) -> Vec<i32>
where
    I: IntoIterator<Item = &'a ReferralRecord>,
{
    records
        .into_iter()
        .map(|r| r.month.year())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
