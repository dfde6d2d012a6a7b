use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::CanonicalMonth;

/// Namespace for deriving row identities. Changing it changes every row id.
const ROW_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a7e_93d4_4b0a_8e55_0c3f_d2b1_7a94);

const BATCH_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One row of the master ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub referred_person: String,
    pub referral_source: String,
    pub month: CanonicalMonth,
    /// `None` only for rows stored before uploads were tagged.
    pub batch_id: Option<BatchId>,
}

/// Identifier shared by every row of one append call.
///
/// Generated ids look like `20250816T101530123456-1a2b3c4d`: a UTC timestamp
/// with microseconds followed by a random suffix, so lexical order is
/// chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{:06}-{}",
            now.format(BATCH_STAMP_FORMAT),
            now.timestamp_subsec_micros() % 1_000_000,
            &suffix[..8]
        ))
    }

    /// Generate an id that sorts after `latest`, even if the clock stepped back.
    pub fn generate_after(now: DateTime<Utc>, latest: Option<&BatchId>) -> Self {
        let candidate = Self::generate(now);
        match latest {
            Some(latest) if candidate <= *latest => {
                let bumped = latest
                    .timestamp()
                    .map(|ts| (ts + Duration::microseconds(1)).and_utc())
                    .unwrap_or(now);
                Self::generate(bumped)
            }
            _ => candidate,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upload time encoded in a generated id; `None` for ids from elsewhere.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let stamp = self.0.split('-').next()?;
        if stamp.len() != 21 || !stamp.is_ascii() {
            return None;
        }
        let seconds = NaiveDateTime::parse_from_str(&stamp[..15], BATCH_STAMP_FORMAT).ok()?;
        let micros: i64 = stamp[15..].parse().ok()?;
        Some(seconds + Duration::microseconds(micros))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable synthetic identity of a ledger row.
///
/// Derived from the row's content plus its ordinal among identical rows, so it
/// survives reloads, reordering and filtering of views without being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(Uuid);

impl RowId {
    pub fn derive(record: &ReferralRecord, ordinal: usize) -> Self {
        let name = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
            record.referred_person,
            record.referral_source,
            record.month,
            record.batch_id.as_ref().map(BatchId::as_str).unwrap_or(""),
            ordinal
        );
        Self(Uuid::new_v5(&ROW_ID_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A ledger row together with its derived identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub row_id: RowId,
    #[serde(flatten)]
    pub record: ReferralRecord,
}
