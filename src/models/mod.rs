pub mod filter;
pub mod import;
pub mod month;
pub mod referral;
pub mod table;

pub use filter::{DeleteOutcome, DeleteSelector, RowFilter};
pub use import::{AppendOutcome, ColumnMapping, MappingForm, MonthAssignment};
pub use month::{CanonicalMonth, MonthParseError};
pub use referral::{BatchId, LedgerEntry, ReferralRecord, RowId};
pub use table::{CellValue, InputTable, Sheet};
