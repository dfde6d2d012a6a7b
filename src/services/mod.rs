pub mod batches;
pub mod export;
pub mod ledger;
pub mod month_normalizer;
pub mod pivot;
pub mod table_parser;
