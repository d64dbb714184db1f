//!  Storage is organized through [activity_log::CsvActivityLog].
//!  The basic idea is:
//!   - There is a single CSV file with a header row, one row per successful tick.
//!   - Rows are only ever appended. Nothing rewrites or deletes them.
//!   - Everything else (known topics, reports) is derived by reading the rows back.

pub mod activity_log;
pub mod entities;
