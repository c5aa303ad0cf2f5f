//! # CSV Transcoder
//!
//! Conversions between the canonical record model and the CSV shapes the
//! ledger reads and writes:
//!
//! - [`long_form`]: one row per (student, day), the internal month-file format
//! - [`wide_form`]: the two-header, day-paired spreadsheet format used for
//!   import from and export to external sheets
//! - [`legacy`]: the older sign-encoded users/month files, read only at the
//!   import boundary
//!
//! The codecs share no state. Malformed fields are repaired to an empty value
//! and the row is kept; a malformed row is dropped and logged; only a
//! structurally unusable file is an error.

pub mod legacy;
pub mod long_form;
pub mod wide_form;

/// Parse a score cell. Blank, non-numeric and non-finite values read as empty.
pub fn parse_score(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render a score cell; empty stays empty so "no data" and zero stay distinct
pub fn format_score(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

/// `2.0` -> `"2"`, `0.5` -> `"0.5"`
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
