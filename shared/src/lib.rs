use serde::{Deserialize, Serialize};
use std::fmt;

/// A date in the Hijri (lunar) calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HijriDate {
    pub year: i32,
    /// 1 = Muharram ... 12 = Dhu al-Hijjah
    pub month: u32,
    pub day: u32,
}

impl HijriDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// The month this date falls in
    pub fn month_key(&self) -> HijriMonth {
        HijriMonth::new(self.year, self.month)
    }
}

impl fmt::Display for HijriDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// A (year, month) pair in the Hijri calendar. Month containers are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HijriMonth {
    pub year: i32,
    pub month: u32,
}

impl HijriMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Storage key in the `{year}-{month}` form
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.year, self.month)
    }

    pub fn day(&self, day: u32) -> HijriDate {
        HijriDate::new(self.year, self.month, day)
    }
}

impl fmt::Display for HijriMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Response for the current Hijri date and the months that may still be edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentHijriDateResponse {
    pub date: HijriDate,
    /// e.g. "7 جمادى الأولى 1448"
    pub formatted_date: String,
    pub month_name: String,
    /// Whether the date came from the configured fallback instead of the clock
    pub is_fallback: bool,
    /// Previous, current and next month, in that order
    pub editable_months: Vec<HijriMonth>,
}

/// Why a record was left out of an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// An entry already exists for this (student, date)
    DuplicateEntry,
    /// The entry's student could not be resolved to a stored student
    UnresolvedStudent,
    /// Day number is outside the target month
    InvalidDay,
}

/// A single record that an import skipped, with enough context to find it in the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub student_name: String,
    pub teacher_name: String,
    pub date: Option<HijriDate>,
    pub reason: SkipReason,
}

/// Outcome of a bulk import. Imports are partial-success: whatever was
/// inserted before a skip stays inserted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub teachers_inserted: usize,
    pub teachers_reused: usize,
    pub students_inserted: usize,
    pub students_reused: usize,
    pub entries_inserted: usize,
    pub entries_skipped: usize,
    pub reasons: Vec<SkippedRecord>,
    /// Non-fatal findings about the source header
    pub header_warnings: Vec<String>,
}

impl ImportReport {
    pub fn skip(&mut self, record: SkippedRecord) {
        self.entries_skipped += 1;
        self.reasons.push(record);
    }

    pub fn count_skipped(&self, reason: &SkipReason) -> usize {
        self.reasons.iter().filter(|r| &r.reason == reason).count()
    }
}

/// Wide-form spreadsheet export of one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportWideCsvResponse {
    /// CSV text without the byte-order marker
    pub csv_content: String,
    pub filename: String,
    pub student_count: usize,
    pub day_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportToPathResponse {
    pub success: bool,
    pub message: String,
    pub file_path: String,
    pub record_count: usize,
}

/// Full-state snapshot. Ids are the exporting store's ids; they are not stable
/// across stores and are remapped on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub students: Vec<BackupStudent>,
    pub teachers: Vec<BackupTeacher>,
    pub entries: Vec<BackupEntry>,
    /// RFC 3339 timestamp
    pub export_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStudent {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub surah: String,
    pub age: Option<u32>,
    #[serde(default)]
    pub birth_year: Option<u32>,
    pub teacher_id: Option<u64>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupTeacher {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub student_id: u64,
    pub teacher_id: Option<u64>,
    pub date: HijriDate,
    pub attended: bool,
    pub hifz: Option<f64>,
    pub muragaa: Option<f64>,
    #[serde(default)]
    pub attended_only: bool,
}
