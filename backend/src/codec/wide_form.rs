//! Wide-form spreadsheet format.
//!
//! ```text
//! ,,,,,,,1,,2,, ...                      <- day numbers above each hifz column
//! name,surah,age,teacher,attendance,hifz,review,hifz,review,hifz,review ...
//!                                        <- blank separator
//! Ahmad,Al-Baqarah,12,Teacher A,2,3,1,2,0.5,1,0.5 ...
//! ```
//!
//! Seven identity columns, then a (hifz, review) pair per day of the month.
//! Sheets are hand-edited, so decoding is forgiving: stray rows are dropped
//! silently and only a file too short to hold the headers is rejected.

use log::{debug, info};
use shared::HijriMonth;
use std::collections::{BTreeMap, HashSet};

use super::{format_number, format_score, parse_score};
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::DailyEntry;

pub const IDENTITY_COLUMNS: usize = 7;
pub const MAX_DAYS: u32 = 30;

/// Identity column labels written on export
pub const IDENTITY_LABELS: [&str; IDENTITY_COLUMNS] = [
    "اسم الطالب",
    "يحفظ إلى سورة",
    "العمر",
    "الأستاذ",
    "حضور",
    "حفظ",
    "مراجعة",
];
pub const DAY_LABELS: [&str; 2] = ["حفظ", "مراجعة"];

pub const BOM: char = '\u{feff}';

/// A student row as read from the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct WideStudentRow {
    /// 1-based position among the sheet's non-blank lines
    pub row: usize,
    pub name: String,
    pub surah: String,
    pub age: Option<u32>,
    pub teacher_name: String,
    pub attendance_total: f64,
    pub hifz_total: f64,
    pub review_total: f64,
}

/// A day with recorded activity, still addressed by names
#[derive(Debug, Clone, PartialEq)]
pub struct WideEntry {
    pub row: usize,
    pub student_name: String,
    pub teacher_name: String,
    pub day: u32,
    pub hifz: Option<f64>,
    pub review: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideSheet {
    pub month: HijriMonth,
    /// Distinct teacher names in order of first appearance
    pub teachers: Vec<String>,
    pub students: Vec<WideStudentRow>,
    pub entries: Vec<WideEntry>,
    pub header_warnings: Vec<String>,
}

/// Split one line on commas outside double quotes.
///
/// Quotes toggle the in-quote state and are dropped; doubled quotes inside a
/// quoted field are not unescaped.
pub fn split_line(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                values.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

fn is_blank_row(values: &[String]) -> bool {
    values.iter().all(|v| v.is_empty())
}

/// Non-negative number or nothing
fn parse_cell(raw: &str) -> Option<f64> {
    parse_score(raw).filter(|v| *v >= 0.0)
}

/// Checks the identity labels and day-column layout. Findings are reported,
/// never fatal.
fn check_headers(day_row: &[String], label_row: &[String], days_in_month: u32) -> Vec<String> {
    let mut warnings = Vec::new();

    if label_row.len() < IDENTITY_COLUMNS {
        warnings.push(format!(
            "Header has {} columns, expected at least {} identity columns",
            label_row.len(),
            IDENTITY_COLUMNS
        ));
        return warnings;
    }

    let day_columns = label_row[IDENTITY_COLUMNS..]
        .iter()
        .rposition(|v| !v.is_empty())
        .map(|last| last + 1)
        .unwrap_or(0);
    if day_columns % 2 != 0 {
        warnings.push(format!(
            "Header has {} day columns, expected hifz/review pairs",
            day_columns
        ));
    }

    let declared_days = day_row
        .iter()
        .filter_map(|v| v.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    if declared_days > days_in_month {
        warnings.push(format!(
            "Header declares {} days but the month has {}; entries past the month end are skipped",
            declared_days, days_in_month
        ));
    }

    warnings
}

/// Parse a wide-form sheet for `month`.
///
/// Every day pair up to `MAX_DAYS` is read; entries past `days_in_month` are
/// kept so the importer can report them. `days_in_month` only feeds the
/// header check.
pub fn parse_wide_csv(text: &str, month: HijriMonth, days_in_month: u32) -> LedgerResult<WideSheet> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() < 3 {
        return Err(LedgerError::Parse(format!(
            "expected two header rows and at least one student row, found {} non-empty lines",
            lines.len()
        )));
    }

    let day_row = split_line(lines[0]);
    let label_row = split_line(lines[1]);
    let header_warnings = check_headers(&day_row, &label_row, days_in_month.min(MAX_DAYS));

    let mut sheet = WideSheet {
        month,
        teachers: Vec::new(),
        students: Vec::new(),
        entries: Vec::new(),
        header_warnings,
    };
    let mut seen_teachers = HashSet::new();

    for (index, line) in lines.iter().enumerate().skip(2) {
        let row = index + 1;
        let values = split_line(line);
        if is_blank_row(&values) || values.len() < 4 {
            continue;
        }

        let name = values[0].clone();
        let teacher_name = values[3].clone();
        if name.is_empty() || teacher_name.is_empty() {
            debug!("Dropping row {}: missing student or teacher name", row);
            continue;
        }

        if seen_teachers.insert(teacher_name.clone()) {
            sheet.teachers.push(teacher_name.clone());
        }

        let total = |i: usize| values.get(i).and_then(|v| parse_cell(v)).unwrap_or(0.0);
        sheet.students.push(WideStudentRow {
            row,
            name: name.clone(),
            surah: values[1].clone(),
            age: values[2].parse::<u32>().ok().filter(|a| *a > 0),
            teacher_name: teacher_name.clone(),
            attendance_total: total(4),
            hifz_total: total(5),
            review_total: total(6),
        });

        let mut column = IDENTITY_COLUMNS;
        let mut day = 1;
        while column < values.len() && day <= MAX_DAYS {
            let hifz = parse_cell(&values[column]);
            let review = values.get(column + 1).and_then(|v| parse_cell(v));

            if hifz.unwrap_or(0.0) > 0.0 || review.unwrap_or(0.0) > 0.0 {
                sheet.entries.push(WideEntry {
                    row,
                    student_name: name.clone(),
                    teacher_name: teacher_name.clone(),
                    day,
                    hifz,
                    review,
                });
            }

            column += 2;
            day += 1;
        }
    }

    info!(
        "Parsed wide sheet for {}: {} teachers, {} students, {} entries",
        month,
        sheet.teachers.len(),
        sheet.students.len(),
        sheet.entries.len()
    );
    Ok(sheet)
}

/// Run only the header checks over a sheet
pub fn check_sheet(text: &str, days_in_month: u32) -> LedgerResult<Vec<String>> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut lines = text.split('\n').map(str::trim).filter(|line| !line.is_empty());
    match (lines.next(), lines.next()) {
        (Some(day_row), Some(label_row)) => Ok(check_headers(
            &split_line(day_row),
            &split_line(label_row),
            days_in_month.min(MAX_DAYS),
        )),
        _ => Err(LedgerError::Parse("too few rows for the two header rows".to_string())),
    }
}

/// One student line of an export
#[derive(Debug, Clone)]
pub struct WideExportRow<'a> {
    pub name: &'a str,
    pub surah: &'a str,
    pub age: Option<u32>,
    pub teacher_name: &'a str,
    pub days: Option<&'a BTreeMap<u32, DailyEntry>>,
}

/// Render a text cell the splitter reads back unchanged: double quotes and
/// line breaks are dropped, and a cell with a comma is wrapped in quotes.
fn quote(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.contains(',') {
        format!("\"{}\"", cleaned)
    } else {
        cleaned.to_string()
    }
}

/// Render a month as a wide-form sheet without the byte-order marker
pub fn encode_wide(rows: &[WideExportRow<'_>], days_in_month: u32) -> String {
    let mut csv = String::new();

    let mut day_header: Vec<String> = vec![String::new(); IDENTITY_COLUMNS];
    let mut label_header: Vec<String> = IDENTITY_LABELS.iter().map(|l| l.to_string()).collect();
    for day in 1..=days_in_month {
        day_header.push(day.to_string());
        day_header.push(String::new());
        label_header.extend(DAY_LABELS.iter().map(|l| l.to_string()));
    }
    csv.push_str(&day_header.join(","));
    csv.push('\n');
    csv.push_str(&label_header.join(","));
    csv.push('\n');
    csv.push('\n');

    for row in rows {
        let mut attendance = 0u32;
        let mut hifz_total = 0.0;
        let mut review_total = 0.0;
        let mut day_cells = Vec::with_capacity(days_in_month as usize * 2);

        for day in 1..=days_in_month {
            match row.days.and_then(|days| days.get(&day)) {
                Some(entry) => {
                    if entry.attended() {
                        attendance += 1;
                        hifz_total += entry.hifz.unwrap_or(0.0);
                        review_total += entry.muragaa.unwrap_or(0.0);
                    }
                    day_cells.push(format_score(entry.hifz));
                    day_cells.push(format_score(entry.muragaa));
                }
                None => {
                    day_cells.push(String::new());
                    day_cells.push(String::new());
                }
            }
        }

        let mut cells = vec![
            quote(row.name),
            quote(row.surah),
            row.age.map(|a| a.to_string()).unwrap_or_default(),
            quote(row.teacher_name),
            attendance.to_string(),
            format_number(hifz_total),
            format_number(review_total),
        ];
        cells.extend(day_cells);
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }

    csv
}

const EXPORT_PREFIX: &str = "halaqa_";

/// Export filename for a month, e.g. `halaqa_1447-05.csv`
pub fn export_filename(month: HijriMonth) -> String {
    format!("{}{}.csv", EXPORT_PREFIX, month)
}

/// Recover the target month from a filename that embeds `YYYY-MM` (or `YYYY_MM`)
pub fn month_from_filename(filename: &str) -> Option<HijriMonth> {
    let stem = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv");

    let digits: Vec<&str> = stem
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .collect();

    let year_month = |pair: &[&str]| {
        let year = pair[0].parse::<i32>().ok()?;
        let month = pair[1].parse::<u32>().ok()?;
        if pair[0].len() == 4 && (1..=12).contains(&month) {
            Some(HijriMonth::new(year, month))
        } else {
            None
        }
    };

    // Our own export name wins; otherwise the last year-month pair in the name
    if let Some(index) = stem.rfind(EXPORT_PREFIX) {
        let tail: Vec<&str> = stem[index + EXPORT_PREFIX.len()..]
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .take(2)
            .collect();
        if tail.len() == 2 {
            if let Some(month) = year_month(&tail[..]) {
                return Some(month);
            }
        }
    }
    digits.windows(2).rev().find_map(year_month)
}
