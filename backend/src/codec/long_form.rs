//! Long-form month files.
//!
//! ```csv
//! student_id,teacher_id,day,hifz,murajaah
//! 4,1,3,2,0.5
//! 4,1,4,,
//! ```
//!
//! One row per entry that carries signal. A row with both scores empty is an
//! attended-only day. Values are positional and assumed comma-free, so the
//! reader does not interpret quotes.

use csv::{ReaderBuilder, Trim, Writer};
use log::{debug, warn};
use shared::HijriMonth;

use super::{format_score, parse_score};
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{DailyEntry, MonthContainer, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Required positive id; the row is dropped if it does not parse
    Id,
    /// Optional id; unparseable reads as absent
    OptionalId,
    /// Day of month 1..=30; the row is dropped if it does not parse
    Day,
    /// Optional score; unparseable reads as empty
    Score,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: &'static str,
}

/// Column order shared by the encoder and decoder
pub const LONG_FORM_SCHEMA: [FieldSpec; 5] = [
    FieldSpec { name: "student_id", kind: FieldKind::Id, default: "" },
    FieldSpec { name: "teacher_id", kind: FieldKind::OptionalId, default: "" },
    FieldSpec { name: "day", kind: FieldKind::Day, default: "" },
    FieldSpec { name: "hifz", kind: FieldKind::Score, default: "" },
    FieldSpec { name: "murajaah", kind: FieldKind::Score, default: "" },
];

const STUDENT_ID: usize = 0;
const TEACHER_ID: usize = 1;
const DAY: usize = 2;
const HIFZ: usize = 3;
const MURAJAAH: usize = 4;

pub const MAX_DAY: u32 = 30;

pub fn header() -> Vec<&'static str> {
    LONG_FORM_SCHEMA.iter().map(|f| f.name).collect()
}

/// A row's cell at a schema position, or the schema default when the row is short
fn cell<'r>(record: &'r csv::StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or(LONG_FORM_SCHEMA[index].default)
}

fn parse_id(raw: &str) -> Option<UserId> {
    raw.trim().parse::<UserId>().ok().filter(|id| *id > 0)
}

fn parse_day(raw: &str) -> Option<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|d| (1..=MAX_DAY).contains(d))
}

/// Decode a month file. Never fails: bad rows are skipped, bad scores become empty.
pub fn decode_month(month: HijriMonth, text: &str) -> MonthContainer {
    let mut container = MonthContainer::new(month);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    for (index, result) in reader.records().enumerate() {
        let line = index + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable row {} in month {}: {}", line, month, e);
                continue;
            }
        };

        if record.iter().all(|v| v.is_empty()) {
            continue;
        }

        let (student_id, day) = match (
            parse_id(cell(&record, STUDENT_ID)),
            parse_day(cell(&record, DAY)),
        ) {
            (Some(s), Some(d)) => (s, d),
            _ => {
                warn!(
                    "Skipping row {} in month {}: bad student id or day ({:?})",
                    line, month, record
                );
                continue;
            }
        };

        let hifz = parse_score(cell(&record, HIFZ));
        let muragaa = parse_score(cell(&record, MURAJAAH));

        let entry = DailyEntry {
            student_id,
            teacher_id: parse_id(cell(&record, TEACHER_ID)),
            date: month.day(day),
            hifz,
            muragaa,
            attended_only: hifz.is_none() && muragaa.is_none(),
        };

        if container.contains(student_id, day) {
            debug!(
                "Row {} repeats student {} day {} in month {}; keeping the later row",
                line, student_id, day, month
            );
        }
        container.upsert(entry);
    }

    container
}

/// Encode a month file with one row per entry that carries signal
pub fn encode_month(container: &MonthContainer) -> LedgerResult<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(header())?;

    for entry in container.signal_entries() {
        writer.write_record(&[
            entry.student_id.to_string(),
            entry.teacher_id.map(|id| id.to_string()).unwrap_or_default(),
            entry.date.day.to_string(),
            format_score(entry.hifz),
            format_score(entry.muragaa),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}
