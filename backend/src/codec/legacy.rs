//! Legacy sign-encoded files.
//!
//! The older tooling kept every person in one users file and told roles apart
//! by the sign of the id: teachers negative, students zero or positive.
//!
//! ```csv
//! user_id,name,birth_year
//! -1,Teacher A,
//! 0,Ahmad,2012
//! ```
//!
//! Month files had the long-form columns but referenced these legacy ids.
//! They are only read here and translated into store ids by the import service.

use csv::{ReaderBuilder, StringRecord, Trim};
use log::warn;

use super::parse_score;

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyUser {
    pub legacy_id: i64,
    pub name: String,
    pub birth_year: Option<u32>,
}

impl LegacyUser {
    pub fn is_teacher(&self) -> bool {
        self.legacy_id < 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEntry {
    pub student_id: i64,
    pub teacher_id: i64,
    pub day: u32,
    pub hifz: Option<f64>,
    pub murajaah: Option<f64>,
}

fn positional_reader(text: &str) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(text.as_bytes())
}

fn records(text: &str, what: &str) -> Vec<StringRecord> {
    let mut reader = positional_reader(text);
    reader
        .records()
        .filter_map(|r| match r {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable {} row: {}", what, e);
                None
            }
        })
        .collect()
}

pub fn decode_users(text: &str) -> Vec<LegacyUser> {
    records(text, "legacy user")
        .into_iter()
        .filter_map(|record| {
            let legacy_id = record.get(0)?.parse::<i64>().ok()?;
            let name = record.get(1).unwrap_or("").to_string();
            if name.is_empty() {
                warn!("Skipping legacy user {} with empty name", legacy_id);
                return None;
            }
            Some(LegacyUser {
                legacy_id,
                name,
                birth_year: record.get(2).and_then(|v| v.parse::<u32>().ok()),
            })
        })
        .collect()
}

pub fn decode_month(text: &str) -> Vec<LegacyEntry> {
    records(text, "legacy month")
        .into_iter()
        .filter_map(|record| {
            Some(LegacyEntry {
                student_id: record.get(0)?.parse::<i64>().ok()?,
                teacher_id: record.get(1).and_then(|v| v.parse::<i64>().ok()).unwrap_or(-1),
                day: record.get(2)?.parse::<u32>().ok().filter(|d| (1..=30).contains(d))?,
                hifz: record.get(3).and_then(parse_score),
                murajaah: record.get(4).and_then(parse_score),
            })
        })
        .collect()
}
