//! Daily entries and the month containers that hold them.

use serde::{Deserialize, Serialize};
use shared::{HijriDate, HijriMonth};
use std::collections::BTreeMap;

use super::user::UserId;

/// One student's activity on one day. Keyed by (student_id, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub student_id: UserId,
    /// Teacher at the time of the entry; not rewritten by later transfers
    pub teacher_id: Option<UserId>,
    pub date: HijriDate,
    pub hifz: Option<f64>,
    pub muragaa: Option<f64>,
    /// Present with no score. Never true while either score is set.
    pub attended_only: bool,
}

/// A single mutation of a daily entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreUpdate {
    Hifz(Option<f64>),
    Muragaa(Option<f64>),
    AttendedOnly(bool),
}

impl DailyEntry {
    pub fn empty(student_id: UserId, teacher_id: Option<UserId>, date: HijriDate) -> Self {
        Self {
            student_id,
            teacher_id,
            date,
            hifz: None,
            muragaa: None,
            attended_only: false,
        }
    }

    pub fn has_score(&self) -> bool {
        self.hifz.is_some() || self.muragaa.is_some()
    }

    /// True when the entry is worth persisting
    pub fn has_signal(&self) -> bool {
        self.has_score() || self.attended_only
    }

    /// Every entry that carries signal counts as attendance
    pub fn attended(&self) -> bool {
        self.has_signal()
    }

    /// Apply an update, keeping attended-only and scores mutually exclusive
    pub fn apply(&mut self, update: ScoreUpdate) {
        match update {
            ScoreUpdate::AttendedOnly(value) => {
                self.attended_only = value;
                if value {
                    self.hifz = None;
                    self.muragaa = None;
                }
            }
            ScoreUpdate::Hifz(value) => {
                self.hifz = value;
                if value.is_some() {
                    self.attended_only = false;
                }
            }
            ScoreUpdate::Muragaa(value) => {
                self.muragaa = value;
                if value.is_some() {
                    self.attended_only = false;
                }
            }
        }
    }
}

/// All entries of one Hijri month: student -> day -> entry
#[derive(Debug, Clone, PartialEq)]
pub struct MonthContainer {
    pub month: HijriMonth,
    students: BTreeMap<UserId, BTreeMap<u32, DailyEntry>>,
}

impl MonthContainer {
    pub fn new(month: HijriMonth) -> Self {
        Self {
            month,
            students: BTreeMap::new(),
        }
    }

    pub fn get(&self, student_id: UserId, day: u32) -> Option<&DailyEntry> {
        self.students.get(&student_id).and_then(|days| days.get(&day))
    }

    pub fn contains(&self, student_id: UserId, day: u32) -> bool {
        self.get(student_id, day).is_some()
    }

    /// Get the entry for (student, day), creating an empty one if needed
    pub fn entry_mut(
        &mut self,
        student_id: UserId,
        day: u32,
        teacher_id: Option<UserId>,
    ) -> &mut DailyEntry {
        let date = self.month.day(day);
        self.students
            .entry(student_id)
            .or_default()
            .entry(day)
            .or_insert_with(|| DailyEntry::empty(student_id, teacher_id, date))
    }

    /// Insert or overwrite the entry at its (student, day)
    pub fn upsert(&mut self, entry: DailyEntry) {
        self.students
            .entry(entry.student_id)
            .or_default()
            .insert(entry.date.day, entry);
    }

    pub fn student_days(&self, student_id: UserId) -> Option<&BTreeMap<u32, DailyEntry>> {
        self.students.get(&student_id)
    }

    /// All entries ordered by student then day
    pub fn entries(&self) -> impl Iterator<Item = &DailyEntry> {
        self.students.values().flat_map(|days| days.values())
    }

    /// Entries that would survive a save
    pub fn signal_entries(&self) -> impl Iterator<Item = &DailyEntry> {
        self.entries().filter(|e| e.has_signal())
    }

    pub fn len(&self) -> usize {
        self.students.values().map(|days| days.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> DailyEntry {
        DailyEntry::empty(1, Some(2), HijriDate::new(1447, 5, 3))
    }

    fn assert_exclusive(e: &DailyEntry) {
        if e.attended_only {
            assert!(e.hifz.is_none() && e.muragaa.is_none());
        }
        if e.has_score() {
            assert!(!e.attended_only);
        }
    }

    #[test]
    fn test_attended_only_clears_scores() {
        let mut e = entry();
        e.apply(ScoreUpdate::Hifz(Some(2.0)));
        e.apply(ScoreUpdate::Muragaa(Some(0.5)));
        e.apply(ScoreUpdate::AttendedOnly(true));
        assert!(e.attended_only);
        assert_eq!(e.hifz, None);
        assert_eq!(e.muragaa, None);
        assert_exclusive(&e);
    }

    #[test]
    fn test_score_clears_attended_only() {
        let mut e = entry();
        e.apply(ScoreUpdate::AttendedOnly(true));
        e.apply(ScoreUpdate::Muragaa(Some(1.0)));
        assert!(!e.attended_only);
        assert_eq!(e.muragaa, Some(1.0));
        assert_exclusive(&e);
    }

    #[test]
    fn test_clearing_a_score_keeps_attended_only_false() {
        let mut e = entry();
        e.apply(ScoreUpdate::Hifz(Some(1.0)));
        e.apply(ScoreUpdate::Hifz(None));
        assert!(!e.attended_only);
        assert!(!e.has_signal());
    }

    #[test]
    fn test_every_update_sequence_stays_exclusive() {
        let updates = [
            ScoreUpdate::Hifz(Some(1.0)),
            ScoreUpdate::AttendedOnly(true),
            ScoreUpdate::Muragaa(Some(2.0)),
            ScoreUpdate::AttendedOnly(false),
            ScoreUpdate::Hifz(None),
            ScoreUpdate::AttendedOnly(true),
            ScoreUpdate::Muragaa(None),
            ScoreUpdate::Hifz(Some(0.0)),
        ];
        for start in 0..updates.len() {
            let mut e = entry();
            for update in updates.iter().cycle().skip(start).take(updates.len() * 2) {
                e.apply(*update);
                assert_exclusive(&e);
            }
        }
    }

    #[test]
    fn test_container_entry_mut_creates_lazily() {
        let mut month = MonthContainer::new(HijriMonth::new(1447, 5));
        assert!(month.is_empty());
        month.entry_mut(7, 12, Some(1)).apply(ScoreUpdate::AttendedOnly(true));
        assert_eq!(month.len(), 1);
        let stored = month.get(7, 12).unwrap();
        assert_eq!(stored.date, HijriDate::new(1447, 5, 12));
        assert_eq!(stored.teacher_id, Some(1));
        assert!(month.contains(7, 12));
        assert!(!month.contains(7, 13));
    }
}
