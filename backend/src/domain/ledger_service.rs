use log::{debug, info, warn};
use shared::{HijriDate, HijriMonth};

use crate::domain::calendar::CalendarService;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{DailyEntry, MonthContainer, ScoreUpdate, Student, UserId};
use crate::domain::roster_service::RosterService;
use crate::storage::csv::MonthRepository;
use crate::storage::traits::EntryStorage;

/// One student on one day, for the daily roster
#[derive(Debug, Clone, PartialEq)]
pub struct DayRow {
    pub student: Student,
    pub entry: Option<DailyEntry>,
}

/// A student's totals over a month
#[derive(Debug, Clone, PartialEq)]
pub struct StudentMonthSummary {
    pub student: Student,
    pub attendance_days: u32,
    pub hifz_total: f64,
    pub muragaa_total: f64,
}

impl StudentMonthSummary {
    pub fn has_data(&self) -> bool {
        self.attendance_days > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayView {
    pub date: HijriDate,
    pub editable: bool,
    pub rows: Vec<DayRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthView {
    pub month: HijriMonth,
    pub editable: bool,
    pub days_in_month: u32,
    pub students: Vec<StudentMonthSummary>,
}

/// Records daily scores and builds the roster views over them
#[derive(Clone)]
pub struct LedgerService {
    calendar: CalendarService,
    roster: RosterService,
    month_repository: MonthRepository,
}

impl LedgerService {
    pub fn new(calendar: CalendarService, roster: RosterService, month_repository: MonthRepository) -> Self {
        Self {
            calendar,
            roster,
            month_repository,
        }
    }

    fn validate_date(&self, date: HijriDate) -> LedgerResult<()> {
        if !(1..=12).contains(&date.month) {
            return Err(LedgerError::Validation(format!("invalid Hijri month in {}", date)));
        }
        let days = self.calendar.days_in_month(date.month_key());
        if !(1..=days).contains(&date.day) {
            return Err(LedgerError::Validation(format!(
                "day {} is outside {} ({} days)",
                date.day,
                date.month_key(),
                days
            )));
        }
        Ok(())
    }

    fn validate_update(update: ScoreUpdate) -> LedgerResult<()> {
        match update {
            ScoreUpdate::Hifz(Some(v)) | ScoreUpdate::Muragaa(Some(v)) if !v.is_finite() || v < 0.0 => {
                Err(LedgerError::Validation(format!("score {} must be a non-negative number", v)))
            }
            _ => Ok(()),
        }
    }

    /// Apply one update to a student's entry for a day.
    ///
    /// The entry is created on first mutation with the student's current
    /// teacher. Returns the entry, or `None` when nothing is left to persist.
    pub fn record_score(
        &self,
        student_id: UserId,
        date: HijriDate,
        update: ScoreUpdate,
    ) -> LedgerResult<Option<DailyEntry>> {
        self.validate_date(date)?;
        Self::validate_update(update)?;

        let month = date.month_key();
        if !self.calendar.is_editable(month.year, month.month) {
            warn!("Rejected edit of {} for student {}: month is closed", date, student_id);
            return Err(LedgerError::EditWindowClosed { month });
        }

        let student = self
            .roster
            .get_student(student_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("student {}", student_id)))?;

        let mut container = self.month_repository.load_month(month);
        let entry = container.entry_mut(student.id, date.day, student.teacher_id);
        entry.apply(update);
        let result = entry.clone();
        self.month_repository.save_month(&container)?;

        debug!("Recorded {:?} for student {} on {}", update, student_id, date);
        Ok(result.has_signal().then_some(result))
    }

    pub fn get_entry(&self, student_id: UserId, date: HijriDate) -> Option<DailyEntry> {
        self.month_repository.get_entry(student_id, date)
    }

    /// The stored month, straight from the cache
    pub fn load_month(&self, month: HijriMonth) -> MonthContainer {
        self.month_repository.load_month(month)
    }

    /// Drop the cached month and read it from disk again
    pub fn reload_month(&self, month: HijriMonth) -> MonthContainer {
        info!("Reloading month {}", month);
        self.month_repository.reload_month(month)
    }

    pub fn entries_for_student(&self, student_id: UserId) -> LedgerResult<Vec<DailyEntry>> {
        self.month_repository.list_entries_by_student(student_id)
    }

    pub fn entries_in_range(&self, start: HijriDate, end: HijriDate) -> LedgerResult<Vec<DailyEntry>> {
        self.month_repository.list_entries_in_range(start, end)
    }

    /// Active students for one day. With a teacher filter, only students whose
    /// entry that day was recorded under the teacher. Students with an entry first.
    pub fn day_view(&self, date: HijriDate, teacher_filter: Option<UserId>) -> LedgerResult<DayView> {
        self.validate_date(date)?;
        let container = self.month_repository.load_month(date.month_key());

        let mut rows: Vec<DayRow> = self
            .roster
            .active_students()?
            .into_iter()
            .map(|student| DayRow {
                entry: container.get(student.id, date.day).filter(|e| e.has_signal()).cloned(),
                student,
            })
            .filter(|row| match teacher_filter {
                Some(teacher_id) => row.entry.as_ref().is_some_and(|e| e.teacher_id == Some(teacher_id)),
                None => true,
            })
            .collect();
        rows.sort_by_key(|row| row.entry.is_none());

        Ok(DayView {
            date,
            editable: self.calendar.is_editable(date.year, date.month),
            rows,
        })
    }

    /// Active students with their totals for a month. With a teacher filter,
    /// only students with an entry recorded under the teacher that month.
    /// Students with data first.
    pub fn month_view(&self, year: i32, month: u32, teacher_filter: Option<UserId>) -> LedgerResult<MonthView> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Validation(format!("invalid Hijri month {}", month)));
        }
        let month = HijriMonth::new(year, month);
        let container = self.month_repository.load_month(month);

        let mut students: Vec<StudentMonthSummary> = Vec::new();
        for student in self.roster.active_students()? {
            let days = container.student_days(student.id);
            if let Some(teacher_id) = teacher_filter {
                let taught = days.is_some_and(|d| d.values().any(|e| e.teacher_id == Some(teacher_id)));
                if !taught {
                    continue;
                }
            }

            let mut summary = StudentMonthSummary {
                student,
                attendance_days: 0,
                hifz_total: 0.0,
                muragaa_total: 0.0,
            };
            for entry in days.into_iter().flat_map(|d| d.values()).filter(|e| e.attended()) {
                summary.attendance_days += 1;
                summary.hifz_total += entry.hifz.unwrap_or(0.0);
                summary.muragaa_total += entry.muragaa.unwrap_or(0.0);
            }
            students.push(summary);
        }
        students.sort_by_key(|s| !s.has_data());

        Ok(MonthView {
            month,
            editable: self.calendar.is_editable(month.year, month.month),
            days_in_month: self.calendar.days_in_month(month),
            students,
        })
    }
}
