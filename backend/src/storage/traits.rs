//! # Storage Traits
//!
//! This module defines the storage abstraction traits that allow different
//! storage backends to be used interchangeably in the domain layer.
//!
//! All operations are synchronous: the ledger is a single local actor and a
//! logical operation is one call.

use shared::{HijriDate, HijriMonth};

use crate::domain::error::LedgerResult;
use crate::domain::models::{DailyEntry, MonthContainer, Student, Teacher, UserId};

/// Trait defining the interface for teacher storage operations
pub trait TeacherStorage: Send + Sync {
    /// Store a new teacher; fails if the id is taken
    fn store_teacher(&self, teacher: &Teacher) -> LedgerResult<()>;

    fn get_teacher(&self, teacher_id: UserId) -> LedgerResult<Option<Teacher>>;

    /// List all teachers ordered by id
    fn list_teachers(&self) -> LedgerResult<Vec<Teacher>>;

    /// Update an existing teacher
    fn update_teacher(&self, teacher: &Teacher) -> LedgerResult<()>;

    /// First teacher whose name matches exactly
    fn find_teacher_by_name(&self, name: &str) -> LedgerResult<Option<Teacher>>;
}

/// Trait defining the interface for student storage operations
pub trait StudentStorage: Send + Sync {
    /// Store a new student; fails if the id is taken
    fn store_student(&self, student: &Student) -> LedgerResult<()>;

    fn get_student(&self, student_id: UserId) -> LedgerResult<Option<Student>>;

    /// List all students ordered by id
    fn list_students(&self) -> LedgerResult<Vec<Student>>;

    /// Update an existing student
    fn update_student(&self, student: &Student) -> LedgerResult<()>;

    /// Update several students with a single write
    fn update_students(&self, students: &[Student]) -> LedgerResult<()>;

    /// Students (archived included) whose current teacher is `teacher_id`
    fn list_students_by_teacher(&self, teacher_id: UserId) -> LedgerResult<Vec<Student>>;

    /// First student with this exact name under this teacher
    fn find_student(&self, name: &str, teacher_id: Option<UserId>) -> LedgerResult<Option<Student>>;
}

/// Trait defining the interface for month-partitioned entry storage
pub trait EntryStorage: Send + Sync {
    /// Load a month. Never fails: an unreadable or missing month is empty.
    fn load_month(&self, month: HijriMonth) -> MonthContainer;

    /// Drop the cached copy and read the month again
    fn reload_month(&self, month: HijriMonth) -> MonthContainer;

    /// Persist the entries that carry signal and refresh the cache
    fn save_month(&self, container: &MonthContainer) -> LedgerResult<()>;

    fn get_entry(&self, student_id: UserId, date: HijriDate) -> Option<DailyEntry>;

    /// Insert a new entry; an existing (student, date) entry is a
    /// `UniqueConstraintViolation`
    fn insert_entry(&self, entry: &DailyEntry) -> LedgerResult<()>;

    /// Insert many entries of one month with a single write. The outer error is
    /// a failed write; the inner results are per-entry outcomes.
    fn insert_entries(
        &self,
        month: HijriMonth,
        entries: &[DailyEntry],
    ) -> LedgerResult<Vec<LedgerResult<()>>>;

    /// Insert or overwrite the entry at its (student, date)
    fn upsert_entry(&self, entry: &DailyEntry) -> LedgerResult<()>;

    fn list_entries_by_student(&self, student_id: UserId) -> LedgerResult<Vec<DailyEntry>>;

    fn list_entries_by_date(&self, date: HijriDate) -> Vec<DailyEntry>;

    /// Entries with `start <= date <= end`, ordered by date then student
    fn list_entries_in_range(&self, start: HijriDate, end: HijriDate) -> LedgerResult<Vec<DailyEntry>>;

    /// Months with persisted data, oldest first
    fn list_months(&self) -> LedgerResult<Vec<HijriMonth>>;
}
