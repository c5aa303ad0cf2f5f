//! Full-state backup as a single JSON document.
//!
//! Ids in a snapshot belong to the store that wrote it. Restoring merges by
//! natural key (teachers by name, students by name and teacher) and remaps
//! every id, so a snapshot can be restored into a store that already has data.

use chrono::{DateTime, Local, Utc};
use log::{info, warn};
use shared::{
    BackupEntry, BackupSnapshot, BackupStudent, BackupTeacher, ExportToPathResponse, ImportReport, SkipReason,
    SkippedRecord,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::calendar::CalendarService;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::export_service::{sanitize_path, write_export};
use crate::domain::import_service::{insert_pending, PendingEntry};
use crate::domain::models::{DailyEntry, NewStudent, UserId};
use crate::domain::roster_service::RosterService;
use crate::storage::csv::{CsvConnection, MonthRepository};
use crate::storage::traits::EntryStorage;

/// `halaqa_backup_<YYYY-MM-DD>.json`
pub fn backup_filename(date: DateTime<Local>) -> String {
    format!("halaqa_backup_{}.json", date.format("%Y-%m-%d"))
}

#[derive(Clone)]
pub struct BackupService {
    connection: CsvConnection,
    calendar: CalendarService,
    roster: RosterService,
    month_repository: MonthRepository,
}

impl BackupService {
    pub fn new(
        connection: CsvConnection,
        calendar: CalendarService,
        roster: RosterService,
        month_repository: MonthRepository,
    ) -> Self {
        Self {
            connection,
            calendar,
            roster,
            month_repository,
        }
    }

    /// Snapshot every teacher, student and entry with signal
    pub fn export_backup(&self) -> LedgerResult<BackupSnapshot> {
        let teachers: Vec<BackupTeacher> = self
            .roster
            .list_teachers()?
            .into_iter()
            .map(|t| BackupTeacher {
                id: t.id,
                name: t.name,
                archived: t.archived,
                created_at: t.created_at.to_rfc3339(),
            })
            .collect();

        let students: Vec<BackupStudent> = self
            .roster
            .list_students()?
            .into_iter()
            .map(|s| BackupStudent {
                id: s.id,
                name: s.name,
                surah: s.surah,
                age: s.age,
                birth_year: s.birth_year,
                teacher_id: s.teacher_id,
                archived: s.archived,
                created_at: s.created_at.to_rfc3339(),
            })
            .collect();

        let mut entries = Vec::new();
        for month in self.month_repository.list_months()? {
            entries.extend(self.month_repository.load_month(month).signal_entries().map(|e| BackupEntry {
                student_id: e.student_id,
                teacher_id: e.teacher_id,
                date: e.date,
                attended: e.attended(),
                hifz: e.hifz,
                muragaa: e.muragaa,
                attended_only: e.attended_only,
            }));
        }

        info!(
            "BACKUP: Snapshot of {} teachers, {} students, {} entries",
            teachers.len(),
            students.len(),
            entries.len()
        );
        Ok(BackupSnapshot {
            students,
            teachers,
            entries,
            export_date: Utc::now().to_rfc3339(),
        })
    }

    pub fn export_backup_json(&self) -> LedgerResult<String> {
        Ok(serde_json::to_string_pretty(&self.export_backup()?)?)
    }

    /// Write a backup file into `custom_path`, or the data directory's
    /// `backups/` folder when no path is given
    pub fn export_backup_to_path(&self, custom_path: Option<&str>) -> LedgerResult<ExportToPathResponse> {
        let snapshot = self.export_backup()?;
        let content = serde_json::to_string_pretty(&snapshot)?;

        let dir = match custom_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(sanitize_path(path)),
            None => self.connection.base_directory().join("backups"),
        };
        let record_count = snapshot.teachers.len() + snapshot.students.len() + snapshot.entries.len();
        Ok(write_export(&dir.join(backup_filename(Local::now())), &content, record_count))
    }

    pub fn import_backup_json(&self, json: &str) -> LedgerResult<ImportReport> {
        let snapshot: BackupSnapshot = serde_json::from_str(json)?;
        self.import_backup(&snapshot)
    }

    pub fn import_backup_file(&self, path: &Path) -> LedgerResult<ImportReport> {
        info!("BACKUP: Restoring from {}", path.display());
        let json = fs::read_to_string(path)?;
        self.import_backup_json(&json)
    }

    /// Merge a snapshot into the store.
    ///
    /// Archived flags are carried over only for users this call creates.
    pub fn import_backup(&self, snapshot: &BackupSnapshot) -> LedgerResult<ImportReport> {
        let mut report = ImportReport::default();

        let mut teachers: HashMap<UserId, (UserId, String)> = HashMap::new();
        let mut to_archive = Vec::new();
        for backup in &snapshot.teachers {
            let (teacher, created) = self.roster.find_or_add_teacher(&backup.name)?;
            if created {
                report.teachers_inserted += 1;
                if backup.archived {
                    to_archive.push(teacher.id);
                }
            } else {
                report.teachers_reused += 1;
            }
            teachers.insert(backup.id, (teacher.id, teacher.name));
        }

        let mut students: HashMap<UserId, (UserId, String)> = HashMap::new();
        for backup in &snapshot.students {
            let teacher_id = backup
                .teacher_id
                .and_then(|old| teachers.get(&old))
                .map(|(id, _)| *id);
            if backup.teacher_id.is_some() && teacher_id.is_none() {
                warn!("BACKUP: Student {} refers to a teacher missing from the snapshot", backup.name);
            }

            let (student, created) = self.roster.find_or_add_student(NewStudent {
                name: backup.name.clone(),
                surah: backup.surah.clone(),
                age: backup.age,
                birth_year: backup.birth_year,
                teacher_id,
            })?;
            if created {
                report.students_inserted += 1;
                if backup.archived {
                    self.roster.archive_student(student.id)?;
                }
            } else {
                report.students_reused += 1;
            }
            students.insert(backup.id, (student.id, student.name));
        }

        // Teachers are archived only once their students carry their own flags
        for teacher_id in to_archive {
            if let Err(e) = self.roster.archive_teacher(teacher_id) {
                warn!("BACKUP: Leaving teacher {} active: {}", teacher_id, e);
            }
        }

        let mut pending = Vec::with_capacity(snapshot.entries.len());
        for backup in &snapshot.entries {
            let teacher = backup.teacher_id.and_then(|old| teachers.get(&old));
            let teacher_name = teacher.map(|(_, name)| name.clone()).unwrap_or_default();

            let Some((student_id, student_name)) = students.get(&backup.student_id) else {
                report.skip(SkippedRecord {
                    student_name: format!("#{}", backup.student_id),
                    teacher_name,
                    date: Some(backup.date),
                    reason: SkipReason::UnresolvedStudent,
                });
                continue;
            };

            let valid_day = (1..=12).contains(&backup.date.month)
                && (1..=self.calendar.days_in_month(backup.date.month_key())).contains(&backup.date.day);
            if !valid_day {
                report.skip(SkippedRecord {
                    student_name: student_name.clone(),
                    teacher_name,
                    date: Some(backup.date),
                    reason: SkipReason::InvalidDay,
                });
                continue;
            }

            let has_score = backup.hifz.is_some() || backup.muragaa.is_some();
            pending.push(PendingEntry {
                entry: DailyEntry {
                    student_id: *student_id,
                    teacher_id: teacher.map(|(id, _)| *id),
                    date: backup.date,
                    hifz: backup.hifz,
                    muragaa: backup.muragaa,
                    attended_only: !has_score && (backup.attended_only || backup.attended),
                },
                student_name: student_name.clone(),
                teacher_name,
            });
        }

        insert_pending(&self.month_repository, pending, &mut report)?;
        info!(
            "BACKUP: Restored teachers +{} ={}, students +{} ={}, entries +{} skipped {}",
            report.teachers_inserted,
            report.teachers_reused,
            report.students_inserted,
            report.students_reused,
            report.entries_inserted,
            report.entries_skipped
        );
        Ok(report)
    }

    /// Remove every teacher, student and month from the data directory.
    /// The global config is kept.
    pub fn clear_all_data(&self) -> LedgerResult<()> {
        for path in [self.connection.teachers_file_path(), self.connection.students_file_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        let months = self.connection.months_directory();
        if months.exists() {
            fs::remove_dir_all(&months)?;
        }
        self.month_repository.clear_cache();
        warn!("BACKUP: Cleared all ledger data in {}", self.connection.base_directory().display());
        Ok(())
    }

    /// Replace the store's contents with a snapshot
    pub fn restore_replacing(&self, snapshot: &BackupSnapshot) -> LedgerResult<ImportReport> {
        if snapshot.teachers.is_empty() && snapshot.students.is_empty() && !snapshot.entries.is_empty() {
            return Err(LedgerError::Validation(
                "snapshot has entries but no people; refusing to replace".to_string(),
            ));
        }
        self.clear_all_data()?;
        self.import_backup(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ScoreUpdate;
    use crate::storage::csv::test_utils::TestEnvironment;
    use chrono::{NaiveDate, TimeZone};
    use shared::{HijriDate, HijriMonth};

    struct Fixture {
        backup: BackupService,
        roster: RosterService,
        months: MonthRepository,
        _env: TestEnvironment,
    }

    fn fixture() -> LedgerResult<Fixture> {
        let env = TestEnvironment::new()?;
        let calendar = CalendarService::pinned(
            NaiveDate::from_ymd_opt(2025, 10, 23).unwrap(),
            HijriDate::new(1447, 5, 1),
        );
        let roster = RosterService::new(env.connection.clone());
        let months = MonthRepository::new(env.connection.clone());
        let backup = BackupService::new(env.connection.clone(), calendar, roster.clone(), months.clone());
        Ok(Fixture { backup, roster, months, _env: env })
    }

    /// Teacher A (archived after transfer), Teacher B, Ahmad under B with two entries
    fn seed(f: &Fixture) -> LedgerResult<()> {
        let a = f.roster.add_teacher("Teacher A")?;
        let b = f.roster.add_teacher("Teacher B")?;
        let ahmad = f.roster.add_student(NewStudent {
            surah: "Yasin".to_string(),
            teacher_id: Some(a.id),
            ..NewStudent::named("Ahmad")
        })?;

        let mut container = f.months.load_month(HijriMonth::new(1447, 5));
        container.entry_mut(ahmad.id, 1, Some(a.id)).apply(ScoreUpdate::Hifz(Some(2.0)));
        container.entry_mut(ahmad.id, 2, Some(a.id)).apply(ScoreUpdate::AttendedOnly(true));
        f.months.save_month(&container)?;

        f.roster.transfer_students(a.id, b.id)?;
        f.roster.archive_teacher(a.id)?;
        Ok(())
    }

    #[test]
    fn test_backup_filename() {
        let date = Local.with_ymd_and_hms(2025, 10, 23, 9, 30, 0).unwrap();
        assert_eq!(backup_filename(date), "halaqa_backup_2025-10-23.json");
    }

    #[test]
    fn test_export_backup_contents() -> LedgerResult<()> {
        let f = fixture()?;
        seed(&f)?;

        let json = f.backup.export_backup_json()?;
        assert!(json.contains("\"exportDate\""));
        assert!(json.contains("\"attendedOnly\": true"));

        let snapshot: BackupSnapshot = serde_json::from_str(&json)?;
        assert_eq!(snapshot.teachers.len(), 2);
        assert_eq!(snapshot.students.len(), 1);
        assert_eq!(snapshot.entries.len(), 2);
        assert!(snapshot.entries.iter().all(|e| e.attended));
        Ok(())
    }

    #[test]
    fn test_restore_into_empty_store_remaps_ids() -> LedgerResult<()> {
        let source = fixture()?;
        seed(&source)?;
        let snapshot = source.backup.export_backup()?;

        let target = fixture()?;
        target.roster.add_teacher("Someone else")?;
        let report = target.backup.import_backup(&snapshot)?;
        assert_eq!((report.teachers_inserted, report.students_inserted, report.entries_inserted), (2, 1, 2));

        let b = target.roster.find_teacher_by_name("Teacher B")?.unwrap();
        let a = target.roster.find_teacher_by_name("Teacher A")?.unwrap();
        assert!(a.archived);
        let ahmad = target.roster.find_student("Ahmad", Some(b.id))?.unwrap();
        assert_ne!(ahmad.id, snapshot.students[0].id);

        let month = target.months.load_month(HijriMonth::new(1447, 5));
        let day1 = month.get(ahmad.id, 1).unwrap();
        assert_eq!((day1.hifz, day1.teacher_id), (Some(2.0), Some(a.id)));
        assert!(month.get(ahmad.id, 2).is_some_and(|e| e.attended_only));
        Ok(())
    }

    #[test]
    fn test_restoring_twice_adds_nothing() -> LedgerResult<()> {
        let f = fixture()?;
        seed(&f)?;
        let snapshot = f.backup.export_backup()?;

        let report = f.backup.import_backup(&snapshot)?;
        assert_eq!((report.teachers_inserted, report.students_inserted, report.entries_inserted), (0, 0, 0));
        assert_eq!(report.count_skipped(&SkipReason::DuplicateEntry), 2);
        Ok(())
    }

    #[test]
    fn test_unresolved_and_invalid_entries_are_reported() -> LedgerResult<()> {
        let f = fixture()?;
        let snapshot = BackupSnapshot {
            students: vec![BackupStudent {
                id: 10,
                name: "Ahmad".to_string(),
                surah: String::new(),
                age: None,
                birth_year: None,
                teacher_id: None,
                archived: false,
                created_at: "2025-01-01T00:00:00Z".to_string(),
            }],
            teachers: vec![],
            entries: vec![
                BackupEntry {
                    student_id: 99,
                    teacher_id: None,
                    date: HijriDate::new(1447, 5, 1),
                    attended: true,
                    hifz: Some(1.0),
                    muragaa: None,
                    attended_only: false,
                },
                BackupEntry {
                    student_id: 10,
                    teacher_id: None,
                    date: HijriDate::new(1447, 6, 30),
                    attended: true,
                    hifz: Some(1.0),
                    muragaa: None,
                    attended_only: false,
                },
            ],
            export_date: "2025-01-01T00:00:00Z".to_string(),
        };

        let report = f.backup.import_backup(&snapshot)?;
        assert_eq!(report.count_skipped(&SkipReason::UnresolvedStudent), 1);
        assert_eq!(report.count_skipped(&SkipReason::InvalidDay), 1);
        assert_eq!(report.entries_inserted, 0);
        Ok(())
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() -> LedgerResult<()> {
        let f = fixture()?;
        assert!(matches!(f.backup.import_backup_json("{ not json"), Err(LedgerError::Parse(_))));
        Ok(())
    }

    #[test]
    fn test_restore_replacing_clears_first() -> LedgerResult<()> {
        let f = fixture()?;
        seed(&f)?;
        let snapshot = f.backup.export_backup()?;
        f.roster.add_student(NewStudent::named("Extra"))?;

        let report = f.backup.restore_replacing(&snapshot)?;
        assert_eq!(report.students_inserted, 1);
        assert_eq!(f.roster.list_students()?.len(), 1);
        assert_eq!(f.months.load_month(HijriMonth::new(1447, 5)).len(), 2);
        Ok(())
    }
}
