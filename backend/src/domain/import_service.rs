//! Bulk import into the store.
//!
//! Imports resolve people by natural key before inserting, so running the same
//! import twice adds nothing the second time. Entries go in skip-on-conflict,
//! one write per month, and every skipped record lands in the `ImportReport`.
//! Imports back-fill history and are not bound by the edit window.

use log::{debug, info, warn};
use shared::{HijriDate, HijriMonth, ImportReport, SkipReason, SkippedRecord};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::legacy::{self, LegacyEntry};
use crate::codec::wide_form::{self, WideSheet};
use crate::domain::calendar::CalendarService;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{DailyEntry, NewStudent, UserId};
use crate::domain::roster_service::RosterService;
use crate::storage::csv::connection::{month_file_in, scan_month_dir};
use crate::storage::csv::MonthRepository;
use crate::storage::traits::EntryStorage;

/// Header check result for one sheet on disk
#[derive(Debug, Clone, PartialEq)]
pub struct SheetCheck {
    pub path: PathBuf,
    pub month: Option<HijriMonth>,
    pub warnings: Vec<String>,
}

impl SheetCheck {
    pub fn is_consistent(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// An entry waiting for insertion, with the names used to report it
pub(crate) struct PendingEntry {
    pub entry: DailyEntry,
    pub student_name: String,
    pub teacher_name: String,
}

#[derive(Clone)]
pub struct ImportService {
    calendar: CalendarService,
    roster: RosterService,
    month_repository: MonthRepository,
}

impl ImportService {
    pub fn new(calendar: CalendarService, roster: RosterService, month_repository: MonthRepository) -> Self {
        Self {
            calendar,
            roster,
            month_repository,
        }
    }

    /// Parse and import a wide-form sheet for `month`
    pub fn import_wide_csv(&self, text: &str, month: HijriMonth) -> LedgerResult<ImportReport> {
        let sheet = wide_form::parse_wide_csv(text, month, self.calendar.days_in_month(month))?;
        self.import_wide_sheet(&sheet)
    }

    /// Import a wide-form file. Without an explicit month, the month is read
    /// from the filename (`halaqa_1447-05.csv`).
    pub fn import_wide_file(&self, path: &Path, month: Option<HijriMonth>) -> LedgerResult<ImportReport> {
        let month = match month {
            Some(month) => month,
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(wide_form::month_from_filename)
                .ok_or_else(|| {
                    LedgerError::Validation(format!(
                        "cannot tell the month of {}; pass it explicitly",
                        path.display()
                    ))
                })?,
        };
        info!("IMPORT: Reading {} as month {}", path.display(), month);
        let text = fs::read_to_string(path)?;
        self.import_wide_csv(&text, month)
    }

    /// Insert a parsed sheet: teachers, then students, then entries
    pub fn import_wide_sheet(&self, sheet: &WideSheet) -> LedgerResult<ImportReport> {
        let mut report = ImportReport {
            header_warnings: sheet.header_warnings.clone(),
            ..Default::default()
        };
        for warning in &sheet.header_warnings {
            warn!("IMPORT: {}", warning);
        }

        let mut teacher_ids: HashMap<&str, UserId> = HashMap::new();
        for name in &sheet.teachers {
            let (teacher, created) = self.roster.find_or_add_teacher(name)?;
            if created {
                report.teachers_inserted += 1;
            } else {
                report.teachers_reused += 1;
            }
            teacher_ids.insert(name.as_str(), teacher.id);
        }

        let mut student_ids: HashMap<(&str, &str), UserId> = HashMap::new();
        for row in &sheet.students {
            let teacher_id = teacher_ids.get(row.teacher_name.as_str()).copied();
            let (student, created) = self.roster.find_or_add_student(NewStudent {
                name: row.name.clone(),
                surah: row.surah.clone(),
                age: row.age,
                birth_year: None,
                teacher_id,
            })?;
            if created {
                report.students_inserted += 1;
            } else {
                report.students_reused += 1;
            }
            student_ids.insert((row.name.as_str(), row.teacher_name.as_str()), student.id);
        }

        let days_in_month = self.calendar.days_in_month(sheet.month);
        let mut pending = Vec::with_capacity(sheet.entries.len());
        for wide in &sheet.entries {
            let date = sheet.month.day(wide.day);
            let skipped = |reason| SkippedRecord {
                student_name: wide.student_name.clone(),
                teacher_name: wide.teacher_name.clone(),
                date: Some(date),
                reason,
            };

            if wide.day == 0 || wide.day > days_in_month {
                report.skip(skipped(SkipReason::InvalidDay));
                continue;
            }
            let Some(&student_id) = student_ids.get(&(wide.student_name.as_str(), wide.teacher_name.as_str()))
            else {
                warn!("IMPORT: No student {} under {}", wide.student_name, wide.teacher_name);
                report.skip(skipped(SkipReason::UnresolvedStudent));
                continue;
            };

            pending.push(PendingEntry {
                entry: DailyEntry {
                    student_id,
                    teacher_id: teacher_ids.get(wide.teacher_name.as_str()).copied(),
                    date,
                    hifz: wide.hifz,
                    muragaa: wide.review,
                    attended_only: false,
                },
                student_name: wide.student_name.clone(),
                teacher_name: wide.teacher_name.clone(),
            });
        }

        insert_pending(&self.month_repository, pending, &mut report)?;
        info!(
            "IMPORT: {}: teachers +{} ={}, students +{} ={}, entries +{} skipped {}",
            sheet.month,
            report.teachers_inserted,
            report.teachers_reused,
            report.students_inserted,
            report.students_reused,
            report.entries_inserted,
            report.entries_skipped
        );
        Ok(report)
    }

    /// Import sign-encoded legacy data: a users file and month files laid out
    /// as `<months_dir>/<year>/<month>.csv`
    pub fn import_legacy_files(&self, users_path: &Path, months_dir: &Path) -> LedgerResult<ImportReport> {
        let users_text = fs::read_to_string(users_path)?;
        let mut months = Vec::new();
        for month in scan_month_dir(months_dir)? {
            let text = fs::read_to_string(month_file_in(months_dir, month))?;
            months.push((month, text));
        }
        info!(
            "IMPORT: Legacy users from {} and {} month files from {}",
            users_path.display(),
            months.len(),
            months_dir.display()
        );
        self.import_legacy(&users_text, &months)
    }

    /// Translate legacy ids into store ids.
    ///
    /// Negative ids are teachers, the rest students. A student is assigned the
    /// teacher of their most recent legacy entry.
    pub fn import_legacy(&self, users_csv: &str, months: &[(HijriMonth, String)]) -> LedgerResult<ImportReport> {
        let users = legacy::decode_users(users_csv);
        let mut report = ImportReport::default();

        let decoded: Vec<(HijriMonth, Vec<LegacyEntry>)> = months
            .iter()
            .map(|(month, text)| (*month, legacy::decode_month(text)))
            .collect();

        let mut teacher_ids: HashMap<i64, (UserId, String)> = HashMap::new();
        for user in users.iter().filter(|u| u.is_teacher()) {
            let (teacher, created) = self.roster.find_or_add_teacher(&user.name)?;
            if created {
                report.teachers_inserted += 1;
            } else {
                report.teachers_reused += 1;
            }
            teacher_ids.insert(user.legacy_id, (teacher.id, teacher.name));
        }

        let mut latest_teacher: HashMap<i64, (HijriDate, i64)> = HashMap::new();
        for (month, entries) in &decoded {
            for entry in entries {
                let date = month.day(entry.day);
                let newer = latest_teacher
                    .get(&entry.student_id)
                    .map_or(true, |(seen, _)| date >= *seen);
                if newer {
                    latest_teacher.insert(entry.student_id, (date, entry.teacher_id));
                }
            }
        }

        let mut student_ids: HashMap<i64, (UserId, String)> = HashMap::new();
        for user in users.iter().filter(|u| !u.is_teacher()) {
            let teacher_id = latest_teacher
                .get(&user.legacy_id)
                .and_then(|(_, legacy_teacher)| teacher_ids.get(legacy_teacher))
                .map(|(id, _)| *id);
            let (student, created) = self.roster.find_or_add_student(NewStudent {
                name: user.name.clone(),
                birth_year: user.birth_year,
                teacher_id,
                ..Default::default()
            })?;
            if created {
                report.students_inserted += 1;
            } else {
                report.students_reused += 1;
            }
            student_ids.insert(user.legacy_id, (student.id, student.name));
        }

        let mut pending = Vec::new();
        for (month, entries) in decoded {
            let days_in_month = self.calendar.days_in_month(month);
            for entry in entries {
                let date = month.day(entry.day);
                let teacher = teacher_ids.get(&entry.teacher_id);
                let teacher_name = teacher.map(|(_, name)| name.clone()).unwrap_or_default();

                let Some((student_id, student_name)) = student_ids.get(&entry.student_id) else {
                    report.skip(SkippedRecord {
                        student_name: format!("#{}", entry.student_id),
                        teacher_name,
                        date: Some(date),
                        reason: SkipReason::UnresolvedStudent,
                    });
                    continue;
                };
                if entry.day > days_in_month {
                    report.skip(SkippedRecord {
                        student_name: student_name.clone(),
                        teacher_name,
                        date: Some(date),
                        reason: SkipReason::InvalidDay,
                    });
                    continue;
                }

                pending.push(PendingEntry {
                    entry: DailyEntry {
                        student_id: *student_id,
                        teacher_id: teacher.map(|(id, _)| *id),
                        date,
                        hifz: entry.hifz,
                        muragaa: entry.murajaah,
                        attended_only: entry.hifz.is_none() && entry.murajaah.is_none(),
                    },
                    student_name: student_name.clone(),
                    teacher_name,
                });
            }
        }

        insert_pending(&self.month_repository, pending, &mut report)?;
        info!(
            "IMPORT: Legacy import done: {} teachers, {} students, {} entries, {} skipped",
            report.teachers_inserted,
            report.students_inserted,
            report.entries_inserted,
            report.entries_skipped
        );
        Ok(report)
    }

    /// Check the headers of every `.csv` under `dir`, recursively
    pub fn check_wide_directory(&self, dir: &Path) -> LedgerResult<Vec<SheetCheck>> {
        let mut files = Vec::new();
        collect_csv_files(dir, &mut files)?;
        files.sort();

        let mut checks = Vec::with_capacity(files.len());
        for path in files {
            let month = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(wide_form::month_from_filename);
            let days = month
                .map(|m| self.calendar.days_in_month(m))
                .unwrap_or(wide_form::MAX_DAYS);

            let warnings = match fs::read_to_string(&path) {
                Ok(text) => wide_form::check_sheet(&text, days).unwrap_or_else(|e| vec![e.to_string()]),
                Err(e) => vec![format!("Read error: {}", e)],
            };
            checks.push(SheetCheck { path, month, warnings });
        }

        let inconsistent = checks.iter().filter(|c| !c.is_consistent()).count();
        info!("IMPORT: Checked {} sheets, {} inconsistent", checks.len(), inconsistent);
        Ok(checks)
    }
}

/// Insert entries month by month, one write per month, recording each skip
pub(crate) fn insert_pending(
    month_repository: &MonthRepository,
    pending: Vec<PendingEntry>,
    report: &mut ImportReport,
) -> LedgerResult<()> {
    let mut by_month: BTreeMap<HijriMonth, Vec<PendingEntry>> = BTreeMap::new();
    for item in pending {
        by_month.entry(item.entry.date.month_key()).or_default().push(item);
    }

    for (month, items) in by_month {
        let entries: Vec<DailyEntry> = items.iter().map(|p| p.entry.clone()).collect();
        let outcomes = month_repository.insert_entries(month, &entries)?;

        for (item, outcome) in items.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.entries_inserted += 1,
                Err(e) => {
                    let reason = if e.is_unique_violation() {
                        SkipReason::DuplicateEntry
                    } else {
                        SkipReason::InvalidDay
                    };
                    debug!("Skipping {} on {}: {}", item.student_name, item.entry.date, e);
                    report.skip(SkippedRecord {
                        student_name: item.student_name,
                        teacher_name: item.teacher_name,
                        date: Some(item.entry.date),
                        reason,
                    });
                }
            }
        }
    }
    Ok(())
}

fn collect_csv_files(dir: &Path, files: &mut Vec<PathBuf>) -> LedgerResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_csv_files(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::test_utils::TestEnvironment;
    use chrono::NaiveDate;

    struct Fixture {
        import: ImportService,
        roster: RosterService,
        months: MonthRepository,
        env: TestEnvironment,
    }

    fn fixture() -> LedgerResult<Fixture> {
        let env = TestEnvironment::new()?;
        let calendar = CalendarService::pinned(
            NaiveDate::from_ymd_opt(2025, 10, 23).unwrap(),
            HijriDate::new(1447, 5, 1),
        );
        let roster = RosterService::new(env.connection.clone());
        let months = MonthRepository::new(env.connection.clone());
        let import = ImportService::new(calendar, roster.clone(), months.clone());
        Ok(Fixture { import, roster, months, env })
    }

    const SHEET: &str = ",,,,,,,1,,2,,3,\n\
        name,surah,age,teacher,attendance,hifz,review,hifz,review,hifz,review,hifz,review\n\
        \n\
        Ahmad,Al-Baqarah,12,Teacher A,2,3,1,2,0.5,1,0.5,,\n\
        Omar,Yasin,10,Teacher B,1,1,0,0,0,,,1,\n";

    #[test]
    fn test_wide_import_inserts_in_order() -> LedgerResult<()> {
        let f = fixture()?;
        let month = HijriMonth::new(1440, 1);
        let report = f.import.import_wide_csv(SHEET, month)?;

        assert_eq!(report.teachers_inserted, 2);
        assert_eq!(report.students_inserted, 2);
        assert_eq!(report.entries_inserted, 3);
        assert_eq!(report.entries_skipped, 0);

        let teacher_a = f.roster.find_teacher_by_name("Teacher A")?.unwrap();
        let ahmad = f.roster.find_student("Ahmad", Some(teacher_a.id))?.unwrap();
        assert_eq!(ahmad.surah, "Al-Baqarah");
        assert_eq!(ahmad.age, Some(12));

        let stored = f.months.load_month(month);
        let day1 = stored.get(ahmad.id, 1).unwrap();
        assert_eq!((day1.hifz, day1.muragaa, day1.teacher_id), (Some(2.0), Some(0.5), Some(teacher_a.id)));
        Ok(())
    }

    #[test]
    fn test_day_past_month_end_is_reported() -> LedgerResult<()> {
        let f = fixture()?;
        // 1447-06 has 29 days
        let month = HijriMonth::new(1447, 6);
        let mut row = String::from("Ahmad,,,Teacher A,2,3,0,2,");
        for _ in 2..30 {
            row.push_str(",,");
        }
        row.push_str(",1,");
        let text = format!(",,,,,,,1\nname,surah,age,teacher,a,h,r\n\n{}\n", row);

        let report = f.import.import_wide_csv(&text, month)?;
        assert_eq!(report.entries_inserted, 1);
        assert_eq!(report.entries_skipped, 1);
        assert_eq!(report.count_skipped(&SkipReason::InvalidDay), 1);
        assert_eq!(report.reasons[0].date, Some(HijriDate::new(1447, 6, 30)));
        assert_eq!(f.months.load_month(month).len(), 1);
        Ok(())
    }

    #[test]
    fn test_repeated_wide_import_is_a_no_op() -> LedgerResult<()> {
        let f = fixture()?;
        let month = HijriMonth::new(1447, 5);
        f.import.import_wide_csv(SHEET, month)?;
        let before = f.months.reload_month(month);

        let second = f.import.import_wide_csv(SHEET, month)?;
        assert_eq!((second.teachers_inserted, second.teachers_reused), (0, 2));
        assert_eq!((second.students_inserted, second.students_reused), (0, 2));
        assert_eq!(second.entries_inserted, 0);
        assert_eq!(second.count_skipped(&SkipReason::DuplicateEntry), 3);

        assert_eq!(f.months.reload_month(month), before);
        assert_eq!(f.roster.list_students()?.len(), 2);
        assert_eq!(f.roster.list_teachers()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_import_file_takes_month_from_name() -> LedgerResult<()> {
        let f = fixture()?;
        let path = f.env.base_path.join("halaqa_1446-02.csv");
        fs::write(&path, format!("\u{feff}{}", SHEET))?;

        let report = f.import.import_wide_file(&path, None)?;
        assert_eq!(report.entries_inserted, 3);
        assert_eq!(f.months.list_months()?, vec![HijriMonth::new(1446, 2)]);

        let unnamed = f.env.base_path.join("sheet.csv");
        fs::write(&unnamed, SHEET)?;
        assert!(matches!(f.import.import_wide_file(&unnamed, None), Err(LedgerError::Validation(_))));
        assert!(matches!(
            f.import.import_wide_file(&f.env.base_path.join("missing_1446-02.csv"), None),
            Err(LedgerError::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn test_short_file_changes_nothing() -> LedgerResult<()> {
        let f = fixture()?;
        let err = f.import.import_wide_csv("a\nb\n", HijriMonth::new(1447, 5)).unwrap_err();
        assert!(matches!(err, LedgerError::Parse(_)));
        assert!(f.roster.list_teachers()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_legacy_import_maps_signed_ids() -> LedgerResult<()> {
        let f = fixture()?;
        let users = "user_id,name,birth_year\n-1,Teacher A,\n-2,Teacher B,\n0,Ahmad,2012\n1,Omar,\n";
        let months = vec![
            (
                HijriMonth::new(1446, 12),
                "student_id,teacher_id,day,hifz,murajaah\n0,-1,3,2,\n1,-1,3,,\n7,-1,4,1,\n".to_string(),
            ),
            (
                HijriMonth::new(1447, 1),
                "student_id,teacher_id,day,hifz,murajaah\n0,-2,1,1,1\n".to_string(),
            ),
        ];

        let report = f.import.import_legacy(users, &months)?;
        assert_eq!(report.teachers_inserted, 2);
        assert_eq!(report.students_inserted, 2);
        assert_eq!(report.entries_inserted, 3);
        assert_eq!(report.count_skipped(&SkipReason::UnresolvedStudent), 1);

        let teacher_b = f.roster.find_teacher_by_name("Teacher B")?.unwrap();
        let ahmad = f.roster.find_student("Ahmad", Some(teacher_b.id))?.unwrap();
        assert_eq!(ahmad.birth_year, Some(2012));

        let omar_entry = f.months.load_month(HijriMonth::new(1446, 12));
        assert!(omar_entry.entries().any(|e| e.attended_only && e.hifz.is_none()));

        let again = f.import.import_legacy(users, &months)?;
        assert_eq!(again.entries_inserted, 0);
        assert_eq!(again.students_reused, 2);
        Ok(())
    }

    #[test]
    fn test_legacy_files_from_disk() -> LedgerResult<()> {
        let f = fixture()?;
        let root = f.env.base_path.join("legacy");
        let users_path = root.join("users.csv");
        fs::create_dir_all(root.join("months").join("1447"))?;
        fs::write(&users_path, "user_id,name,birth_year\n-1,Teacher A,\n0,Ahmad,\n")?;
        fs::write(
            root.join("months").join("1447").join("2.csv"),
            "student_id,teacher_id,day,hifz,murajaah\n0,-1,5,1,\n",
        )?;

        let report = f.import.import_legacy_files(&users_path, &root.join("months"))?;
        assert_eq!(report.entries_inserted, 1);
        assert!(f.months.load_month(HijriMonth::new(1447, 2)).contains(2, 5));
        Ok(())
    }

    #[test]
    fn test_check_wide_directory() -> LedgerResult<()> {
        let f = fixture()?;
        let dir = f.env.base_path.join("sheets").join("1447");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("halaqa_1447-05.csv"), SHEET)?;
        fs::write(dir.join("halaqa_1447-06.csv"), "one line only\n")?;
        fs::write(dir.join("notes.txt"), "ignored")?;

        let checks = f.import.check_wide_directory(&f.env.base_path.join("sheets"))?;
        assert_eq!(checks.len(), 2);
        assert!(checks[0].is_consistent());
        assert_eq!(checks[0].month, Some(HijriMonth::new(1447, 5)));
        assert!(!checks[1].is_consistent());
        Ok(())
    }
}
