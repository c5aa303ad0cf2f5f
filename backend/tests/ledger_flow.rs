use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;

use halaqa_backend::domain::models::{NewStudent, ScoreUpdate};
use halaqa_backend::domain::FixedClock;
use halaqa_backend::{Backend, CsvConnection, LedgerError, LedgerResult};
use shared::{HijriDate, HijriMonth, SkipReason};

const SCENARIO: &str = "\",,,,,,,\",1,,2,,\n\
    \"name,surah,age,teacher,attendance,hifz,review,hifz,review,hifz,review\"\n\
    \n\
    Ahmad,Al-Baqarah,12,Teacher A,2,3,1,2,0.5,1,0.5\n";

/// 2025-10-23 is 1 Jumada al-Ula 1447
fn open(dir: &TempDir, today: NaiveDate) -> LedgerResult<Backend> {
    let connection = CsvConnection::new(dir.path())?;
    Backend::with_clock(connection, Arc::new(FixedClock(today)))
}

fn october_23() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 23).unwrap()
}

#[test]
fn test_concrete_scenario_imports_one_teacher_one_student_two_entries() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    let backend = open(&dir, october_23())?;
    let month = HijriMonth::new(1447, 5);

    let report = backend.import_service.import_wide_csv(SCENARIO, month)?;
    assert_eq!(report.teachers_inserted, 1);
    assert_eq!(report.students_inserted, 1);
    assert_eq!(report.entries_inserted, 2);

    let teacher = backend.roster_service.find_teacher_by_name("Teacher A")?.unwrap();
    let ahmad = backend.roster_service.find_student("Ahmad", Some(teacher.id))?.unwrap();
    assert_eq!(ahmad.surah, "Al-Baqarah");
    assert_eq!(ahmad.age, Some(12));

    let container = backend.ledger_service.load_month(month);
    assert_eq!(container.len(), 2);
    let day1 = container.get(ahmad.id, 1).unwrap();
    assert_eq!((day1.hifz, day1.muragaa), (Some(2.0), Some(0.5)));
    assert!(day1.attended());
    let day2 = container.get(ahmad.id, 2).unwrap();
    assert_eq!((day2.hifz, day2.muragaa), (Some(1.0), Some(0.5)));
    assert_eq!(day2.teacher_id, Some(teacher.id));
    Ok(())
}

#[test]
fn test_importing_the_same_sheet_twice_changes_nothing() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    let backend = open(&dir, october_23())?;
    let month = HijriMonth::new(1447, 5);

    backend.import_service.import_wide_csv(SCENARIO, month)?;
    let first = backend.ledger_service.load_month(month);

    let second = backend.import_service.import_wide_csv(SCENARIO, month)?;
    assert_eq!(second.teachers_inserted, 0);
    assert_eq!(second.students_inserted, 0);
    assert_eq!(second.entries_inserted, 0);
    assert_eq!(second.count_skipped(&SkipReason::DuplicateEntry), 2);

    assert_eq!(backend.roster_service.list_teachers()?.len(), 1);
    assert_eq!(backend.roster_service.list_students()?.len(), 1);
    assert_eq!(backend.ledger_service.reload_month(month), first);
    Ok(())
}

#[test]
fn test_archive_guard_until_students_are_transferred() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    let backend = open(&dir, october_23())?;
    let roster = &backend.roster_service;

    let a = roster.add_teacher("Teacher A")?;
    let b = roster.add_teacher("Teacher B")?;
    roster.add_student(NewStudent { teacher_id: Some(a.id), ..NewStudent::named("Ahmad") })?;

    let err = roster.archive_teacher(a.id).unwrap_err();
    assert!(matches!(err, LedgerError::ReferentialConflict(_)));
    assert!(!roster.get_teacher(a.id)?.unwrap().archived);

    assert_eq!(roster.transfer_students(a.id, b.id)?, 1);
    assert!(roster.archive_teacher(a.id)?.archived);
    Ok(())
}

#[test]
fn test_edit_window_and_persistence_across_reopen() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    let backend = open(&dir, october_23())?;
    let teacher = backend.roster_service.add_teacher("Teacher A")?;
    let student = backend
        .roster_service
        .add_student(NewStudent { teacher_id: Some(teacher.id), ..NewStudent::named("Ahmad") })?;

    let closed = backend
        .ledger_service
        .record_score(student.id, HijriDate::new(1447, 2, 10), ScoreUpdate::Hifz(Some(1.0)));
    assert!(matches!(closed, Err(LedgerError::EditWindowClosed { .. })));
    assert!(backend.ledger_service.load_month(HijriMonth::new(1447, 2)).is_empty());

    let date = HijriDate::new(1447, 4, 29);
    backend.ledger_service.record_score(student.id, date, ScoreUpdate::Muragaa(Some(0.5)))?;
    backend.ledger_service.record_score(student.id, date, ScoreUpdate::AttendedOnly(true))?;

    let reopened = open(&dir, october_23())?;
    let entry = reopened.ledger_service.get_entry(student.id, date).unwrap();
    assert!(entry.attended_only);
    assert_eq!((entry.hifz, entry.muragaa), (None, None));
    assert_eq!(entry.teacher_id, Some(teacher.id));
    Ok(())
}

#[test]
fn test_edit_window_rolls_over_the_year() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    // 1 Muharram 1447
    let backend = open(&dir, NaiveDate::from_ymd_opt(2025, 6, 27).unwrap())?;
    let calendar = &backend.calendar_service;

    assert_eq!(calendar.current_hijri_date(), HijriDate::new(1447, 1, 1));
    assert_eq!(
        calendar.editable_months(),
        vec![HijriMonth::new(1446, 12), HijriMonth::new(1447, 1), HijriMonth::new(1447, 2)]
    );
    assert!(calendar.is_editable(1446, 12));
    assert!(!calendar.is_editable(1446, 11));
    assert!(!calendar.is_editable(1447, 3));
    Ok(())
}

#[test]
fn test_exported_sheet_imports_into_a_fresh_store() -> LedgerResult<()> {
    let source_dir = TempDir::new()?;
    let source = open(&source_dir, october_23())?;
    let month = HijriMonth::new(1447, 5);
    source.import_service.import_wide_csv(SCENARIO, month)?;

    let out_dir = TempDir::new()?;
    let response = source
        .export_service
        .export_to_path(month, None, out_dir.path().to_str())?;
    assert!(response.success);

    let target_dir = TempDir::new()?;
    let target = open(&target_dir, october_23())?;
    let report = target
        .import_service
        .import_wide_file(&out_dir.path().join("halaqa_1447-05.csv"), None)?;
    assert_eq!(report.entries_inserted, 2);

    let teacher = target.roster_service.find_teacher_by_name("Teacher A")?.unwrap();
    let ahmad = target.roster_service.find_student("Ahmad", Some(teacher.id))?.unwrap();
    let day1 = target.ledger_service.get_entry(ahmad.id, month.day(1)).unwrap();
    assert_eq!((day1.hifz, day1.muragaa), (Some(2.0), Some(0.5)));
    Ok(())
}

#[test]
fn test_quoted_name_reimports_onto_the_same_student() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    let backend = open(&dir, october_23())?;
    let month = HijriMonth::new(1447, 5);
    let teacher = backend.roster_service.add_teacher("Teacher, \"A\"")?;
    let student = backend.roster_service.add_student(NewStudent {
        surah: "Al-\"Mulk\"".to_string(),
        teacher_id: Some(teacher.id),
        ..NewStudent::named("Ahmad \"Abu Zaid\"")
    })?;
    assert_eq!(student.name, "Ahmad Abu Zaid");
    assert_eq!(student.surah, "Al-Mulk");
    backend.ledger_service.record_score(student.id, month.day(1), ScoreUpdate::Hifz(Some(1.0)))?;

    let sheet = backend.export_service.export_wide_csv(month, None)?;
    let report = backend.import_service.import_wide_csv(&sheet.csv_content, month)?;
    assert_eq!((report.teachers_inserted, report.teachers_reused), (0, 1));
    assert_eq!((report.students_inserted, report.students_reused), (0, 1));
    assert_eq!(report.count_skipped(&SkipReason::DuplicateEntry), 1);
    assert_eq!(backend.roster_service.list_students()?.len(), 1);
    assert!(backend.roster_service.find_student("Ahmad \"Abu Zaid\"", Some(teacher.id))?.is_some());
    Ok(())
}

#[test]
fn test_corrupt_roster_row_does_not_block_the_ledger() -> LedgerResult<()> {
    let dir = TempDir::new()?;
    let backend = open(&dir, october_23())?;
    let month = HijriMonth::new(1447, 5);
    backend.import_service.import_wide_csv(SCENARIO, month)?;

    let students_path = backend.connection().students_file_path();
    let mut students = std::fs::read_to_string(&students_path)?;
    students.push_str("oops,Broken,,,,,notabool,\n");
    std::fs::write(&students_path, students)?;

    let reopened = open(&dir, october_23())?;
    assert_eq!(reopened.roster_service.list_students()?.len(), 1);
    reopened.roster_service.add_teacher("Teacher B")?;
    let sheet = reopened.export_service.export_wide_csv(month, None)?;
    assert!(sheet.csv_content.contains("Ahmad"));
    Ok(())
}
