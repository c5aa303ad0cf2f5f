//! Export service domain logic for the ledger.
//!
//! Renders a month as a wide-form spreadsheet and writes it to disk with the
//! byte-order marker spreadsheet tools expect.

use log::{error, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use shared::{ExportToPathResponse, ExportWideCsvResponse, HijriMonth};

use crate::codec::wide_form::{self, WideExportRow};
use crate::domain::calendar::CalendarService;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::UserId;
use crate::domain::roster_service::RosterService;
use crate::storage::csv::MonthRepository;
use crate::storage::traits::EntryStorage;

#[derive(Clone)]
pub struct ExportService {
    calendar: CalendarService,
    roster: RosterService,
    month_repository: MonthRepository,
}

impl ExportService {
    pub fn new(calendar: CalendarService, roster: RosterService, month_repository: MonthRepository) -> Self {
        Self {
            calendar,
            roster,
            month_repository,
        }
    }

    /// Render one month for the active students, optionally only those
    /// currently assigned to `teacher_filter`
    pub fn export_wide_csv(
        &self,
        month: HijriMonth,
        teacher_filter: Option<UserId>,
    ) -> LedgerResult<ExportWideCsvResponse> {
        if !(1..=12).contains(&month.month) {
            return Err(LedgerError::Validation(format!("invalid Hijri month {}", month.month)));
        }
        info!("EXPORT: Exporting {} (teacher filter: {:?})", month, teacher_filter);

        let teacher_names: HashMap<UserId, String> = self
            .roster
            .active_teachers()?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();
        let students: Vec<_> = self
            .roster
            .active_students()?
            .into_iter()
            .filter(|s| teacher_filter.map_or(true, |id| s.teacher_id == Some(id)))
            .collect();

        let container = self.month_repository.load_month(month);
        let rows: Vec<WideExportRow<'_>> = students
            .iter()
            .map(|s| WideExportRow {
                name: &s.name,
                surah: &s.surah,
                age: s.age,
                teacher_name: s
                    .teacher_id
                    .and_then(|id| teacher_names.get(&id))
                    .map(String::as_str)
                    .unwrap_or(""),
                days: container.student_days(s.id),
            })
            .collect();

        let day_count = self.calendar.days_in_month(month);
        let response = ExportWideCsvResponse {
            csv_content: wide_form::encode_wide(&rows, day_count),
            filename: wide_form::export_filename(month),
            student_count: rows.len(),
            day_count,
        };

        info!(
            "EXPORT: {} students over {} days ({} bytes) as {}",
            response.student_count,
            response.day_count,
            response.csv_content.len(),
            response.filename
        );
        Ok(response)
    }

    /// Write a month's sheet into `custom_path`, or the Documents folder when
    /// no path is given. Write failures are reported in the response.
    pub fn export_to_path(
        &self,
        month: HijriMonth,
        teacher_filter: Option<UserId>,
        custom_path: Option<&str>,
    ) -> LedgerResult<ExportToPathResponse> {
        let export = self.export_wide_csv(month, teacher_filter)?;

        let export_dir = match custom_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(sanitize_path(path)),
            None => match dirs::document_dir().or_else(dirs::home_dir) {
                Some(dir) => dir,
                None => {
                    error!("EXPORT: Could not determine default export directory");
                    return Ok(ExportToPathResponse {
                        success: false,
                        message: "Failed to determine export directory".to_string(),
                        file_path: String::new(),
                        record_count: 0,
                    });
                }
            },
        };

        let file_path = export_dir.join(&export.filename);
        let content = format!("{}{}", wide_form::BOM, export.csv_content);
        Ok(write_export(&file_path, &content, export.student_count))
    }
}

/// Write an export file, creating its directory, and describe the outcome
pub(crate) fn write_export(file_path: &Path, content: &str, record_count: usize) -> ExportToPathResponse {
    let file_path_str = file_path.to_string_lossy().to_string();

    if let Some(parent_dir) = file_path.parent() {
        if let Err(e) = fs::create_dir_all(parent_dir) {
            error!("EXPORT: Failed to create export directory {:?}: {}", parent_dir, e);
            return ExportToPathResponse {
                success: false,
                message: format!("Failed to create export directory: {}", e),
                file_path: parent_dir.to_string_lossy().to_string(),
                record_count: 0,
            };
        }
    }

    match fs::write(file_path, content) {
        Ok(()) => {
            info!("EXPORT: Wrote {} records to {}", record_count, file_path_str);
            ExportToPathResponse {
                success: true,
                message: format!("File exported successfully to: {}", file_path_str),
                file_path: file_path_str,
                record_count,
            }
        }
        Err(e) => {
            error!("EXPORT: Failed to write export file to {:?}: {}", file_path, e);
            ExportToPathResponse {
                success: false,
                message: format!("Failed to write export file: {}", e),
                file_path: file_path_str,
                record_count: 0,
            }
        }
    }
}

/// Clean up a user-typed directory: quotes, escaped spaces, trailing
/// separators and a leading `~`
pub(crate) fn sanitize_path(path: &str) -> String {
    let mut cleaned = path.trim().to_string();

    if cleaned.len() >= 2
        && ((cleaned.starts_with('"') && cleaned.ends_with('"'))
            || (cleaned.starts_with('\'') && cleaned.ends_with('\'')))
    {
        cleaned = cleaned[1..cleaned.len() - 1].trim().to_string();
    }

    cleaned = cleaned.replace("\\ ", " ");

    while cleaned.len() > 1 && (cleaned.ends_with('/') || cleaned.ends_with('\\')) {
        cleaned.pop();
    }

    if cleaned.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            if cleaned == "~" {
                cleaned = home.to_string_lossy().to_string();
            } else if cleaned.starts_with("~/") || cleaned.starts_with("~\\") {
                cleaned = home.join(&cleaned[2..]).to_string_lossy().to_string();
            }
        }
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewStudent, ScoreUpdate};
    use crate::storage::csv::test_utils::TestEnvironment;
    use chrono::NaiveDate;
    use shared::HijriDate;

    struct Fixture {
        export: ExportService,
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
        let export = ExportService::new(calendar, roster.clone(), months.clone());
        Ok(Fixture { export, roster, months, env })
    }

    fn record(months: &MonthRepository, student_id: UserId, day: u32, update: ScoreUpdate) -> LedgerResult<()> {
        let mut container = months.load_month(HijriMonth::new(1447, 6));
        container.entry_mut(student_id, day, None).apply(update);
        months.save_month(&container)
    }

    #[test]
    fn test_export_month_with_filter() -> LedgerResult<()> {
        let f = fixture()?;
        let a = f.roster.add_teacher("Teacher A")?;
        let b = f.roster.add_teacher("Teacher B")?;
        let ahmad = f.roster.add_student(NewStudent {
            surah: "Al-Mulk".to_string(),
            age: Some(12),
            teacher_id: Some(a.id),
            ..NewStudent::named("Ahmad")
        })?;
        f.roster.add_student(NewStudent { teacher_id: Some(b.id), ..NewStudent::named("Omar") })?;
        let archived = f.roster.add_student(NewStudent { teacher_id: Some(a.id), ..NewStudent::named("Zaid") })?;
        f.roster.archive_student(archived.id)?;

        record(&f.months, ahmad.id, 1, ScoreUpdate::Hifz(Some(2.0)))?;
        record(&f.months, ahmad.id, 2, ScoreUpdate::AttendedOnly(true))?;

        let all = f.export.export_wide_csv(HijriMonth::new(1447, 6), None)?;
        assert_eq!(all.student_count, 2);
        assert_eq!(all.day_count, 29);
        assert_eq!(all.filename, "halaqa_1447-06.csv");

        let lines: Vec<&str> = all.csv_content.lines().collect();
        assert_eq!(lines[1].split(',').count(), 7 + 29 * 2);
        assert!(lines[3].starts_with("Ahmad,Al-Mulk,12,Teacher A,2,2,0,2,,,,"));
        assert!(lines[4].starts_with("Omar,,,Teacher B,0,0,0,,"));

        let only_b = f.export.export_wide_csv(HijriMonth::new(1447, 6), Some(b.id))?;
        assert_eq!(only_b.student_count, 1);
        Ok(())
    }

    #[test]
    fn test_export_to_path_writes_bom() -> LedgerResult<()> {
        let f = fixture()?;
        f.roster.add_student(NewStudent::named("Ahmad"))?;
        let out = f.env.base_path.join("exports");

        let response = f
            .export
            .export_to_path(HijriMonth::new(1447, 5), None, out.to_str())?;
        assert!(response.success);
        assert_eq!(response.record_count, 1);

        let written = fs::read_to_string(out.join("halaqa_1447-05.csv"))?;
        assert!(written.starts_with('\u{feff}'));
        Ok(())
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("  /path/to/dir  "), "/path/to/dir");
        assert_eq!(sanitize_path("\"/path/to/dir/\""), "/path/to/dir");
        assert_eq!(sanitize_path("/path\\ to\\ dir"), "/path to dir");
        assert_eq!(sanitize_path("/"), "/");
    }
}
