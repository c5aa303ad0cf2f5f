//! `halaqa`: command-line access to the ledger's data directory.
//!
//! Usage:
//!   halaqa [--data-dir DIR] <COMMAND>
//!
//! Examples:
//!   # Import a month sheet, month taken from the filename
//!   halaqa import-wide halaqa_1447-05.csv
//!
//!   # Export one teacher's students for a month
//!   halaqa export-wide --year 1447 --month 5 --teacher 3 --out ~/Desktop

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use halaqa_backend::codec;
use halaqa_backend::domain::calendar::month_name;
use halaqa_backend::domain::models::{NewStudent, ScoreUpdate};
use halaqa_backend::storage::csv::GlobalConfigStorage;
use halaqa_backend::{Backend, CsvConnection};
use shared::{BackupSnapshot, HijriDate, HijriMonth, ImportReport};

#[derive(Parser, Debug)]
#[command(name = "halaqa")]
#[command(about = "Hifz and murajaah ledger for Qur'an memorization circles")]
struct Args {
    /// Data directory (defaults to HALAQA_DATA_DIR, then Documents/Halaqa Ledger)
    #[arg(long, value_name = "PATH", env = "HALAQA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print today's Hijri date and the editable months
    Today,
    /// Import a wide-form month sheet
    ImportWide {
        file: PathBuf,
        #[arg(long, requires = "month")]
        year: Option<i32>,
        #[arg(long, requires = "year")]
        month: Option<u32>,
    },
    /// Export a month as a wide-form sheet
    ExportWide {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// Only students currently assigned to this teacher id
        #[arg(long)]
        teacher: Option<u64>,
        #[arg(long, value_name = "DIR")]
        out: Option<String>,
    },
    /// Write a full JSON backup
    Backup {
        #[arg(long, value_name = "DIR")]
        out: Option<String>,
    },
    /// Restore a JSON backup, merging with existing data
    Restore {
        file: PathBuf,
        /// Clear all teachers, students and entries first
        #[arg(long)]
        replace: bool,
    },
    /// Import the older users file and month directory
    ImportLegacy { users: PathBuf, months_dir: PathBuf },
    /// Check the two header rows of every sheet under a directory
    CheckWide { dir: PathBuf },
    /// Print each student's totals for a month
    Month {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        teacher: Option<u64>,
    },
    /// Print the roster for one day with that day's entries
    Day {
        /// Hijri date as YYYY-MM-DD
        date: String,
        #[arg(long)]
        teacher: Option<u64>,
    },
    /// Record one score or attendance mark
    Record {
        #[arg(long)]
        student: u64,
        /// Hijri date as YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long, conflicts_with_all = ["attended", "muragaa"])]
        hifz: Option<f64>,
        #[arg(long, conflicts_with = "attended")]
        muragaa: Option<f64>,
        #[arg(long)]
        attended: bool,
    },
    /// Add a teacher
    AddTeacher { name: String },
    /// Add a student
    AddStudent {
        name: String,
        #[arg(long)]
        teacher: Option<u64>,
        #[arg(long, default_value = "")]
        surah: String,
        #[arg(long)]
        age: Option<u32>,
    },
    /// List teachers and students with their ids
    Roster,
    /// Archive a student or teacher, or restore an archived one
    Archive { id: u64 },
    /// Move every student of one teacher to another
    Transfer {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
    },
    /// Set the date used when the clock cannot be trusted
    SetFallback {
        /// Hijri date as YYYY-MM-DD
        date: String,
    },
}

fn parse_hijri_date(raw: &str) -> Result<HijriDate> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    if parts.len() != 3 {
        bail!("expected a Hijri date as YYYY-MM-DD, got {:?}", raw);
    }
    Ok(HijriDate::new(
        parts[0].parse().context("invalid year")?,
        parts[1].parse().context("invalid month")?,
        parts[2].parse().context("invalid day")?,
    ))
}

fn print_report(report: &ImportReport) {
    println!(
        "Teachers: {} added, {} reused",
        report.teachers_inserted, report.teachers_reused
    );
    println!(
        "Students: {} added, {} reused",
        report.students_inserted, report.students_reused
    );
    println!(
        "Entries:  {} added, {} skipped",
        report.entries_inserted, report.entries_skipped
    );
    for warning in &report.header_warnings {
        println!("  header: {}", warning);
    }
    for skipped in &report.reasons {
        let date = skipped.date.map(|d| d.to_string()).unwrap_or_default();
        println!(
            "  skipped {} ({}) {}: {:?}",
            skipped.student_name, skipped.teacher_name, date, skipped.reason
        );
    }
}

fn run(backend: &Backend, command: Command) -> Result<()> {
    match command {
        Command::Today => {
            let today = backend.calendar_service.current_date_response();
            println!("{}", today.formatted_date);
            if today.is_fallback {
                println!("(fallback date)");
            }
            let window: Vec<String> = today.editable_months.iter().map(|m| m.to_string()).collect();
            println!("Editable months: {}", window.join(", "));
        }
        Command::ImportWide { file, year, month } => {
            let month = year.zip(month).map(|(y, m)| HijriMonth::new(y, m));
            let report = backend
                .import_service
                .import_wide_file(&file, month)
                .with_context(|| format!("importing {}", file.display()))?;
            print_report(&report);
        }
        Command::ExportWide { year, month, teacher, out } => {
            let response = backend
                .export_service
                .export_to_path(HijriMonth::new(year, month), teacher, out.as_deref())?;
            if !response.success {
                bail!(response.message);
            }
            println!("{} ({} students)", response.message, response.record_count);
        }
        Command::Backup { out } => {
            let response = backend.backup_service.export_backup_to_path(out.as_deref())?;
            if !response.success {
                bail!(response.message);
            }
            println!("{} ({} records)", response.message, response.record_count);
        }
        Command::Restore { file, replace } => {
            let json = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let snapshot: BackupSnapshot = serde_json::from_str(&json).context("backup file is not a ledger snapshot")?;
            let report = if replace {
                backend.backup_service.restore_replacing(&snapshot)?
            } else {
                backend.backup_service.import_backup(&snapshot)?
            };
            print_report(&report);
        }
        Command::ImportLegacy { users, months_dir } => {
            let report = backend.import_service.import_legacy_files(&users, &months_dir)?;
            print_report(&report);
        }
        Command::CheckWide { dir } => {
            let checks = backend.import_service.check_wide_directory(&dir)?;
            for check in &checks {
                if check.is_consistent() {
                    println!("ok    {}", check.path.display());
                } else {
                    println!("FAIL  {}", check.path.display());
                    for warning in &check.warnings {
                        println!("      {}", warning);
                    }
                }
            }
            let failed = checks.iter().filter(|c| !c.is_consistent()).count();
            if failed > 0 {
                bail!("{} of {} sheets have header problems", failed, checks.len());
            }
        }
        Command::Month { year, month, teacher } => {
            let view = backend.ledger_service.month_view(year, month, teacher)?;
            println!(
                "{} {} ({} days){}",
                month_name(month),
                year,
                view.days_in_month,
                if view.editable { "" } else { " [read only]" }
            );
            for summary in &view.students {
                println!(
                    "{:>5}  {:<30} days {:>2}  hifz {:>6}  murajaah {:>6}",
                    summary.student.id,
                    summary.student.name,
                    summary.attendance_days,
                    summary.hifz_total,
                    summary.muragaa_total
                );
            }
        }
        Command::Day { date, teacher } => {
            let view = backend.ledger_service.day_view(parse_hijri_date(&date)?, teacher)?;
            println!("{}{}", view.date, if view.editable { "" } else { " [read only]" });
            for row in &view.rows {
                let cells = match &row.entry {
                    Some(e) if e.attended_only => "attended".to_string(),
                    Some(e) => format!(
                        "hifz {:>4}  murajaah {:>4}",
                        codec::format_score(e.hifz),
                        codec::format_score(e.muragaa)
                    ),
                    None => "-".to_string(),
                };
                println!("{:>5}  {:<30} {}", row.student.id, row.student.name, cells);
            }
        }
        Command::Record { student, date, hifz, muragaa, attended } => {
            let date = parse_hijri_date(&date)?;
            let update = match (hifz, muragaa, attended) {
                (Some(v), _, _) => ScoreUpdate::Hifz(Some(v)),
                (_, Some(v), _) => ScoreUpdate::Muragaa(Some(v)),
                (_, _, true) => ScoreUpdate::AttendedOnly(true),
                _ => bail!("one of --hifz, --muragaa or --attended is required"),
            };
            match backend.ledger_service.record_score(student, date, update) {
                Ok(Some(entry)) => println!("Recorded {:?}", entry),
                Ok(None) => println!("Entry cleared"),
                Err(e) => bail!(e.user_message()),
            }
        }
        Command::AddTeacher { name } => {
            let teacher = backend.roster_service.add_teacher(&name)?;
            println!("Added teacher {} ({})", teacher.name, teacher.id);
        }
        Command::AddStudent { name, teacher, surah, age } => {
            let student = backend.roster_service.add_student(NewStudent {
                surah,
                age,
                teacher_id: teacher,
                ..NewStudent::named(&name)
            })?;
            println!("Added student {} ({})", student.name, student.id);
        }
        Command::Roster => {
            for teacher in backend.roster_service.list_teachers()? {
                let marker = if teacher.archived { " [archived]" } else { "" };
                println!("{:>5}  {}{}", teacher.id, teacher.name, marker);
                for student in backend.roster_service.students_by_teacher(teacher.id)? {
                    let marker = if student.archived { " [archived]" } else { "" };
                    println!("{:>9}  {}{}", student.id, student.name, marker);
                }
            }
            for student in backend.roster_service.list_students()? {
                if student.teacher_id.is_none() {
                    println!("{:>5}  {} (no teacher)", student.id, student.name);
                }
            }
        }
        Command::Archive { id } => match backend.roster_service.toggle_archive(id) {
            Ok(user) => {
                let state = if user.is_archived() { "archived" } else { "active" };
                println!("{} ({}) is now {}", user.name(), user.id(), state);
            }
            Err(e) => bail!(e.user_message()),
        },
        Command::Transfer { from, to } => {
            let moved = backend.roster_service.transfer_students(from, to)?;
            println!("Moved {} students", moved);
        }
        Command::SetFallback { date } => {
            let date = parse_hijri_date(&date)?;
            backend.global_config.set_fallback_hijri_date(date)?;
            println!("Fallback date set to {}", date);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let backend = match args.data_dir {
        Some(dir) => {
            let connection = CsvConnection::new(&dir).with_context(|| format!("opening {}", dir.display()))?;
            Backend::new(connection)?
        }
        None => Backend::open_default().context("opening the default data directory")?,
    };
    info!("Data directory: {}", backend.connection().base_directory().display());

    run(&backend, args.command)
}
