use log::{debug, info, warn};
use shared::HijriMonth;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::{LedgerError, LedgerResult};

/// Environment variable that overrides the default data directory
pub const DATA_DIR_ENV: &str = "HALAQA_DATA_DIR";
const DEFAULT_DIR_NAME: &str = "Halaqa Ledger";

/// CsvConnection resolves file paths inside the data directory
///
/// ```text
/// <base>/
/// ├── global_config.yaml
/// ├── teachers.csv
/// ├── students.csv
/// └── months/<year>/<month>.csv
/// ```
#[derive(Debug, Clone)]
pub struct CsvConnection {
    base_directory: PathBuf,
}

impl CsvConnection {
    /// Create a new CSV connection with a base directory
    pub fn new<P: AsRef<Path>>(base_directory: P) -> LedgerResult<Self> {
        let base_path = base_directory.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
            info!("Created data directory: {}", base_path.display());
        }

        Ok(Self {
            base_directory: base_path,
        })
    }

    /// Create a connection in the default data directory: `$HALAQA_DATA_DIR`,
    /// else `~/Documents/Halaqa Ledger`, else `~/Halaqa Ledger`
    pub fn new_default() -> LedgerResult<Self> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                info!("Using data directory from {}: {}", DATA_DIR_ENV, dir);
                return Self::new(dir.trim());
            }
        }

        let parent = match dirs::document_dir() {
            Some(docs) => docs,
            None => {
                warn!("Documents directory not available, falling back to home directory");
                dirs::home_dir().ok_or_else(|| {
                    LedgerError::NotFound("home directory".to_string())
                })?
            }
        };

        Self::new(parent.join(DEFAULT_DIR_NAME))
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn teachers_file_path(&self) -> PathBuf {
        self.base_directory.join("teachers.csv")
    }

    pub fn students_file_path(&self) -> PathBuf {
        self.base_directory.join("students.csv")
    }

    pub fn global_config_path(&self) -> PathBuf {
        self.base_directory.join("global_config.yaml")
    }

    pub fn months_directory(&self) -> PathBuf {
        self.base_directory.join("months")
    }

    /// `months/<year>/<month>.csv`
    pub fn month_file_path(&self, month: HijriMonth) -> PathBuf {
        month_file_in(&self.months_directory(), month)
    }

    /// Ensure a CSV file exists, writing just the header if it does not
    pub fn ensure_file_exists(&self, path: &Path, header: &str) -> LedgerResult<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("{}\n", header))?;
        debug!("Created {}", path.display());
        Ok(())
    }

    /// Write a file through a temp file and rename
    pub fn write_atomic(&self, path: &Path, content: &str) -> LedgerResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Every month that has a file on disk, oldest first
    pub fn list_month_files(&self) -> LedgerResult<Vec<HijriMonth>> {
        scan_month_dir(&self.months_directory())
    }
}

/// Months laid out as `<dir>/<year>/<month>.csv`, oldest first. Anything else
/// in the tree is skipped.
pub fn scan_month_dir(months_dir: &Path) -> LedgerResult<Vec<HijriMonth>> {
    if !months_dir.exists() {
        return Ok(Vec::new());
    }

    let mut months = Vec::new();
    for year_entry in fs::read_dir(months_dir)? {
        let year_path = year_entry?.path();
        if !year_path.is_dir() {
            continue;
        }
        let year = match year_path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<i32>().ok())
        {
            Some(year) => year,
            None => {
                warn!("Skipping unexpected directory: {}", year_path.display());
                continue;
            }
        };

        for month_entry in fs::read_dir(&year_path)? {
            let month_path = month_entry?.path();
            if month_path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let month = month_path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|m| (1..=12).contains(m));
            match month {
                Some(month) => months.push(HijriMonth::new(year, month)),
                None => warn!("Skipping unexpected file: {}", month_path.display()),
            }
        }
    }

    months.sort();
    Ok(months)
}

/// `<dir>/<year>/<month>.csv`
pub fn month_file_in(months_dir: &Path, month: HijriMonth) -> PathBuf {
    months_dir
        .join(month.year.to_string())
        .join(format!("{}.csv", month.month))
}
