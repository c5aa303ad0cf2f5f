//! # CSV Global Config Repository
//!
//! A single YAML file `global_config.yaml` at the root of the data directory.
//!
//! ```yaml
//! data_format_version: "1.0"
//! fallback_hijri_date:
//!   year: 1447
//!   month: 5
//!   day: 1
//! created_at: "2025-10-23T19:30:00+00:00"
//! updated_at: "2025-10-23T19:35:00+00:00"
//! ```
//!
//! The file is created with defaults on first read and written atomically.

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::HijriDate;
use std::fs;

use super::connection::CsvConnection;
use crate::domain::error::{LedgerError, LedgerResult};

pub const DATA_FORMAT_VERSION: &str = "1.0";

fn default_fallback_date() -> HijriDate {
    HijriDate::new(1447, 5, 1)
}

/// Global configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Data format version for future migrations
    pub data_format_version: String,
    /// Date used when the clock yields an implausible Hijri date
    #[serde(default = "default_fallback_date")]
    pub fallback_hijri_date: HijriDate,
    pub created_at: String,
    pub updated_at: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            data_format_version: DATA_FORMAT_VERSION.to_string(),
            fallback_hijri_date: default_fallback_date(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Storage trait for global configuration operations
pub trait GlobalConfigStorage: Send + Sync {
    /// Get the global configuration, creating the default file if needed
    fn get_global_config(&self) -> LedgerResult<GlobalConfig>;

    /// Change the fallback date used by the calendar
    fn set_fallback_hijri_date(&self, date: HijriDate) -> LedgerResult<()>;

    /// Update the global configuration
    fn update_global_config(&self, config: &GlobalConfig) -> LedgerResult<()>;
}

/// Global config repository using a single YAML file
#[derive(Clone)]
pub struct GlobalConfigRepository {
    connection: CsvConnection,
}

impl GlobalConfigRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self { connection }
    }

    fn load_or_create_global_config(&self) -> LedgerResult<GlobalConfig> {
        let config_path = self.connection.global_config_path();

        if config_path.exists() {
            let yaml_content = fs::read_to_string(&config_path)?;
            let config: GlobalConfig = serde_yaml::from_str(&yaml_content)
                .map_err(|e| LedgerError::Parse(format!("global_config.yaml: {}", e)))?;
            debug!("Loaded global config from {:?}", config_path);
            Ok(config)
        } else {
            let config = GlobalConfig::default();
            self.save_global_config(&config)?;
            info!("Created default global config at {:?}", config_path);
            Ok(config)
        }
    }

    fn save_global_config(&self, config: &GlobalConfig) -> LedgerResult<()> {
        let config_path = self.connection.global_config_path();
        let yaml_content = serde_yaml::to_string(config)?;
        self.connection.write_atomic(&config_path, &yaml_content)?;
        debug!("Saved global config to {:?}", config_path);
        Ok(())
    }

    fn validate_date(date: HijriDate) -> LedgerResult<()> {
        if !(1..=12).contains(&date.month) || !(1..=30).contains(&date.day) {
            return Err(LedgerError::Validation(format!(
                "fallback date {} is not a Hijri date",
                date
            )));
        }
        Ok(())
    }
}

impl GlobalConfigStorage for GlobalConfigRepository {
    fn get_global_config(&self) -> LedgerResult<GlobalConfig> {
        self.load_or_create_global_config()
    }

    fn set_fallback_hijri_date(&self, date: HijriDate) -> LedgerResult<()> {
        Self::validate_date(date)?;
        let mut config = self.load_or_create_global_config()?;
        config.fallback_hijri_date = date;
        config.updated_at = Utc::now().to_rfc3339();
        self.save_global_config(&config)?;
        info!("Set fallback Hijri date to {}", date);
        Ok(())
    }

    fn update_global_config(&self, config: &GlobalConfig) -> LedgerResult<()> {
        Self::validate_date(config.fallback_hijri_date)?;
        let mut updated_config = config.clone();
        updated_config.updated_at = Utc::now().to_rfc3339();
        self.save_global_config(&updated_config)?;
        info!("Updated global config");
        Ok(())
    }
}
