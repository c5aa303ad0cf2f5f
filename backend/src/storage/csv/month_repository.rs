//! # Month Repository
//!
//! Daily entries are partitioned by Hijri month, one long-form CSV per month
//! under `months/<year>/<month>.csv`. Loaded months are kept in an in-memory
//! cache keyed by (year, month); every save goes to disk and refreshes the cache.
//!
//! Loading never fails. A missing file is an empty month and an unreadable one
//! is logged and treated as empty, so a damaged month cannot block the others.

use log::{debug, info, warn};
use shared::{HijriDate, HijriMonth};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use super::connection::CsvConnection;
use crate::codec::long_form;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{DailyEntry, MonthContainer, UserId};
use crate::storage::traits::EntryStorage;

type MonthCache = Arc<Mutex<HashMap<HijriMonth, MonthContainer>>>;

#[derive(Clone)]
pub struct MonthRepository {
    connection: CsvConnection,
    cache: MonthCache,
}

impl MonthRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self {
            connection,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<HijriMonth, MonthContainer>> {
        // A panic while holding the lock cannot leave a container half-written
        // because containers are replaced whole.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Forget every cached month
    pub fn clear_cache(&self) {
        self.cache().clear();
        debug!("Month cache cleared");
    }

    fn read_from_disk(&self, month: HijriMonth) -> MonthContainer {
        let path = self.connection.month_file_path(month);
        if !path.exists() {
            return MonthContainer::new(month);
        }
        match fs::read_to_string(&path) {
            Ok(text) => {
                let container = long_form::decode_month(month, &text);
                debug!("Loaded month {} ({} entries)", month, container.len());
                container
            }
            Err(e) => {
                warn!("Could not read month {} at {}: {}", month, path.display(), e);
                MonthContainer::new(month)
            }
        }
    }

    fn write_to_disk(&self, container: &MonthContainer) -> LedgerResult<()> {
        let content = long_form::encode_month(container)?;
        let path = self.connection.month_file_path(container.month);
        self.connection.write_atomic(&path, &content)?;
        debug!("Saved month {} to {}", container.month, path.display());
        Ok(())
    }

    /// Insert without touching disk. Existing entries that carry signal win.
    fn insert_into(container: &mut MonthContainer, entry: &DailyEntry) -> LedgerResult<()> {
        let day = entry.date.day;
        if container
            .get(entry.student_id, day)
            .is_some_and(|existing| existing.has_signal())
        {
            return Err(LedgerError::UniqueConstraintViolation {
                student_id: entry.student_id,
                month: container.month,
                day,
            });
        }
        container.upsert(entry.clone());
        Ok(())
    }

    fn check_date(date: HijriDate) -> LedgerResult<()> {
        if !(1..=12).contains(&date.month) || !(1..=long_form::MAX_DAY).contains(&date.day) {
            return Err(LedgerError::Validation(format!("invalid Hijri date {}", date)));
        }
        Ok(())
    }
}

impl EntryStorage for MonthRepository {
    fn load_month(&self, month: HijriMonth) -> MonthContainer {
        if let Some(container) = self.cache().get(&month) {
            return container.clone();
        }
        let container = self.read_from_disk(month);
        self.cache().insert(month, container.clone());
        container
    }

    fn reload_month(&self, month: HijriMonth) -> MonthContainer {
        self.cache().remove(&month);
        self.load_month(month)
    }

    fn save_month(&self, container: &MonthContainer) -> LedgerResult<()> {
        self.write_to_disk(container)?;
        self.cache().insert(container.month, container.clone());
        Ok(())
    }

    fn get_entry(&self, student_id: UserId, date: HijriDate) -> Option<DailyEntry> {
        self.load_month(date.month_key())
            .get(student_id, date.day)
            .cloned()
    }

    fn insert_entry(&self, entry: &DailyEntry) -> LedgerResult<()> {
        Self::check_date(entry.date)?;
        let mut container = self.load_month(entry.date.month_key());
        Self::insert_into(&mut container, entry)?;
        self.save_month(&container)
    }

    fn insert_entries(
        &self,
        month: HijriMonth,
        entries: &[DailyEntry],
    ) -> LedgerResult<Vec<LedgerResult<()>>> {
        let mut container = self.load_month(month);
        let mut outcomes = Vec::with_capacity(entries.len());
        let mut inserted = 0;

        for entry in entries {
            let outcome = if entry.date.month_key() != month {
                Err(LedgerError::Validation(format!(
                    "entry dated {} does not belong to month {}",
                    entry.date, month
                )))
            } else {
                Self::check_date(entry.date).and_then(|_| Self::insert_into(&mut container, entry))
            };
            if outcome.is_ok() {
                inserted += 1;
            }
            outcomes.push(outcome);
        }

        if inserted > 0 {
            self.save_month(&container)?;
            info!("Inserted {} of {} entries into month {}", inserted, entries.len(), month);
        }
        Ok(outcomes)
    }

    fn upsert_entry(&self, entry: &DailyEntry) -> LedgerResult<()> {
        Self::check_date(entry.date)?;
        let mut container = self.load_month(entry.date.month_key());
        container.upsert(entry.clone());
        self.save_month(&container)
    }

    fn list_entries_by_student(&self, student_id: UserId) -> LedgerResult<Vec<DailyEntry>> {
        let mut entries = Vec::new();
        for month in self.list_months()? {
            if let Some(days) = self.load_month(month).student_days(student_id) {
                entries.extend(days.values().filter(|e| e.has_signal()).cloned());
            }
        }
        Ok(entries)
    }

    fn list_entries_by_date(&self, date: HijriDate) -> Vec<DailyEntry> {
        self.load_month(date.month_key())
            .signal_entries()
            .filter(|e| e.date.day == date.day)
            .cloned()
            .collect()
    }

    fn list_entries_in_range(&self, start: HijriDate, end: HijriDate) -> LedgerResult<Vec<DailyEntry>> {
        let (first, last) = (start.month_key(), end.month_key());
        let mut entries: Vec<DailyEntry> = Vec::new();
        for month in self.list_months()?.into_iter().filter(|m| *m >= first && *m <= last) {
            entries.extend(
                self.load_month(month)
                    .signal_entries()
                    .filter(|e| e.date >= start && e.date <= end)
                    .cloned(),
            );
        }
        entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.student_id.cmp(&b.student_id)));
        Ok(entries)
    }

    fn list_months(&self) -> LedgerResult<Vec<HijriMonth>> {
        self.connection.list_month_files()
    }
}
