//! Domain layer: the calendar, the roster of teachers and students, the daily
//! ledger, and the services that move data in and out of the store.

pub mod backup_service;
pub mod calendar;
pub mod error;
pub mod export_service;
pub mod import_service;
pub mod ledger_service;
pub mod models;
pub mod roster_service;

pub use backup_service::BackupService;
pub use calendar::{CalendarService, Clock, FixedClock, SystemClock};
pub use error::{LedgerError, LedgerResult};
pub use export_service::ExportService;
pub use import_service::{ImportService, SheetCheck};
pub use ledger_service::{DayRow, DayView, LedgerService, MonthView, StudentMonthSummary};
pub use roster_service::{RosterService, StudentUpdate};
