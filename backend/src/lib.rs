//! # Halaqa Ledger Backend
//!
//! Direct, synchronous access to the ledger's services over a CSV data
//! directory. Every service shares one connection and one month cache, so a
//! write through one service is visible to the others immediately.

use log::info;
use std::sync::Arc;

pub mod codec;
pub mod domain;
pub mod storage;

pub use domain::{LedgerError, LedgerResult};
pub use storage::csv::CsvConnection;

use domain::calendar::Clock;
use domain::{BackupService, CalendarService, ExportService, ImportService, LedgerService, RosterService};
use storage::csv::{GlobalConfigRepository, GlobalConfigStorage, MonthRepository};

/// Main backend struct that orchestrates all services
#[derive(Clone)]
pub struct Backend {
    pub calendar_service: CalendarService,
    pub roster_service: RosterService,
    pub ledger_service: LedgerService,
    pub import_service: ImportService,
    pub export_service: ExportService,
    pub backup_service: BackupService,
    pub global_config: GlobalConfigRepository,
    connection: CsvConnection,
}

impl Backend {
    /// Open the default data directory with the system clock
    pub fn open_default() -> LedgerResult<Self> {
        Self::new(CsvConnection::new_default()?)
    }

    /// Create a backend over `connection`, reading the fallback date from the
    /// global config
    pub fn new(connection: CsvConnection) -> LedgerResult<Self> {
        let global_config = GlobalConfigRepository::new(connection.clone());
        let fallback = global_config.get_global_config()?.fallback_hijri_date;
        Ok(Self::assemble(
            connection,
            global_config,
            CalendarService::with_system_clock(fallback),
        ))
    }

    /// Create a backend whose calendar reads "today" from `clock`
    pub fn with_clock(connection: CsvConnection, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        let global_config = GlobalConfigRepository::new(connection.clone());
        let fallback = global_config.get_global_config()?.fallback_hijri_date;
        Ok(Self::assemble(connection, global_config, CalendarService::new(clock, fallback)))
    }

    fn assemble(connection: CsvConnection, global_config: GlobalConfigRepository, calendar: CalendarService) -> Self {
        info!("Opening ledger at {}", connection.base_directory().display());

        let roster_service = RosterService::new(connection.clone());
        let month_repository = MonthRepository::new(connection.clone());
        let ledger_service = LedgerService::new(calendar.clone(), roster_service.clone(), month_repository.clone());
        let import_service = ImportService::new(calendar.clone(), roster_service.clone(), month_repository.clone());
        let export_service = ExportService::new(calendar.clone(), roster_service.clone(), month_repository.clone());
        let backup_service = BackupService::new(
            connection.clone(),
            calendar.clone(),
            roster_service.clone(),
            month_repository,
        );

        Backend {
            calendar_service: calendar,
            roster_service,
            ledger_service,
            import_service,
            export_service,
            backup_service,
            global_config,
            connection,
        }
    }

    pub fn connection(&self) -> &CsvConnection {
        &self.connection
    }
}
