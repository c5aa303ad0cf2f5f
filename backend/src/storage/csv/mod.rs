//! # CSV Storage Module
//!
//! File-based storage for the ledger. Roster collections are single CSV files
//! and daily entries are partitioned into one long-form CSV per Hijri month.
//! Every write goes through a temp file and a rename.
//!
//! ```csv
//! student_id,teacher_id,day,hifz,murajaah
//! 3,1,5,2,1
//! 4,1,5,,
//! ```

pub mod connection;
pub mod global_config_repository;
pub mod month_repository;
pub mod student_repository;
pub mod teacher_repository;

#[cfg(test)]
pub mod test_utils;

pub use connection::CsvConnection;
pub use global_config_repository::{GlobalConfig, GlobalConfigRepository, GlobalConfigStorage};
pub use month_repository::MonthRepository;
pub use student_repository::StudentRepository;
pub use teacher_repository::TeacherRepository;
