use chrono::{DateTime, Utc};
use csv::{Reader, Writer};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

use super::connection::CsvConnection;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{Teacher, UserId};
use crate::storage::traits::TeacherStorage;

pub const TEACHERS_HEADER: &str = "id,name,archived,created_at";

/// Row shape of teachers.csv
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsvTeacher {
    id: UserId,
    name: String,
    archived: bool,
    created_at: String,
}

impl CsvTeacher {
    fn into_domain(self) -> Teacher {
        Teacher {
            id: self.id,
            name: self.name,
            archived: self.archived,
            created_at: parse_timestamp(&self.created_at),
        }
    }

    fn from_domain(teacher: &Teacher) -> Self {
        Self {
            id: teacher.id,
            name: teacher.name.clone(),
            archived: teacher.archived,
            created_at: teacher.created_at.to_rfc3339(),
        }
    }
}

/// RFC 3339 timestamp, or the epoch when the cell is unreadable
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// CSV-based teacher repository backed by a single teachers.csv
#[derive(Clone)]
pub struct TeacherRepository {
    connection: CsvConnection,
}

impl TeacherRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self { connection }
    }

    fn read_teachers(&self) -> LedgerResult<Vec<Teacher>> {
        let path = self.connection.teachers_file_path();
        self.connection.ensure_file_exists(&path, TEACHERS_HEADER)?;

        let mut reader = Reader::from_reader(BufReader::new(File::open(&path)?));
        let mut teachers = Vec::new();
        for result in reader.deserialize::<CsvTeacher>() {
            match result {
                Ok(row) => teachers.push(row.into_domain()),
                Err(e) => warn!("Skipping unreadable row in teachers.csv: {}", e),
            }
        }
        teachers.sort_by_key(|t| t.id);
        Ok(teachers)
    }

    fn write_teachers(&self, teachers: &[Teacher]) -> LedgerResult<()> {
        let mut writer = Writer::from_writer(Vec::new());
        if teachers.is_empty() {
            writer.write_record(TEACHERS_HEADER.split(','))?;
        }
        for teacher in teachers {
            writer.serialize(CsvTeacher::from_domain(teacher))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let content = String::from_utf8(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        self.connection
            .write_atomic(&self.connection.teachers_file_path(), &content)?;
        debug!("Wrote {} teachers", teachers.len());
        Ok(())
    }
}

impl TeacherStorage for TeacherRepository {
    fn store_teacher(&self, teacher: &Teacher) -> LedgerResult<()> {
        let mut teachers = self.read_teachers()?;
        if teachers.iter().any(|t| t.id == teacher.id) {
            return Err(LedgerError::Validation(format!(
                "teacher id {} already exists",
                teacher.id
            )));
        }
        teachers.push(teacher.clone());
        self.write_teachers(&teachers)?;
        info!("Stored teacher {} ({})", teacher.name, teacher.id);
        Ok(())
    }

    fn get_teacher(&self, teacher_id: UserId) -> LedgerResult<Option<Teacher>> {
        Ok(self.read_teachers()?.into_iter().find(|t| t.id == teacher_id))
    }

    fn list_teachers(&self) -> LedgerResult<Vec<Teacher>> {
        self.read_teachers()
    }

    fn update_teacher(&self, teacher: &Teacher) -> LedgerResult<()> {
        let mut teachers = self.read_teachers()?;
        let slot = teachers
            .iter_mut()
            .find(|t| t.id == teacher.id)
            .ok_or_else(|| LedgerError::NotFound(format!("teacher {}", teacher.id)))?;
        *slot = teacher.clone();
        self.write_teachers(&teachers)
    }

    fn find_teacher_by_name(&self, name: &str) -> LedgerResult<Option<Teacher>> {
        Ok(self.read_teachers()?.into_iter().find(|t| t.name == name))
    }
}
