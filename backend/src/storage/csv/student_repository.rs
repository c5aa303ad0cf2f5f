use csv::{Reader, Writer};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;

use super::connection::CsvConnection;
use super::teacher_repository::parse_timestamp;
use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{Student, UserId};
use crate::storage::traits::StudentStorage;

pub const STUDENTS_HEADER: &str = "id,name,surah,age,birth_year,teacher_id,archived,created_at";

/// Row shape of students.csv. Optional columns are empty cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsvStudent {
    id: UserId,
    name: String,
    #[serde(default)]
    surah: String,
    age: Option<u32>,
    birth_year: Option<u32>,
    teacher_id: Option<UserId>,
    archived: bool,
    created_at: String,
}

impl CsvStudent {
    fn into_domain(self) -> Student {
        Student {
            id: self.id,
            name: self.name,
            surah: self.surah,
            age: self.age,
            birth_year: self.birth_year,
            teacher_id: self.teacher_id,
            archived: self.archived,
            created_at: parse_timestamp(&self.created_at),
        }
    }

    fn from_domain(student: &Student) -> Self {
        Self {
            id: student.id,
            name: student.name.clone(),
            surah: student.surah.clone(),
            age: student.age,
            birth_year: student.birth_year,
            teacher_id: student.teacher_id,
            archived: student.archived,
            created_at: student.created_at.to_rfc3339(),
        }
    }
}

/// CSV-based student repository backed by a single students.csv
#[derive(Clone)]
pub struct StudentRepository {
    connection: CsvConnection,
}

impl StudentRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self { connection }
    }

    fn read_students(&self) -> LedgerResult<Vec<Student>> {
        let path = self.connection.students_file_path();
        self.connection.ensure_file_exists(&path, STUDENTS_HEADER)?;

        let mut reader = Reader::from_reader(BufReader::new(File::open(&path)?));
        let mut students = Vec::new();
        for result in reader.deserialize::<CsvStudent>() {
            match result {
                Ok(row) => students.push(row.into_domain()),
                Err(e) => warn!("Skipping unreadable row in students.csv: {}", e),
            }
        }
        students.sort_by_key(|s| s.id);
        Ok(students)
    }

    fn write_students(&self, students: &[Student]) -> LedgerResult<()> {
        let mut writer = Writer::from_writer(Vec::new());
        if students.is_empty() {
            writer.write_record(STUDENTS_HEADER.split(','))?;
        }
        for student in students {
            writer.serialize(CsvStudent::from_domain(student))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let content = String::from_utf8(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        self.connection
            .write_atomic(&self.connection.students_file_path(), &content)?;
        debug!("Wrote {} students", students.len());
        Ok(())
    }
}

impl StudentStorage for StudentRepository {
    fn store_student(&self, student: &Student) -> LedgerResult<()> {
        let mut students = self.read_students()?;
        if students.iter().any(|s| s.id == student.id) {
            return Err(LedgerError::Validation(format!(
                "student id {} already exists",
                student.id
            )));
        }
        students.push(student.clone());
        self.write_students(&students)?;
        info!("Stored student {} ({})", student.name, student.id);
        Ok(())
    }

    fn get_student(&self, student_id: UserId) -> LedgerResult<Option<Student>> {
        Ok(self.read_students()?.into_iter().find(|s| s.id == student_id))
    }

    fn list_students(&self) -> LedgerResult<Vec<Student>> {
        self.read_students()
    }

    fn update_student(&self, student: &Student) -> LedgerResult<()> {
        self.update_students(std::slice::from_ref(student))
    }

    fn update_students(&self, updated: &[Student]) -> LedgerResult<()> {
        if updated.is_empty() {
            return Ok(());
        }
        let mut by_id: HashMap<UserId, &Student> = updated.iter().map(|s| (s.id, s)).collect();
        let mut students = self.read_students()?;
        for slot in students.iter_mut() {
            if let Some(student) = by_id.remove(&slot.id) {
                *slot = student.clone();
            }
        }
        if let Some(missing) = by_id.keys().min() {
            return Err(LedgerError::NotFound(format!("student {}", missing)));
        }
        self.write_students(&students)
    }

    fn list_students_by_teacher(&self, teacher_id: UserId) -> LedgerResult<Vec<Student>> {
        Ok(self
            .read_students()?
            .into_iter()
            .filter(|s| s.teacher_id == Some(teacher_id))
            .collect())
    }

    fn find_student(&self, name: &str, teacher_id: Option<UserId>) -> LedgerResult<Option<Student>> {
        Ok(self
            .read_students()?
            .into_iter()
            .find(|s| s.name == name && s.teacher_id == teacher_id))
    }
}
