//! Test utilities module for automatic cleanup and consistent test infrastructure
//!
//! The data directory lives in a `TempDir` that is removed when the environment
//! is dropped, even if the test panics.

use chrono::Utc;
use tempfile::TempDir;

use super::connection::CsvConnection;
use super::student_repository::StudentRepository;
use super::teacher_repository::TeacherRepository;
use crate::domain::error::LedgerResult;
use crate::domain::models::{Student, Teacher, UserId};
use crate::storage::traits::{StudentStorage, TeacherStorage};

/// Temporary data directory plus a connection into it
pub struct TestEnvironment {
    pub connection: CsvConnection,
    /// Base directory path for manual inspection if needed
    pub base_path: std::path::PathBuf,
    _temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> LedgerResult<Self> {
        let temp_dir = TempDir::new()?;
        let connection = CsvConnection::new(temp_dir.path())?;
        Ok(Self {
            connection,
            base_path: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
        })
    }
}

/// Roster repositories over one test environment
pub struct TestHelper {
    pub env: TestEnvironment,
    pub teacher_repo: TeacherRepository,
    pub student_repo: StudentRepository,
}

impl TestHelper {
    pub fn new() -> LedgerResult<Self> {
        let env = TestEnvironment::new()?;
        Ok(Self {
            teacher_repo: TeacherRepository::new(env.connection.clone()),
            student_repo: StudentRepository::new(env.connection.clone()),
            env,
        })
    }

    pub fn create_test_teacher(&self, id: UserId, name: &str) -> LedgerResult<Teacher> {
        let teacher = Teacher {
            id,
            name: name.to_string(),
            archived: false,
            created_at: Utc::now(),
        };
        self.teacher_repo.store_teacher(&teacher)?;
        Ok(teacher)
    }

    pub fn create_test_student(
        &self,
        id: UserId,
        name: &str,
        teacher_id: Option<UserId>,
    ) -> LedgerResult<Student> {
        let student = Student {
            id,
            name: name.to_string(),
            surah: String::new(),
            age: None,
            birth_year: None,
            teacher_id,
            archived: false,
            created_at: Utc::now(),
        };
        self.student_repo.store_student(&student)?;
        Ok(student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_cleanup() -> LedgerResult<()> {
        let base_path;
        {
            let env = TestEnvironment::new()?;
            base_path = env.base_path.clone();
            assert!(base_path.exists());
        }
        assert!(!base_path.exists());
        Ok(())
    }

    #[test]
    fn test_repository_helper() -> LedgerResult<()> {
        let helper = TestHelper::new()?;
        let teacher = helper.create_test_teacher(1, "Teacher A")?;
        helper.create_test_student(2, "Ahmad", Some(teacher.id))?;

        assert_eq!(helper.student_repo.list_students_by_teacher(1)?.len(), 1);
        assert!(helper.teacher_repo.get_teacher(1)?.is_some());
        Ok(())
    }
}
