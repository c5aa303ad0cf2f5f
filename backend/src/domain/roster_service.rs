use chrono::Utc;
use log::{info, warn};

use crate::domain::error::{LedgerError, LedgerResult};
use crate::domain::models::{clean_text, normalize_name, NewStudent, Student, Teacher, User, UserId};
use crate::storage::csv::{CsvConnection, StudentRepository, TeacherRepository};
use crate::storage::traits::{StudentStorage, TeacherStorage};

/// Optional field changes for a student
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub surah: Option<String>,
    pub age: Option<u32>,
}

/// Service for managing the students and teachers of a halaqa
#[derive(Clone)]
pub struct RosterService {
    teacher_repository: TeacherRepository,
    student_repository: StudentRepository,
}

impl RosterService {
    pub fn new(connection: CsvConnection) -> Self {
        Self {
            teacher_repository: TeacherRepository::new(connection.clone()),
            student_repository: StudentRepository::new(connection),
        }
    }

    /// Next id from the sequence shared by both roles
    fn next_id(&self) -> LedgerResult<UserId> {
        let max_teacher = self.teacher_repository.list_teachers()?.iter().map(|t| t.id).max();
        let max_student = self.student_repository.list_students()?.iter().map(|s| s.id).max();
        Ok(max_teacher.max(max_student).unwrap_or(0) + 1)
    }

    fn require_name(name: &str, role: &str) -> LedgerResult<String> {
        normalize_name(name).ok_or_else(|| LedgerError::Validation(format!("{} name cannot be empty", role)))
    }

    fn require_teacher(&self, teacher_id: UserId) -> LedgerResult<Teacher> {
        self.teacher_repository
            .get_teacher(teacher_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("teacher {}", teacher_id)))
    }

    fn require_student(&self, student_id: UserId) -> LedgerResult<Student> {
        self.student_repository
            .get_student(student_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("student {}", student_id)))
    }

    /// Add a teacher
    pub fn add_teacher(&self, name: &str) -> LedgerResult<Teacher> {
        let teacher = Teacher {
            id: self.next_id()?,
            name: Self::require_name(name, "Teacher")?,
            archived: false,
            created_at: Utc::now(),
        };
        self.teacher_repository.store_teacher(&teacher)?;
        info!("Added teacher: {} with ID: {}", teacher.name, teacher.id);
        Ok(teacher)
    }

    /// Add a student. The teacher, when given, must exist.
    pub fn add_student(&self, new_student: NewStudent) -> LedgerResult<Student> {
        let name = Self::require_name(&new_student.name, "Student")?;
        if let Some(teacher_id) = new_student.teacher_id {
            self.require_teacher(teacher_id)?;
        }

        let student = Student {
            id: self.next_id()?,
            name,
            surah: clean_text(&new_student.surah),
            age: new_student.age,
            birth_year: new_student.birth_year,
            teacher_id: new_student.teacher_id,
            archived: false,
            created_at: Utc::now(),
        };
        self.student_repository.store_student(&student)?;
        info!("Added student: {} with ID: {}", student.name, student.id);
        Ok(student)
    }

    /// Independent inserts; a failure does not undo earlier ones
    pub fn bulk_add_students(&self, students: Vec<NewStudent>) -> Vec<LedgerResult<Student>> {
        let total = students.len();
        let results: Vec<_> = students.into_iter().map(|s| self.add_student(s)).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("Bulk add: {} of {} students failed", failed, total);
        } else {
            info!("Bulk add: {} students added", total);
        }
        results
    }

    pub fn update_student(&self, student_id: UserId, update: StudentUpdate) -> LedgerResult<Student> {
        let mut student = self.require_student(student_id)?;
        if let Some(name) = update.name {
            student.name = Self::require_name(&name, "Student")?;
        }
        if let Some(surah) = update.surah {
            student.surah = clean_text(&surah);
        }
        if let Some(age) = update.age {
            student.age = Some(age);
        }
        self.student_repository.update_student(&student)?;
        info!("Updated student: {} with ID: {}", student.name, student.id);
        Ok(student)
    }

    pub fn update_teacher(&self, teacher_id: UserId, name: Option<&str>) -> LedgerResult<Teacher> {
        let mut teacher = self.require_teacher(teacher_id)?;
        if let Some(name) = name {
            teacher.name = Self::require_name(name, "Teacher")?;
        }
        self.teacher_repository.update_teacher(&teacher)?;
        info!("Updated teacher: {} with ID: {}", teacher.name, teacher.id);
        Ok(teacher)
    }

    pub fn get_student(&self, student_id: UserId) -> LedgerResult<Option<Student>> {
        self.student_repository.get_student(student_id)
    }

    pub fn get_teacher(&self, teacher_id: UserId) -> LedgerResult<Option<Teacher>> {
        self.teacher_repository.get_teacher(teacher_id)
    }

    /// Look a user up by bare id in either role
    pub fn get_user(&self, user_id: UserId) -> LedgerResult<Option<User>> {
        if let Some(student) = self.student_repository.get_student(user_id)? {
            return Ok(Some(User::Student(student)));
        }
        Ok(self.teacher_repository.get_teacher(user_id)?.map(User::Teacher))
    }

    pub fn list_students(&self) -> LedgerResult<Vec<Student>> {
        self.student_repository.list_students()
    }

    pub fn list_teachers(&self) -> LedgerResult<Vec<Teacher>> {
        self.teacher_repository.list_teachers()
    }

    pub fn active_students(&self) -> LedgerResult<Vec<Student>> {
        Ok(self.list_students()?.into_iter().filter(|s| !s.archived).collect())
    }

    pub fn archived_students(&self) -> LedgerResult<Vec<Student>> {
        Ok(self.list_students()?.into_iter().filter(|s| s.archived).collect())
    }

    pub fn active_teachers(&self) -> LedgerResult<Vec<Teacher>> {
        Ok(self.list_teachers()?.into_iter().filter(|t| !t.archived).collect())
    }

    pub fn archived_teachers(&self) -> LedgerResult<Vec<Teacher>> {
        Ok(self.list_teachers()?.into_iter().filter(|t| t.archived).collect())
    }

    pub fn students_by_teacher(&self, teacher_id: UserId) -> LedgerResult<Vec<Student>> {
        self.student_repository.list_students_by_teacher(teacher_id)
    }

    pub fn find_teacher_by_name(&self, name: &str) -> LedgerResult<Option<Teacher>> {
        self.teacher_repository.find_teacher_by_name(&clean_text(name))
    }

    pub fn find_student(&self, name: &str, teacher_id: Option<UserId>) -> LedgerResult<Option<Student>> {
        self.student_repository.find_student(&clean_text(name), teacher_id)
    }

    /// Reuse the teacher with this exact name or add one.
    /// The flag is true when a teacher was added.
    pub fn find_or_add_teacher(&self, name: &str) -> LedgerResult<(Teacher, bool)> {
        let name = Self::require_name(name, "Teacher")?;
        match self.teacher_repository.find_teacher_by_name(&name)? {
            Some(teacher) => Ok((teacher, false)),
            None => Ok((self.add_teacher(&name)?, true)),
        }
    }

    /// Reuse the student with this exact (name, teacher) or add one.
    /// The flag is true when a student was added.
    pub fn find_or_add_student(&self, new_student: NewStudent) -> LedgerResult<(Student, bool)> {
        let name = Self::require_name(&new_student.name, "Student")?;
        match self.student_repository.find_student(&name, new_student.teacher_id)? {
            Some(student) => Ok((student, false)),
            None => Ok((self.add_student(new_student)?, true)),
        }
    }

    pub fn archive_student(&self, student_id: UserId) -> LedgerResult<Student> {
        self.set_student_archived(student_id, true)
    }

    pub fn unarchive_student(&self, student_id: UserId) -> LedgerResult<Student> {
        self.set_student_archived(student_id, false)
    }

    /// Archive a teacher. Fails while any non-archived student is assigned to it.
    pub fn archive_teacher(&self, teacher_id: UserId) -> LedgerResult<Teacher> {
        self.set_teacher_archived(teacher_id, true)
    }

    pub fn unarchive_teacher(&self, teacher_id: UserId) -> LedgerResult<Teacher> {
        self.set_teacher_archived(teacher_id, false)
    }

    fn set_student_archived(&self, student_id: UserId, archived: bool) -> LedgerResult<Student> {
        let mut student = self.require_student(student_id)?;
        student.archived = archived;
        self.student_repository.update_student(&student)?;
        info!(
            "{} student: {} ({})",
            if archived { "Archived" } else { "Restored" },
            student.name,
            student.id
        );
        Ok(student)
    }

    fn set_teacher_archived(&self, teacher_id: UserId, archived: bool) -> LedgerResult<Teacher> {
        let mut teacher = self.require_teacher(teacher_id)?;
        if archived {
            let active = self
                .student_repository
                .list_students_by_teacher(teacher_id)?
                .into_iter()
                .filter(|s| !s.archived)
                .count();
            if active > 0 {
                warn!(
                    "Refusing to archive teacher {} ({}): {} active students",
                    teacher.name, teacher.id, active
                );
                return Err(LedgerError::ReferentialConflict(format!(
                    "teacher {} still has {} active students; transfer them first",
                    teacher.name, active
                )));
            }
        }
        teacher.archived = archived;
        self.teacher_repository.update_teacher(&teacher)?;
        info!(
            "{} teacher: {} ({})",
            if archived { "Archived" } else { "Restored" },
            teacher.name,
            teacher.id
        );
        Ok(teacher)
    }

    /// Flip the archived flag of a user in either role
    pub fn toggle_archive(&self, user_id: UserId) -> LedgerResult<User> {
        match self.get_user(user_id)? {
            Some(User::Student(s)) => Ok(User::Student(self.set_student_archived(s.id, !s.archived)?)),
            Some(User::Teacher(t)) => Ok(User::Teacher(self.set_teacher_archived(t.id, !t.archived)?)),
            None => Err(LedgerError::NotFound(format!("user {}", user_id))),
        }
    }

    /// Move every student of one teacher to another with a single write.
    /// Historical entries keep the teacher they were recorded under.
    pub fn transfer_students(&self, from_teacher_id: UserId, to_teacher_id: UserId) -> LedgerResult<usize> {
        self.require_teacher(from_teacher_id)?;
        let target = self.require_teacher(to_teacher_id)?;
        if target.archived {
            return Err(LedgerError::ReferentialConflict(format!(
                "teacher {} is archived",
                target.name
            )));
        }
        if from_teacher_id == to_teacher_id {
            return Ok(0);
        }

        let moved: Vec<Student> = self
            .student_repository
            .list_students_by_teacher(from_teacher_id)?
            .into_iter()
            .map(|mut s| {
                s.teacher_id = Some(to_teacher_id);
                s
            })
            .collect();
        self.student_repository.update_students(&moved)?;
        info!(
            "Transferred {} students from teacher {} to {}",
            moved.len(),
            from_teacher_id,
            to_teacher_id
        );
        Ok(moved.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::test_utils::TestEnvironment;

    fn setup() -> LedgerResult<(RosterService, TestEnvironment)> {
        let env = TestEnvironment::new()?;
        Ok((RosterService::new(env.connection.clone()), env))
    }

    #[test]
    fn test_ids_are_shared_across_roles() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let teacher = roster.add_teacher("Teacher A")?;
        let student = roster.add_student(NewStudent {
            teacher_id: Some(teacher.id),
            ..NewStudent::named("Ahmad")
        })?;
        let second = roster.add_teacher("Teacher B")?;
        assert_eq!((teacher.id, student.id, second.id), (1, 2, 3));
        assert!(matches!(roster.get_user(2)?, Some(User::Student(_))));
        Ok(())
    }

    #[test]
    fn test_empty_name_rejected() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        assert!(matches!(roster.add_teacher("  "), Err(LedgerError::Validation(_))));
        assert!(matches!(roster.add_student(NewStudent::named("")), Err(LedgerError::Validation(_))));
        Ok(())
    }

    #[test]
    fn test_unknown_teacher_rejected() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let result = roster.add_student(NewStudent {
            teacher_id: Some(42),
            ..NewStudent::named("Ahmad")
        });
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_archive_guard_and_transfer() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let a = roster.add_teacher("Teacher A")?;
        let b = roster.add_teacher("Teacher B")?;
        roster.add_student(NewStudent { teacher_id: Some(a.id), ..NewStudent::named("Ahmad") })?;
        roster.add_student(NewStudent { teacher_id: Some(a.id), ..NewStudent::named("Omar") })?;

        assert!(matches!(roster.archive_teacher(a.id), Err(LedgerError::ReferentialConflict(_))));
        assert!(!roster.get_teacher(a.id)?.map(|t| t.archived).unwrap_or(true));

        assert_eq!(roster.transfer_students(a.id, b.id)?, 2);
        assert!(roster.students_by_teacher(a.id)?.is_empty());
        assert!(roster.archive_teacher(a.id)?.archived);
        Ok(())
    }

    #[test]
    fn test_archived_students_do_not_block_teacher_archive() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let a = roster.add_teacher("Teacher A")?;
        let s = roster.add_student(NewStudent { teacher_id: Some(a.id), ..NewStudent::named("Ahmad") })?;
        roster.archive_student(s.id)?;
        assert!(roster.archive_teacher(a.id).is_ok());
        Ok(())
    }

    #[test]
    fn test_toggle_archive_is_reversible() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let s = roster.add_student(NewStudent::named("Ahmad"))?;

        assert!(roster.toggle_archive(s.id)?.is_archived());
        assert_eq!(roster.archived_students()?.len(), 1);
        assert!(roster.active_students()?.is_empty());

        assert!(!roster.toggle_archive(s.id)?.is_archived());
        assert_eq!(roster.active_students()?.len(), 1);
        assert!(matches!(roster.toggle_archive(99), Err(LedgerError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_bulk_add_is_partial_success() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let results = roster.bulk_add_students(vec![
            NewStudent::named("Ahmad"),
            NewStudent::named(" "),
            NewStudent::named("Omar"),
        ]);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(roster.list_students()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_update_student_and_teacher() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let t = roster.add_teacher("Teacher A")?;
        let s = roster.add_student(NewStudent::named("Ahmad"))?;

        let updated = roster.update_student(
            s.id,
            StudentUpdate {
                surah: Some(" الملك ".to_string()),
                age: Some(11),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.name, "Ahmad");
        assert_eq!(updated.surah, "الملك");
        assert_eq!(updated.age, Some(11));

        assert_eq!(roster.update_teacher(t.id, Some("Teacher Z"))?.name, "Teacher Z");
        assert!(roster.update_teacher(t.id, Some("")).is_err());
        Ok(())
    }

    #[test]
    fn test_find_or_add_reuses_by_natural_key() -> LedgerResult<()> {
        let (roster, _env) = setup()?;
        let (t, created) = roster.find_or_add_teacher("Teacher A")?;
        assert!(created);
        let (again, created) = roster.find_or_add_teacher("Teacher A")?;
        assert!(!created);
        assert_eq!(t.id, again.id);

        let new = NewStudent { teacher_id: Some(t.id), ..NewStudent::named("Ahmad") };
        let (s, created) = roster.find_or_add_student(new.clone())?;
        assert!(created);
        let (s2, created) = roster.find_or_add_student(new)?;
        assert!(!created);
        assert_eq!(s.id, s2.id);
        Ok(())
    }
}
