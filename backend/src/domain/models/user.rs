//! Domain models for the people in a halaqa.
//!
//! Ids are store-assigned positive integers drawn from one sequence shared by
//! students and teachers, so a bare id identifies a user regardless of role.
//! Students point at their teacher through `teacher_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: UserId,
    pub name: String,
    /// Last memorized surah (the "memorizing up to" marker)
    pub surah: String,
    pub age: Option<u32>,
    pub birth_year: Option<u32>,
    pub teacher_id: Option<UserId>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: UserId,
    pub name: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for a student that has not been stored yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub surah: String,
    pub age: Option<u32>,
    pub birth_year: Option<u32>,
    pub teacher_id: Option<UserId>,
}

impl NewStudent {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Either role, for operations addressed by bare id
#[derive(Debug, Clone, PartialEq)]
pub enum User {
    Student(Student),
    Teacher(Teacher),
}

impl User {
    pub fn id(&self) -> UserId {
        match self {
            User::Student(s) => s.id,
            User::Teacher(t) => t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            User::Student(s) => &s.name,
            User::Teacher(t) => &t.name,
        }
    }

    pub fn is_archived(&self) -> bool {
        match self {
            User::Student(s) => s.archived,
            User::Teacher(t) => t.archived,
        }
    }
}

/// Trim free text and drop double quotes, which the sheet splitter discards
pub fn clean_text(value: &str) -> String {
    value.replace('"', "").trim().to_string()
}

/// Clean a display name and reject it if nothing is left
pub fn normalize_name(name: &str) -> Option<String> {
    let cleaned = clean_text(name);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
