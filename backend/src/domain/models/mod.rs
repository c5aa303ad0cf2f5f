pub mod entry;
pub mod user;

pub use entry::{DailyEntry, MonthContainer, ScoreUpdate};
pub use user::{clean_text, normalize_name, NewStudent, Student, Teacher, User, UserId};
