pub mod csv;
pub mod traits;

pub use traits::{EntryStorage, StudentStorage, TeacherStorage};
