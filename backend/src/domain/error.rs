//! Typed failures returned by the ledger.
//!
//! Every operation exposed to a consumer returns either its success value or
//! one of these. None of them is fatal to the process.

use shared::HijriMonth;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Referential conflict: {0}")]
    ReferentialConflict(String),

    #[error("Month {month} is outside the edit window")]
    EditWindowClosed { month: HijriMonth },

    #[error("Entry already exists for student {student_id} on {month}-{day:02}")]
    UniqueConstraintViolation {
        student_id: u64,
        month: HijriMonth,
        day: u32,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

impl From<csv::Error> for LedgerError {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            match e.into_kind() {
                csv::ErrorKind::Io(io) => LedgerError::Io(io),
                other => LedgerError::Serialization(format!("{:?}", other)),
            }
        } else {
            LedgerError::Serialization(e.to_string())
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            LedgerError::Parse(e.to_string())
        } else {
            LedgerError::Serialization(e.to_string())
        }
    }
}

impl From<serde_yaml::Error> for LedgerError {
    fn from(e: serde_yaml::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl LedgerError {
    /// Message shown to the user, in Arabic
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Io(_) => "تعذرت قراءة الملف أو كتابته، تأكد من المسار وحاول مرة أخرى".to_string(),
            LedgerError::Parse(reason) => format!("ملف CSV غير صالح: {}", reason),
            LedgerError::ReferentialConflict(reason) => {
                format!("لا يمكن إتمام العملية: {}", reason)
            }
            LedgerError::EditWindowClosed { month } => format!(
                "الشهر {} للعرض فقط، يمكن التعديل على الشهر الحالي والسابق والتالي فقط",
                month
            ),
            LedgerError::UniqueConstraintViolation { day, .. } => {
                format!("يوجد سجل لهذا الطالب في اليوم {} مسبقاً", day)
            }
            LedgerError::NotFound(what) => format!("لم يتم العثور على {}", what),
            LedgerError::Validation(reason) => format!("بيانات غير صحيحة: {}", reason),
            LedgerError::Serialization(_) => "تعذر حفظ البيانات، حاول مرة أخرى".to_string(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, LedgerError::UniqueConstraintViolation { .. })
    }
}
