pub mod assessment;
pub mod consultation;
pub mod enums;
pub mod question;
pub mod symptom;

pub use assessment::*;
pub use consultation::*;
pub use enums::*;
pub use question::*;
pub use symptom::*;

/// Input validation failures for request records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("{field} {reason}")]
    Field { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Field {
            field,
            reason: reason.into(),
        }
    }

    pub fn field_name(&self) -> Option<&'static str> {
        match self {
            Self::Field { field, .. } => Some(field),
            Self::InvalidEnum { .. } => None,
        }
    }
}
