use crate::model::{EntityKind, Id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A field is missing, empty, too long or out of range.
    Validation {
        field: &'static str,
        reason: String,
    },
    NotFound(EntityKind, Id),
    /// The referenced parent row does not exist. Carries the parent's kind and id.
    InvalidParent(EntityKind, Id),
    DuplicatePlate(String),
    GarageFull(Id),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Short, stable label for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::NotFound(..) => "not_found",
            EngineError::InvalidParent(..) => "invalid_parent",
            EngineError::DuplicatePlate(_) => "duplicate_plate",
            EngineError::GarageFull(_) => "garage_full",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            EngineError::NotFound(kind, id) => write!(f, "{kind} {id} not found"),
            EngineError::InvalidParent(kind, id) => {
                write!(f, "referenced {kind} {id} does not exist")
            }
            EngineError::DuplicatePlate(plate) => {
                write!(f, "license plate {plate} is already registered")
            }
            EngineError::GarageFull(id) => write!(f, "garage {id} is full"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
