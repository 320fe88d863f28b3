use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by storage backends and units of work.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Observation with id {id} not found")]
    NotFound { id: i64 },

    #[error("Observation with id {id} already exists")]
    AlreadyExists { id: i64 },

    #[error("Version conflict on Observation {id}: expected version {expected}, found {actual}")]
    VersionConflict { id: i64, expected: i32, actual: i32 },

    #[error("Invalid resource: {message}")]
    InvalidResource { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Internal storage error: {message}")]
    Internal { message: String },
}

impl StorageError {
    pub fn not_found(id: i64) -> Self {
        Self::NotFound { id }
    }

    pub fn already_exists(id: i64) -> Self {
        Self::AlreadyExists { id }
    }

    pub fn version_conflict(id: i64, expected: i32, actual: i32) -> Self {
        Self::VersionConflict {
            id,
            expected,
            actual,
        }
    }

    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::AlreadyExists { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } | Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::InvalidResource { .. } => ErrorCategory::Validation,
            Self::Transaction { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Coarse buckets used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Validation,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Internal => "internal",
        };
        write!(f, "{name}")
    }
}
