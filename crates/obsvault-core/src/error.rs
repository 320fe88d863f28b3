use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the core model and the resource mapper.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Resource type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Malformed dateTime: {0}")]
    MalformedDateTime(String),

    #[error("Invalid logical id: {0}")]
    InvalidId(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn malformed_date_time(message: impl Into<String>) -> Self {
        Self::MalformedDateTime(message.into())
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource(message.into())
    }

    /// True when the caller supplied bad input, as opposed to an internal fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch { .. }
                | Self::MalformedDateTime(_)
                | Self::InvalidId(_)
                | Self::InvalidResource(_)
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TypeMismatch { .. } | Self::InvalidResource(_) => ErrorCategory::Validation,
            Self::MalformedDateTime(_) | Self::InvalidId(_) => ErrorCategory::Parsing,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }
}

/// Coarse error buckets used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Parsing,
    Serialization,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Parsing => "parsing",
            Self::Serialization => "serialization",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_message() {
        let err = CoreError::type_mismatch("Observation", "Patient");
        assert_eq!(
            err.to_string(),
            "Resource type mismatch: expected Observation, found Patient"
        );
        assert!(err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn categories_display() {
        assert_eq!(ErrorCategory::Parsing.to_string(), "parsing");
        assert_eq!(
            CoreError::malformed_date_time("x").category(),
            ErrorCategory::Parsing
        );
    }

    #[test]
    fn serialization_errors_are_not_client_errors() {
        let err: CoreError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(!err.is_client_error());
    }
}
