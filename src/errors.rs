//! Error types for bean verification
//!
//! There is a single externally visible failure: a contract violation with a
//! human-readable message and an optional captured cause. Configuration
//! errors are raised during setup, before any value is generated.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

/// Error reported by adapter code: constructors, builders, getters and setters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum BeanError {
    /// The operation refused its input
    #[error("{0}")]
    Rejected(String),

    /// A required creator parameter was null or omitted
    #[error("required parameter `{0}` is missing")]
    MissingParameter(String),

    /// A value of the wrong type reached an accessor
    #[error("expected a value of type {expected} but got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The property cannot be read from this instance
    #[error("property `{0}` is not readable")]
    NotReadable(String),

    /// The adapter code panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

impl BeanError {
    pub fn rejected(message: impl Into<String>) -> Self {
        BeanError::Rejected(message.into())
    }
}

/// Failure of a verification run
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The bean breaks its contract
    #[error("{message}")]
    Violation {
        message: String,
        #[source]
        cause: Option<BeanError>,
    },

    /// The verification could not be set up
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl VerifyError {
    pub fn violation(message: impl Into<String>) -> Self {
        VerifyError::Violation {
            message: message.into(),
            cause: None,
        }
    }

    pub fn violation_caused_by(message: impl Into<String>, cause: BeanError) -> Self {
        VerifyError::Violation {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        VerifyError::Configuration(message.into())
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, VerifyError::Violation { .. })
    }

    /// Append context (such as the replay seed) to the message
    pub fn annotate(self, note: &str) -> Self {
        match self {
            VerifyError::Violation { message, cause } => VerifyError::Violation {
                message: format!("{} ({})", message, note),
                cause,
            },
            VerifyError::Configuration(message) => {
                VerifyError::Configuration(format!("{} ({})", message, note))
            }
        }
    }
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Run adapter code, converting a panic into `BeanError::Panicked`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> Result<R, BeanError>) -> Result<R, BeanError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(BeanError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_guarded_converts_panics() {
        let result: Result<(), BeanError> = guarded(|| panic!("boom"));
        assert_eq!(result, Err(BeanError::Panicked("boom".to_string())));

        let formatted: Result<(), BeanError> = guarded(|| panic!("code {}", 7));
        assert_eq!(formatted, Err(BeanError::Panicked("code 7".to_string())));
    }

    #[test]
    fn test_guarded_passes_through_results() {
        assert_eq!(guarded(|| Ok::<_, BeanError>(3)), Ok(3));
        assert_eq!(
            guarded(|| Err::<(), _>(BeanError::rejected("no"))),
            Err(BeanError::Rejected("no".to_string()))
        );
    }

    #[test]
    fn test_violation_chains_cause() {
        let error = VerifyError::violation_caused_by("Person.name", BeanError::rejected("null"));
        assert!(error.is_violation());
        assert_eq!(error.to_string(), "Person.name");
        assert_eq!(error.source().map(|s| s.to_string()), Some("null".to_string()));

        let annotated = error.annotate("seed 9");
        assert_eq!(annotated.to_string(), "Person.name (seed 9)");
    }
}
