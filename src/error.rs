use std::fmt;
use thiserror::Error;

/// Failure reported by the engine for a hash or verify call
///
/// `code` is the engine's return code. It is `None` when the engine faulted
/// during the call instead of returning a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Human-readable message from the engine's error table, if it could be resolved
    pub message: Option<String>,
    /// Engine return code
    pub code: Option<i32>,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.as_deref().unwrap_or("Argon2 engine error");
        match self.code {
            Some(code) => write!(f, "{} (code {})", message, code),
            None => write!(f, "{}", message),
        }
    }
}

/// Error types for the Argon2 bridge
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Argon2Error {
    /// The engine could not be loaded or initialized
    #[error("Engine load failed: {0}")]
    Load(String),

    /// The engine rejected or failed a hash/verify call
    #[error("{0}")]
    Failure(FailureRecord),

    /// Unexpected engine fault outside a compute call (e.g. memory exhausted)
    #[error("Engine fault: {0}")]
    Engine(String),

    /// Invalid parameter or configuration value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Argon2Error {
    /// Engine return code, when this is a compute failure carrying one
    pub fn code(&self) -> Option<i32> {
        match self {
            Argon2Error::Failure(record) => record.code,
            _ => None,
        }
    }
}

impl From<EngineFault> for Argon2Error {
    fn from(fault: EngineFault) -> Self {
        Argon2Error::Engine(fault.0)
    }
}

/// A fault raised by an engine primitive instead of a return code
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineFault(pub String);

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        EngineFault(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Argon2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let record = FailureRecord {
            message: Some("Salt is too short".to_string()),
            code: Some(-6),
        };
        assert_eq!(record.to_string(), "Salt is too short (code -6)");

        let fault = FailureRecord {
            message: Some("unreachable".to_string()),
            code: None,
        };
        assert_eq!(fault.to_string(), "unreachable");
    }

    #[test]
    fn test_code_only_on_failures() {
        let err = Argon2Error::Failure(FailureRecord {
            message: None,
            code: Some(-35),
        });
        assert_eq!(err.code(), Some(-35));
        assert_eq!(err.to_string(), "Argon2 engine error (code -35)");

        let err: Argon2Error = EngineFault::new("out of memory").into();
        assert!(matches!(err, Argon2Error::Engine(_)));
        assert_eq!(err.code(), None);
    }
}
