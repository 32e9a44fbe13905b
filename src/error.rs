//! Error types.
//!
//! The library reports failures through [`LrmoeError`]. The `lrmoe` binary
//! converts those into an [`AppError`] carrying a process exit code.

use thiserror::Error;

/// Library error taxonomy.
#[derive(Error, Debug)]
pub enum LrmoeError {
    /// A parameter lies outside its family's valid domain.
    #[error("domain error in {family}: {message}")]
    Domain {
        family: &'static str,
        message: String,
    },

    /// Covariate / response / coefficient dimensions disagree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Gating coefficients and expert matrix disagree on the component count.
    #[error("model specification error: {0}")]
    ModelSpecification(String),

    /// A censoring/truncation interval violates `tl <= yl <= yu <= tu`.
    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LrmoeError {
    pub fn domain(family: &'static str, message: impl Into<String>) -> Self {
        Self::Domain {
            family,
            message: message.into(),
        }
    }

    /// Exit code used by the binary for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            LrmoeError::Domain { .. }
            | LrmoeError::ShapeMismatch(_)
            | LrmoeError::InvalidObservation(_) => 2,
            LrmoeError::ModelSpecification(_) => 3,
            LrmoeError::Io(_) | LrmoeError::Json(_) => 4,
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, LrmoeError>;

/// Error surfaced by the `lrmoe` binary.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<LrmoeError> for AppError {
    fn from(err: LrmoeError) -> Self {
        Self::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_map_to_exit_codes() {
        let err: AppError = LrmoeError::ModelSpecification("2 rows vs 3 columns".into()).into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("2 rows vs 3 columns"));

        let err: AppError = LrmoeError::domain("Poisson", "lambda must be > 0").into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("domain error in Poisson"));
    }
}
