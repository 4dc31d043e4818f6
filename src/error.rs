//! Typed errors surfaced by the orchestration core.
//!
//! Every error carries a stable [`ErrorKind`] so callers (the CLI, tests,
//! other embedders) can branch on it programmatically instead of matching on
//! message text, plus an optional boxed cause for display/debugging.

use std::fmt;

pub type Result<T, E = WarpError> = std::result::Result<T, E>;

/// Stable, programmatically matchable error categories. See `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigNotFound,
    ConfigInvalid,
    TsconfigError,
    Validation,
    Compile,
    DistMissing,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::TsconfigError => "TSCONFIG_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Compile => "COMPILE_ERROR",
            Self::DistMissing => "DIST_MISSING",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct WarpError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl WarpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause: None }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), cause: Some(Box::new(cause)) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn config_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigNotFound, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn tsconfig(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TsconfigError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn compile(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile, message)
    }

    pub fn dist_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DistMissing, message)
    }

    /// Builds the `COMPILE_ERROR` raised when a worker process dies, per spec §7:
    /// names the target and hints at the `--parallel`-free fallback.
    pub fn worker_crashed(target_name: &str, cause: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Compile,
            format!(
                "while compiling target \"{target_name}\": worker crashed ({cause}); \
                 try running without --parallel"
            ),
        )
    }
}

impl From<std::io::Error> for WarpError {
    fn from(e: std::io::Error) -> Self {
        Self::with_cause(ErrorKind::Validation, "I/O error", e)
    }
}

impl From<serde_json::Error> for WarpError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_cause(ErrorKind::ConfigInvalid, "invalid JSON", e)
    }
}

impl From<serde_yaml::Error> for WarpError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::with_cause(ErrorKind::ConfigInvalid, "invalid YAML", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_spec_identifiers() {
        assert_eq!(ErrorKind::ConfigNotFound.to_string(), "CONFIG_NOT_FOUND");
        assert_eq!(ErrorKind::DistMissing.to_string(), "DIST_MISSING");
    }

    #[test]
    fn worker_crashed_names_target_and_hints_fallback() {
        let err = WarpError::worker_crashed("browser", "exit code 1");
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(err.message.contains("\"browser\""));
        assert!(err.message.contains("--parallel"));
    }
}
