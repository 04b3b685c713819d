//! CLI-specific error types and exit code mapping

use certconform_core::error::CertconformError;
use certconform_suite::ConformanceError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to the process exit status.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// At least one planned backend would run no cases at all.
    #[error("no cases registered for backend(s): {}", .backends.join(", "))]
    EmptyPlan { backends: Vec<String> },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from certconform-core.
    #[error("{0}")]
    Core(#[from] CertconformError),

    /// Suite setup error.
    #[error("{0}")]
    Conformance(#[from] ConformanceError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration error                      |
    /// | 5    | A backend would register no cases        |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(CertconformError::Config(_)) => 2,
            Self::Conformance(ConformanceError::Configuration { .. }) => 2,
            Self::EmptyPlan { .. } => 5,
            Self::Io(_) | Self::Core(CertconformError::Io(_)) => 10,
            Self::Command(_) | Self::JsonSerialize(_) | Self::Core(_) | Self::Conformance(_) => 1,
        }
    }
}
