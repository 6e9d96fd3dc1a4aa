use std::fmt;

/// Command failure printed as `Error: ...` before exiting with status 1
#[derive(Debug)]
pub struct CliError(pub String);

impl CliError {
    /// Prefix an underlying error with what the command was doing.
    pub fn context(what: impl fmt::Display, err: impl fmt::Display) -> Self {
        CliError(format!("{what}: {err}"))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError(s.to_string())
    }
}

impl From<chronicle_memory::ChronicleError> for CliError {
    fn from(e: chronicle_memory::ChronicleError) -> Self {
        CliError(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError(format!("IO error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;
