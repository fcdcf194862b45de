use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeFenceError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Source directory not found: {path}")]
    SourceNotFound { path: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Permission denied: {path}")]
    Permission { path: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("No files matched the selected extensions")]
    NothingToCombine { searched_extensions: Vec<String> },

    #[error("Output directory is not empty: {path}")]
    OutputDirectoryExists { path: String },

    #[error("Cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Malformed block at line {line}: {reason}")]
    MalformedBlock { line: usize, reason: String },

    #[error("Unsafe path {path}: {reason}")]
    UnsafePath { path: String, reason: String },

    #[error("Cannot write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Scope of a failure that skips one file or block without aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Read,
    MalformedBlock,
    UnsafePath,
    Write,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Read => "read error",
            FailureKind::MalformedBlock => "malformed block",
            FailureKind::UnsafePath => "unsafe path",
            FailureKind::Write => "write error",
        };
        f.write_str(label)
    }
}

/// A file- or block-scoped failure recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub relative_path: Option<String>,
    pub line: Option<usize>,
    pub reason: String,
}

impl Failure {
    pub fn from_error(error: &CodeFenceError, fallback: FailureKind, line: Option<usize>) -> Self {
        let kind = error.failure_kind().unwrap_or(fallback);

        let (relative_path, line, reason) = match error {
            CodeFenceError::Read { path, reason }
            | CodeFenceError::UnsafePath { path, reason }
            | CodeFenceError::Write { path, reason } => {
                (Some(path.clone()), line, reason.clone())
            }
            CodeFenceError::MalformedBlock { line, reason } => (None, Some(*line), reason.clone()),
            other => (None, line, other.to_string()),
        };

        Self {
            kind,
            relative_path,
            line,
            reason,
        }
    }

    pub fn location(&self) -> String {
        match (&self.relative_path, self.line) {
            (Some(path), Some(line)) => format!("{} (line {})", path, line),
            (Some(path), None) => path.clone(),
            (None, Some(line)) => format!("line {}", line),
            (None, None) => "<unknown>".to_string(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.location(), self.reason, self.kind)
    }
}

impl CodeFenceError {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            CodeFenceError::Read { .. } => Some(FailureKind::Read),
            CodeFenceError::MalformedBlock { .. } => Some(FailureKind::MalformedBlock),
            CodeFenceError::UnsafePath { .. } => Some(FailureKind::UnsafePath),
            CodeFenceError::Write { .. } => Some(FailureKind::Write),
            _ => None,
        }
    }

    pub fn unsafe_path<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        CodeFenceError::UnsafePath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for CodeFenceError {
    fn user_message(&self) -> String {
        match self {
            CodeFenceError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            CodeFenceError::SourceNotFound { path } => {
                format!("Source directory not found: {}", path)
            }
            CodeFenceError::NothingToCombine { searched_extensions } => {
                format!(
                    "No files found with extensions: {}",
                    searched_extensions.join(", ")
                )
            }
            CodeFenceError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            CodeFenceError::Cancelled => "Operation was cancelled by user".to_string(),
            CodeFenceError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            CodeFenceError::OutputDirectoryExists { path } => {
                format!("Output directory already contains files: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            CodeFenceError::Config { .. } => Some(
                "Check your configuration file syntax, or regenerate it with `codefence config init`.".to_string()
            ),
            CodeFenceError::SourceNotFound { .. } => Some(
                "Pass an existing directory as the combine source.".to_string()
            ),
            CodeFenceError::NothingToCombine { .. } => Some(
                "Select other extensions with --ext (e.g., --ext .py,.rs) or relax the --exclude rules.".to_string()
            ),
            CodeFenceError::Permission { .. } => Some(
                "Ensure you have the necessary read/write permissions for the target directory.".to_string()
            ),
            CodeFenceError::OutputDirectoryExists { .. } => Some(
                "Choose an empty output directory, or use --force to overwrite existing files.".to_string()
            ),
            CodeFenceError::UnsafePath { .. } => Some(
                "Block paths must be relative and stay inside the output directory.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CodeFenceError {
    fn from(error: toml::de::Error) -> Self {
        CodeFenceError::Config {
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for CodeFenceError {
    fn from(error: toml::ser::Error) -> Self {
        CodeFenceError::Config {
            message: format!("Failed to serialize config: {}", error),
        }
    }
}

impl From<walkdir::Error> for CodeFenceError {
    fn from(error: walkdir::Error) -> Self {
        let path = error
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        match error.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => CodeFenceError::Permission { path },
            _ => CodeFenceError::Read {
                path,
                reason: error.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CodeFenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = CodeFenceError::SourceNotFound {
            path: "missing/dir".to_string(),
        };
        assert!(error.user_message().contains("Source directory not found"));
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_failure_kind_mapping() {
        let error = CodeFenceError::unsafe_path("../evil.txt", "parent directory segment");
        assert_eq!(error.failure_kind(), Some(FailureKind::UnsafePath));
        assert_eq!(CodeFenceError::Cancelled.failure_kind(), None);
    }

    #[test]
    fn test_failure_from_scoped_error() {
        let error = CodeFenceError::unsafe_path("../evil.txt", "parent directory segment");
        let failure = Failure::from_error(&error, FailureKind::Write, Some(12));

        assert_eq!(failure.kind, FailureKind::UnsafePath);
        assert_eq!(failure.relative_path.as_deref(), Some("../evil.txt"));
        assert_eq!(failure.line, Some(12));
        assert_eq!(failure.reason, "parent directory segment");
    }

    #[test]
    fn test_failure_from_malformed_block_uses_block_line() {
        let error = CodeFenceError::MalformedBlock {
            line: 7,
            reason: "missing path comment".to_string(),
        };
        let failure = Failure::from_error(&error, FailureKind::Write, None);

        assert_eq!(failure.kind, FailureKind::MalformedBlock);
        assert_eq!(failure.relative_path, None);
        assert_eq!(failure.location(), "line 7");
    }

    #[test]
    fn test_io_error_falls_back_to_given_kind() {
        let error = CodeFenceError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        ));
        let failure = Failure::from_error(&error, FailureKind::Write, None);
        assert_eq!(failure.kind, FailureKind::Write);
        assert!(failure.reason.contains("disk full"));
    }
}
