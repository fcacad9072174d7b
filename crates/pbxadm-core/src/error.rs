//! Error types for administrative operations

use std::path::PathBuf;
use thiserror::Error;

use crate::backup::BackupError;
use crate::commit::CommitError;
use crate::document::ParseError;
use crate::plan::PlanError;
use crate::reload::ReloadError;

/// Result type for administrative operations
pub type AdminResult<T> = Result<T, AdminError>;

/// Errors that can occur while reading or mutating configuration
#[derive(Debug, Error)]
pub enum AdminError {
    /// Bad input shape or policy violation; nothing was read or written
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity already exists
    #[error("{kind} '{name}' already exists")]
    Conflict { kind: String, name: String },

    /// Entity, stanza or directive absent
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Existing file does not conform to the expected format
    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Backup or commit failed
    #[error("I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// An explicitly requested reload failed
    #[error(transparent)]
    Reload(#[from] ReloadError),

    /// Settings file unreadable or invalid
    #[error("Settings error: {0}")]
    Settings(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdminError {
    /// Get the error code for CLI/API responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Reload(_) => "RELOAD_ERROR",
            Self::Settings(_) => "SETTINGS_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP-style status code for the web layer
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Parse { .. } => 422,
            Self::Reload(_) => 502,
            Self::Io { .. } | Self::Settings(_) | Self::Internal(_) => 500,
        }
    }

    pub(crate) fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub(crate) fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, err: ParseError) -> Self {
        Self::Parse {
            path: path.into(),
            line: err.line,
            message: err.message,
        }
    }
}

impl From<BackupError> for AdminError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Io { path, message } => Self::Io { path, message },
            BackupError::Commit(inner) => inner.into(),
            BackupError::UnrecognizedName(name) => {
                Self::Validation(format!("not a backup file: {name}"))
            }
        }
    }
}

impl From<CommitError> for AdminError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Io { path, message } => Self::Io { path, message },
            CommitError::Ownership { path, message } => Self::Io {
                path,
                message: format!("cannot apply ownership: {message}"),
            },
        }
    }
}

impl From<PlanError> for AdminError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::StanzaNotFound(name) => Self::not_found("stanza", name),
            PlanError::DirectiveNotFound { stanza, key } => {
                Self::not_found("directive", format!("{stanza}/{key}"))
            }
            PlanError::InvalidValue(message) => Self::Validation(message),
            PlanError::Overlap { .. } => Self::Internal(err.to_string()),
            PlanError::Result(parse) => Self::Internal(format!(
                "planned edit produced an unparseable document: {parse}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(AdminError::Validation("x".into()).http_status(), 400);
        assert_eq!(AdminError::conflict("extension", "1001").http_status(), 409);
        assert_eq!(AdminError::not_found("trunk", "voip").http_status(), 404);
        assert_eq!(
            AdminError::Parse {
                path: PathBuf::from("pjsip.conf"),
                line: 3,
                message: "bad".into()
            }
            .http_status(),
            422
        );
        assert_eq!(
            AdminError::Io {
                path: PathBuf::new(),
                message: "disk full".into()
            }
            .code(),
            "IO_ERROR"
        );
    }

    #[test]
    fn test_plan_error_mapping() {
        let err: AdminError = PlanError::DirectiveNotFound {
            stanza: "featuremap".into(),
            key: "parkcall".into(),
        }
        .into();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("featuremap/parkcall"));
    }
}
