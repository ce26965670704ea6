use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::project::Location;

/// Error types for the texseven core.
///
/// Nothing in the core is fatal: callers either get a negative result
/// (`NotFound`, `Ambiguous`) or the condition is folded into a [`Warning`]
/// and returned from a reindex.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use texseven::error::ProjectError;
///
/// let err = ProjectError::Cycle {
///     from: PathBuf::from("/p/b.tex"),
///     to: PathBuf::from("/p/a.tex"),
/// };
/// assert!(err.to_string().contains("include cycle"));
/// ```
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous key `{key}` defined in {} places", locations.len())]
    Ambiguous {
        key: String,
        locations: Vec<Location>,
    },

    #[error("malformed input in {}:{}: {message}", path.display(), line + 1)]
    MalformedInput {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("include cycle: {} includes its ancestor {}", from.display(), to.display())]
    Cycle { from: PathBuf, to: PathBuf },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProjectError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WarningKind {
    DuplicateLabel,
    DuplicateBibKey,
    MalformedInput,
    Unreadable,
    Cycle,
    NotFound,
}

/// A recoverable problem met while indexing. Aggregated into the reindex report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub path: PathBuf,
    /// 0-based line, when the problem is attached to one
    pub line: Option<usize>,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, path: &Path, line: Option<usize>, message: String) -> Self {
        Warning {
            kind,
            path: path.to_path_buf(),
            line,
            message,
        }
    }
}

impl From<&ProjectError> for Warning {
    fn from(err: &ProjectError) -> Self {
        match err {
            ProjectError::NotFound(what) => Warning {
                kind: WarningKind::NotFound,
                path: PathBuf::new(),
                line: None,
                message: what.clone(),
            },
            ProjectError::Ambiguous { locations, .. } => Warning {
                kind: WarningKind::DuplicateBibKey,
                path: locations
                    .first()
                    .map(|location| location.path.clone())
                    .unwrap_or_default(),
                line: locations.first().map(|location| location.line),
                message: err.to_string(),
            },
            ProjectError::MalformedInput {
                path,
                line,
                message,
            } => Warning {
                kind: WarningKind::MalformedInput,
                path: path.clone(),
                line: Some(*line),
                message: message.clone(),
            },
            ProjectError::Unreadable { path, source } => Warning {
                kind: WarningKind::Unreadable,
                path: path.clone(),
                line: None,
                message: format!("cannot read {}: {source}", path.display()),
            },
            ProjectError::Cycle { from, to } => Warning {
                kind: WarningKind::Cycle,
                path: from.clone(),
                line: None,
                message: format!("include cycle back to {}", to.display()),
            },
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.path.display(), line + 1, self.message),
            None => write!(f, "{}: {}", self.path.display(), self.message),
        }
    }
}
