use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
    Restart,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unable to read {}: {details}", .path.display())]
    Discovery { path: PathBuf, details: String },

    #[error("Version not found: {version}")]
    VersionNotFound { version: String },

    #[error("Failed to switch to {version}: {details}")]
    SwitchFailed { version: String, details: String },
}

impl CatalogError {
    pub fn discovery(path: impl Into<PathBuf>, details: impl fmt::Display) -> Self {
        Self::Discovery {
            path: path.into(),
            details: details.to_string(),
        }
    }

    pub fn switch_failed(version: impl Into<String>, details: impl fmt::Display) -> Self {
        Self::SwitchFailed {
            version: version.into(),
            details: details.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Unable to {operation} {name}: {details}")]
    Operation {
        operation: Operation,
        name: String,
        details: String,
    },

    #[error("Unable to query state of {name}: {details}")]
    Query { name: String, details: String },
}

impl ProcessError {
    pub fn operation(
        operation: Operation,
        name: impl Into<String>,
        details: impl fmt::Display,
    ) -> Self {
        Self::Operation {
            operation,
            name: name.into(),
            details: details.to_string(),
        }
    }

    pub fn query(name: impl Into<String>, details: impl fmt::Display) -> Self {
        Self::Query {
            name: name.into(),
            details: details.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Operation { name, .. } | Self::Query { name, .. } => name,
        }
    }
}

/// Failure of one attempt of a user-triggered action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ActionError {
    pub fn unexpected(details: impl fmt::Display) -> Self {
        Self::Unexpected(details.to_string())
    }

    /// Whether the user may be offered another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Process(ProcessError::Operation { .. })
                | Self::Catalog(CatalogError::SwitchFailed { .. })
        )
    }

    /// Classified errors belong to the catalog or process taxonomy; anything
    /// else aborts the action.
    #[must_use]
    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Unexpected(_))
    }
}
