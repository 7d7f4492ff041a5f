//! Error types for SeoForge.
//!
//! Library crates use [`SeoforgeError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for startup diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SeoForge operations.
#[derive(Debug, thiserror::Error)]
pub enum SeoforgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The ranking-data API returned a non-success status or an unparseable payload.
    #[error("upstream fetch error: {0}")]
    UpstreamFetch(String),

    /// A declared stage input (data file or prior artifact) does not exist.
    #[error("unmet dependency `{dependency}`: {detail}")]
    UnmetDependency { dependency: String, detail: String },

    /// The content-generation capability failed for a stage.
    #[error("generation failed at stage `{stage}`: {message}")]
    Generation { stage: String, message: String },

    /// Markdown-to-document conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Workspace directory creation or removal failed.
    #[error("workspace error at {path:?}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Run ledger (database) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (bad identifier, empty input, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeoforgeError>;

impl SeoforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an unmet-dependency error.
    pub fn unmet(dependency: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnmetDependency {
            dependency: dependency.into(),
            detail: detail.into(),
        }
    }

    /// Create a generation error attributed to a stage.
    pub fn generation(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Generation {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a directory create/remove failure.
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}
