//! Error types for reposync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while loading or resolving configuration.
///
/// A `ConfigError` is always fatal to a run: it is raised before any target
/// repository is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a config or targets file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the file path and the line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A path glob failed to compile.
    #[error("invalid glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("max_concurrent_repos must be at least 1 (got {0})")]
    InvalidConcurrency(i64),

    #[error("invalid work branch '{name}': {reason}")]
    InvalidWorkBranch { name: String, reason: &'static str },

    /// A message template failed to compile or to render against sample data.
    #[error("invalid {name} template: {source}")]
    InvalidTemplate {
        name: &'static str,
        #[source]
        source: tera::Error,
    },

    /// A repository identifier is not of the form `owner/name`.
    #[error("invalid repository identifier '{0}'; expected owner/name")]
    InvalidRepository(String),

    #[error("repository '{0}' is listed more than once")]
    DuplicateRepository(String),

    /// The `api` section holds values the gateway cannot work with.
    #[error("invalid api settings: {0}")]
    InvalidApi(String),
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
