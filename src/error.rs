//! Error types for loading operator configuration.

use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building the operator configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Project profiles are not valid YAML
    #[error("Invalid project profiles: {0}")]
    Profiles(#[from] serde_yaml_ng::Error),

    /// A project template pattern does not compile
    #[error("Invalid namePattern in profile '{profile}': {source}")]
    Pattern {
        profile: String,
        #[source]
        source: regex::Error,
    },

    /// Malformed `argocd.clientOpts`
    #[error("clientOpts invalid at '{0}'")]
    ClientOpts(String),
}
