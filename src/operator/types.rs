//! Operator Types
//!
//! Error taxonomy and shared helpers for the AppSource operator

use super::resolver::ResolveError;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Operator errors
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Argo CD API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(#[from] ResolveError),

    #[error("Project creation failed: {0}")]
    ProjectCreation(Box<OperatorError>),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl OperatorError {
    /// Whether requeueing the same resource can fix this error without
    /// an operator or user changing something first.
    pub fn is_transient(&self) -> bool {
        match self {
            OperatorError::InvalidSpec(_) | OperatorError::Config(_) => false,
            OperatorError::ProjectCreation(inner) => inner.is_transient(),
            _ => true,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            OperatorError::Conflict(_) => true,
            OperatorError::Remote { status, .. } => *status == 409,
            OperatorError::KubeError(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }
}

/// Result type for operator operations
pub type Result<T, E = OperatorError> = std::result::Result<T, E>;

/// Runs `fut` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OperatorError::Cancelled),
        res = fut => res,
    }
}
