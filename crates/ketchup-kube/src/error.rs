//! Error types for ketchup-kube

use std::path::PathBuf;
use std::time::Duration;

use ketchup_core::{ArchiveError, CoreError, OutputError, WriteError};
use thiserror::Error;

/// Result type for ketchup-kube operations
pub type Result<T> = std::result::Result<T, CollectError>;

/// A single list request failed
///
/// Always recoverable: the failure is recorded and the run goes on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The credential may not list this type
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// The API server does not serve this type
    #[error("not served: {message}")]
    NotServed { message: String },

    #[error("timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    /// Aborted because the run deadline passed
    #[error("cancelled: run deadline exceeded")]
    Cancelled,

    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Short reason used in the summary
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Forbidden { .. } => "forbidden",
            FetchError::NotServed { .. } => "notServed",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Cancelled => "cancelled",
            FetchError::Api { .. } => "api",
            FetchError::Transport(_) => "transport",
            FetchError::Decode(_) => "decode",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<kube::Error> for FetchError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) if resp.code == 403 => FetchError::Forbidden {
                message: resp.message,
            },
            kube::Error::Api(resp) if resp.code == 404 => FetchError::NotServed {
                message: resp.message,
            },
            kube::Error::Api(resp) => FetchError::Api {
                code: resp.code,
                message: resp.message,
            },
            kube::Error::SerdeError(e) => FetchError::Decode(e.to_string()),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

/// The cluster session could not be established
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot read kubeconfig {path}: {message}")]
    Kubeconfig { path: PathBuf, message: String },

    #[error("cannot build Kubernetes client: {0}")]
    Client(String),

    #[error("API server is not reachable: {0}")]
    Unreachable(String),
}

/// Fatal errors of a collection run
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollectError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Output(#[from] OutputError),

    /// The collection summary could not be written
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Config(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_kube_error_mapping() {
        assert!(matches!(FetchError::from(api_error(403)), FetchError::Forbidden { .. }));
        assert!(matches!(FetchError::from(api_error(404)), FetchError::NotServed { .. }));
        assert!(matches!(
            FetchError::from(api_error(500)),
            FetchError::Api { code: 500, .. }
        ));
    }

    #[test]
    fn test_reasons() {
        assert_eq!(FetchError::Cancelled.reason(), "cancelled");
        assert!(FetchError::Cancelled.is_cancelled());
        let timeout = FetchError::Timeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.reason(), "timeout");
        assert_eq!(timeout.to_string(), "timed out after 30s");
    }
}
