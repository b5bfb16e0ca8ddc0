//! Error model shared by the flattener, the repositories and the orchestrator.
//!
//! Every failure carries enough context for the host to log which binary broke
//! the deployment and why. Nothing in this crate recovers from or retries a
//! [`DeployError`]; it is always handed back to the caller.

use thiserror::Error;

/// Boxed cause coming out of a backend SDK or HTTP client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Io,
    CredentialsNotFound,
    Transport,
    RemoteRejected,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum DeployError {
    /// Malformed input or configuration (missing parent, bad URL, directory used as a binary).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading the artifact tree or a source stream failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials '{id}' not found for {scope}")]
    CredentialsNotFound { id: String, scope: String },

    /// Network or backend SDK failure while uploading `binary`.
    #[error("transport failure while deploying {binary}: {source}")]
    Transport {
        binary: String,
        #[source]
        source: BoxError,
    },

    /// The remote answered with a non-2xx status.
    #[error("remote rejected {binary}: {status_line}")]
    RemoteRejected { binary: String, status_line: String },

    #[error("deployment cancelled{}", .binary.as_deref().map(|b| format!(" before {b}")).unwrap_or_default())]
    Cancelled { binary: Option<String> },
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DeployError::Io { .. } => ErrorKind::Io,
            DeployError::CredentialsNotFound { .. } => ErrorKind::CredentialsNotFound,
            DeployError::Transport { .. } => ErrorKind::Transport,
            DeployError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            DeployError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Destination name of the binary the failure is attributed to, if any.
    pub fn binary(&self) -> Option<&str> {
        match self {
            DeployError::Io { path, .. } => Some(path),
            DeployError::Transport { binary, .. } | DeployError::RemoteRejected { binary, .. } => {
                Some(binary)
            }
            DeployError::Cancelled { binary } => binary.as_deref(),
            DeployError::InvalidArgument(_) | DeployError::CredentialsNotFound { .. } => None,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(binary: impl Into<String>, source: impl Into<BoxError>) -> Self {
        DeployError::Transport {
            binary: binary.into(),
            source: source.into(),
        }
    }
}
