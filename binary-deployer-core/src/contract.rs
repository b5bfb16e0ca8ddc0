//! # contract: seams between the deploy pipeline and the outside world
//!
//! This module defines the traits every repository backend and every
//! credential source implements, plus the plain data exchanged across them.
//!
//! ## Mocking & Testing
//! - [`Repository`] and [`CredentialStore`] are annotated for `mockall`, so
//!   consumers get `MockRepository` / `MockCredentialStore` when the
//!   `test-export-mocks` feature is on (it is by default).
//!
//! ## Adding a backend
//! - Implement [`Repository`]: upload the binaries in order, stop at the first
//!   failure and report it through [`DeployResult`]. Never retry on your own.
//! - Create network clients inside `deploy` so that they die with the call.

use std::fmt;

use async_trait::async_trait;
use mockall::automock;

use crate::binary::Binary;
use crate::error::DeployError;

/// Identity of the build run a deployment belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Job (project) name. Credentials may be restricted to some jobs.
    pub job: String,
    pub run_id: String,
}

impl ExecutionContext {
    pub fn new(job: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {} (run {})", self.job, self.run_id)
    }
}

/// A secret resolved from a [`CredentialStore`].
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Object-store access key pair.
    AccessKey {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    /// HTTP basic-auth identity.
    UsernamePassword { username: String, password: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::AccessKey { access_key_id, .. } => f
                .debug_struct("AccessKey")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"***")
                .finish(),
            Credential::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Outcome of one [`Repository::deploy`] call.
#[derive(Debug, Default)]
pub struct DeployResult {
    /// Uploads that fully completed before the deployment stopped.
    pub succeeded: usize,
    /// The first failure, if any. Binaries after it were not attempted.
    pub failure: Option<DeployError>,
}

impl DeployResult {
    pub fn success(succeeded: usize) -> Self {
        Self {
            succeeded,
            failure: None,
        }
    }

    pub fn failed(succeeded: usize, error: DeployError) -> Self {
        Self {
            succeeded,
            failure: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> Result<usize, DeployError> {
        match self.failure {
            None => Ok(self.succeeded),
            Some(e) => Err(e),
        }
    }
}

/// An upload destination for a flat, ordered list of binaries.
///
/// Calls are independent of each other and may run concurrently for different
/// contexts.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    async fn deploy(&self, binaries: &[Binary], ctx: &ExecutionContext) -> DeployResult;
}

/// Lookup of stored credentials by id, scoped to the running build.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, id: &str, ctx: &ExecutionContext) -> Option<Credential>;
}

/// Resolves a username/password pair, treating any other credential type as missing.
pub async fn username_password<C>(
    store: &C,
    id: &str,
    ctx: &ExecutionContext,
) -> Result<(String, String), DeployError>
where
    C: CredentialStore + ?Sized,
{
    match store.lookup(id, ctx).await {
        Some(Credential::UsernamePassword { username, password }) => Ok((username, password)),
        _ => Err(DeployError::CredentialsNotFound {
            id: id.to_string(),
            scope: ctx.to_string(),
        }),
    }
}

/// Resolves an access key, treating any other credential type as missing.
pub async fn access_key<C>(
    store: &C,
    id: &str,
    ctx: &ExecutionContext,
) -> Result<Credential, DeployError>
where
    C: CredentialStore + ?Sized,
{
    match store.lookup(id, ctx).await {
        Some(cred @ Credential::AccessKey { .. }) => Ok(cred),
        _ => Err(DeployError::CredentialsNotFound {
            id: id.to_string(),
            scope: ctx.to_string(),
        }),
    }
}
