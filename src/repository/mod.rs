//! Concrete repository backends and the selection between them.

pub mod http;
pub mod object_store;

use std::sync::Arc;

use async_trait::async_trait;
use binary_deployer_core::config::RepositoryConfig;
use binary_deployer_core::upload::UploadOptions;
use binary_deployer_core::{
    Binary, CredentialStore, DeployError, DeployResult, ExecutionContext, Repository,
};
use tracing::info;

pub use http::HttpRepository;
pub use object_store::{ObjectStoreConnector, ObjectStoreRepository, S3Connector};

/// One of the supported backends, chosen by configuration.
pub enum AnyRepository {
    ObjectStore(ObjectStoreRepository),
    Http(HttpRepository),
}

impl AnyRepository {
    pub fn from_config(
        config: &RepositoryConfig,
        credentials: Arc<dyn CredentialStore>,
        options: UploadOptions,
    ) -> Result<Self, DeployError> {
        match config {
            RepositoryConfig::ObjectStore(store) => {
                info!(bucket = %store.bucket_name, "Using object store repository");
                let repo = ObjectStoreRepository::new(store.clone(), credentials, Arc::new(S3Connector))?;
                Ok(AnyRepository::ObjectStore(repo.with_options(options)))
            }
            RepositoryConfig::Http(http) => {
                let repo = HttpRepository::new(http, credentials)?;
                info!(remote_location = repo.remote_location(), "Using HTTP repository");
                Ok(AnyRepository::Http(repo.with_options(options)))
            }
        }
    }

    /// Where binaries end up, for logs and dry runs.
    pub fn describe(&self, binary: &Binary) -> String {
        match self {
            AnyRepository::ObjectStore(repo) => format!("s3://{}/{}", repo.bucket_name(), binary.name()),
            AnyRepository::Http(repo) => repo.target_url(binary),
        }
    }
}

#[async_trait]
impl Repository for AnyRepository {
    async fn deploy(&self, binaries: &[Binary], ctx: &ExecutionContext) -> DeployResult {
        match self {
            AnyRepository::ObjectStore(repo) => repo.deploy(binaries, ctx).await,
            AnyRepository::Http(repo) => repo.deploy(binaries, ctx).await,
        }
    }
}
