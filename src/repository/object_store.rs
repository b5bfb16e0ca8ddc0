//! # Object store repository
//!
//! Puts every binary into `bucket_name` under its destination name, streaming
//! the content with its length declared up front.
//!
//! The store is reached through [`ObjectStoreConnector`] / [`ObjectStoreClient`]
//! so that the deploy logic can be exercised without a network. [`S3Connector`]
//! is the production implementation on top of `aws-sdk-s3`; it disables SDK
//! retries so a failed put is reported exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use binary_deployer_core::config::ObjectStoreConfig;
use binary_deployer_core::contract::access_key;
use binary_deployer_core::error::BoxError;
use binary_deployer_core::node::ByteStream;
use binary_deployer_core::upload::{upload_in_order, UploadOptions};
use binary_deployer_core::{
    Binary, Credential, CredentialStore, DeployError, DeployResult, ExecutionContext, Repository,
};
use futures::TryStreamExt;
use http_body::Frame;
use http_body_util::StreamBody;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, error, info};

/// A connected object store, alive for one deployment.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<(), BoxError>;
}

/// Opens an [`ObjectStoreClient`] with a resolved access key.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &Credential,
        config: &ObjectStoreConfig,
    ) -> Result<Box<dyn ObjectStoreClient>, BoxError>;
}

/// Connects to AWS S3, or to an S3-compatible store when `endpoint_url` is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Connector;

#[async_trait]
impl ObjectStoreConnector for S3Connector {
    async fn connect(
        &self,
        credential: &Credential,
        config: &ObjectStoreConfig,
    ) -> Result<Box<dyn ObjectStoreClient>, BoxError> {
        let Credential::AccessKey {
            access_key_id,
            secret_access_key,
            session_token,
        } = credential
        else {
            return Err("object store needs an access key credential".into());
        };

        let credentials = Credentials::new(
            access_key_id.clone(),
            secret_access_key.clone(),
            session_token.clone(),
            None,
            "binary-deployer",
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // S3-compatible stores rarely support virtual-hosted buckets.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();
        debug!(
            region = ?sdk_config.region(),
            endpoint_url = ?config.endpoint_url,
            "S3 client configured"
        );
        Ok(Box::new(S3Client {
            client: aws_sdk_s3::Client::from_conf(s3_config),
        }))
    }
}

struct S3Client {
    client: aws_sdk_s3::Client,
}

#[async_trait]
impl ObjectStoreClient for S3Client {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<(), BoxError> {
        let body = SdkByteStream::from_body_1_x(StreamBody::new(body.map_ok(Frame::data)));
        let content_length = i64::try_from(content_length)?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(content_length)
            .body(body)
            .send()
            .await?;
        Ok(())
    }
}

pub struct ObjectStoreRepository {
    config: ObjectStoreConfig,
    credentials: Arc<dyn CredentialStore>,
    connector: Arc<dyn ObjectStoreConnector>,
    options: UploadOptions,
}

impl ObjectStoreRepository {
    pub fn new(
        config: ObjectStoreConfig,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn ObjectStoreConnector>,
    ) -> Result<Self, DeployError> {
        if config.bucket_name.trim().is_empty() {
            return Err(DeployError::InvalidArgument("bucket name is empty".into()));
        }
        if config.credentials_id.trim().is_empty() {
            return Err(DeployError::InvalidArgument(
                "object store deployments need a credentials id".into(),
            ));
        }
        Ok(Self {
            config,
            credentials,
            connector,
            options: UploadOptions::default(),
        })
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bucket_name(&self) -> &str {
        &self.config.bucket_name
    }

    async fn put(&self, client: &dyn ObjectStoreClient, binary: &Binary) -> Result<(), DeployError> {
        let stream = binary
            .file()
            .open_stream()
            .map_err(|e| DeployError::io(binary.name(), e))?;
        debug!(
            bucket = %self.config.bucket_name,
            key = binary.name(),
            size = binary.size(),
            "PUT object"
        );
        client
            .put_object(&self.config.bucket_name, binary.name(), stream, binary.size())
            .await
            .map_err(|e| {
                error!(key = binary.name(), error = %e, "Object store rejected upload");
                DeployError::transport(binary.name(), e)
            })
    }
}

#[async_trait]
impl Repository for ObjectStoreRepository {
    async fn deploy(&self, binaries: &[Binary], ctx: &ExecutionContext) -> DeployResult {
        if binaries.is_empty() {
            debug!("Nothing to deploy to the object store");
            return DeployResult::success(0);
        }

        let credential =
            match access_key(self.credentials.as_ref(), &self.config.credentials_id, ctx).await {
                Ok(credential) => credential,
                Err(e) => {
                    error!(credentials_id = %self.config.credentials_id, error = %e, "Could not resolve object store credentials");
                    return DeployResult::failed(0, e);
                }
            };

        let client = match self.connector.connect(&credential, &self.config).await {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Could not connect to the object store");
                return DeployResult::failed(0, DeployError::transport(binaries[0].name(), e));
            }
        };

        info!(
            bucket = %self.config.bucket_name,
            count = binaries.len(),
            "Uploading binaries to the object store"
        );
        upload_in_order(binaries, &self.options, |binary| self.put(&*client, binary)).await
    }
}
