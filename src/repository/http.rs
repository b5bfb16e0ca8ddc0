//! # HTTP repository
//!
//! Uploads every binary with one `POST` to `remote_location + name`.
//!
//! - `remote_location` is normalised to end with `/` once, at construction.
//! - Without a credentials id uploads are anonymous. With one, every request
//!   carries pre-emptive basic auth.
//! - The body is buffered in memory before sending so a challenge/redirect
//!   can never consume the source stream twice. Redirects are not followed,
//!   the client's retry policy is `never` and idle connections are not kept,
//!   so each binary is sent at most once.
//! - Any non-2xx status fails the binary with the response's status line.
//!
//! A fresh client is built for every [`Repository::deploy`] call and dropped
//! when the call returns, whatever its outcome.

use std::sync::Arc;

use async_trait::async_trait;
use binary_deployer_core::config::HttpConfig;
use binary_deployer_core::contract::username_password;
use binary_deployer_core::node::read_all;
use binary_deployer_core::upload::{upload_in_order, UploadOptions};
use binary_deployer_core::{
    Binary, CredentialStore, DeployError, DeployResult, ExecutionContext, Repository,
};
use reqwest::{redirect, retry, Client, ClientBuilder, Url};
use tracing::{debug, error, info, warn};

pub struct HttpRepository {
    remote_location: String,
    credentials_id: Option<String>,
    credentials: Arc<dyn CredentialStore>,
    options: UploadOptions,
}

impl HttpRepository {
    /// Fails with `InvalidArgument` when `remote_location` is not an absolute http(s) URL.
    pub fn new(config: &HttpConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, DeployError> {
        let remote_location = normalize_location(&config.remote_location);
        let url = Url::parse(&remote_location).map_err(|e| {
            DeployError::InvalidArgument(format!(
                "remote location '{}' is not a valid URL: {e}",
                config.remote_location
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeployError::InvalidArgument(format!(
                "remote location '{}' must use http or https",
                config.remote_location
            )));
        }

        Ok(Self {
            remote_location,
            credentials_id: config
                .credentials_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            credentials,
            options: UploadOptions::default(),
        })
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Always ends with `/`.
    pub fn remote_location(&self) -> &str {
        &self.remote_location
    }

    pub fn target_url(&self, binary: &Binary) -> String {
        format!("{}{}", self.remote_location, binary.name())
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        client_builder().build()
    }

    async fn post(
        &self,
        client: &Client,
        auth: Option<&(String, String)>,
        binary: &Binary,
    ) -> Result<(), DeployError> {
        let stream = binary
            .file()
            .open_stream()
            .map_err(|e| DeployError::io(binary.name(), e))?;
        let body = read_all(stream)
            .await
            .map_err(|e| DeployError::io(binary.name(), e))?;
        if body.len() as u64 != binary.size() {
            warn!(
                name = binary.name(),
                expected = binary.size(),
                actual = body.len(),
                "File size changed while reading"
            );
        }

        let url = self.target_url(binary);
        debug!(%url, bytes = body.len(), "POST binary");
        let mut request = client.post(&url).body(body);
        if let Some((username, password)) = auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeployError::transport(binary.name(), e))?;
        let status = response.status();
        if status.is_success() {
            debug!(%url, status = status.as_u16(), "Binary accepted");
            Ok(())
        } else {
            let status_line = format!("{:?} {}", response.version(), status);
            error!(%url, %status_line, "Remote rejected binary");
            Err(DeployError::RemoteRejected {
                binary: binary.name().to_string(),
                status_line,
            })
        }
    }
}

#[async_trait]
impl Repository for HttpRepository {
    async fn deploy(&self, binaries: &[Binary], ctx: &ExecutionContext) -> DeployResult {
        if binaries.is_empty() {
            debug!("Nothing to deploy over HTTP");
            return DeployResult::success(0);
        }

        let auth = match self.credentials_id.as_deref() {
            None => None,
            Some(id) => match username_password(self.credentials.as_ref(), id, ctx).await {
                Ok(pair) => Some(pair),
                Err(e) => {
                    error!(credentials_id = id, error = %e, "Could not resolve HTTP credentials");
                    return DeployResult::failed(0, e);
                }
            },
        };

        let client = match self.build_client() {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Could not build HTTP client");
                return DeployResult::failed(0, DeployError::transport(binaries[0].name(), e));
            }
        };

        info!(
            remote_location = %self.remote_location,
            count = binaries.len(),
            authenticated = auth.is_some(),
            "Uploading binaries over HTTP"
        );
        upload_in_order(binaries, &self.options, |binary| {
            self.post(&client, auth.as_ref(), binary)
        })
        .await
    }
}

/// No redirects, no retry policy, and no pooled connections whose reuse the
/// connection pool could silently replay a request on.
fn client_builder() -> ClientBuilder {
    Client::builder()
        .redirect(redirect::Policy::none())
        .retry(retry::never())
        .pool_max_idle_per_host(0)
}

fn normalize_location(location: &str) -> String {
    let trimmed = location.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
