//! File-backed credential store.
//!
//! Credentials live in a YAML file kept apart from the deploy config, so the
//! config can be committed and the secrets cannot:
//!
//! ```yaml
//! credentials:
//!   - id: nexus
//!     type: username_password
//!     username: deployer
//!     password: s3cret
//!     jobs: [nightly, release]   # optional, restricts the credential to these jobs
//!   - id: aws-deploy
//!     type: access_key
//!     access_key_id: AKIA...
//!     secret_access_key: ...
//! ```

use std::fs;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use binary_deployer_core::{Credential, CredentialStore, ExecutionContext};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: Vec<CredentialEntryYaml>,
}

#[derive(Deserialize)]
struct CredentialEntryYaml {
    id: String,
    #[serde(default)]
    jobs: Vec<String>,
    #[serde(flatten)]
    secret: SecretYaml,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SecretYaml {
    UsernamePassword {
        username: String,
        password: String,
    },
    AccessKey {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default)]
        session_token: Option<String>,
    },
}

impl From<SecretYaml> for Credential {
    fn from(secret: SecretYaml) -> Self {
        match secret {
            SecretYaml::UsernamePassword { username, password } => {
                Credential::UsernamePassword { username, password }
            }
            SecretYaml::AccessKey {
                access_key_id,
                secret_access_key,
                session_token,
            } => Credential::AccessKey {
                access_key_id,
                secret_access_key,
                session_token,
            },
        }
    }
}

#[derive(Debug)]
struct StoredCredential {
    id: String,
    jobs: Vec<String>,
    credential: Credential,
}

impl StoredCredential {
    fn visible_to(&self, ctx: &ExecutionContext) -> bool {
        self.jobs.is_empty() || self.jobs.iter().any(|job| job == &ctx.job)
    }
}

/// Credentials loaded once from a YAML file. An empty store finds nothing.
#[derive(Debug, Default)]
pub struct FileCredentialStore {
    entries: Vec<StoredCredential>,
}

impl FileCredentialStore {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        info!(credentials_path = ?path_ref, "Loading credentials from file");

        let content = match fs::read_to_string(path_ref) {
            Ok(content) => content,
            Err(e) => {
                error!(error = ?e, credentials_path = ?path_ref, "Failed to read credentials file");
                return Err(anyhow::anyhow!("Failed to read credentials file {:?}: {}", path_ref, e));
            }
        };

        let store = Self::from_yaml_str(&content)?;
        info!(count = store.len(), "Credentials loaded");
        Ok(store)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: CredentialsFile = match serde_yaml::from_str(content) {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Failed to parse credentials YAML");
                return Err(anyhow::anyhow!("Failed to parse credentials YAML: {e}"));
            }
        };

        let mut entries: Vec<StoredCredential> = Vec::with_capacity(file.credentials.len());
        for entry in file.credentials {
            if entries.iter().any(|existing| existing.id == entry.id) {
                anyhow::bail!("Duplicate credentials id '{}'", entry.id);
            }
            debug!(id = %entry.id, jobs = ?entry.jobs, "Registered credential");
            entries.push(StoredCredential {
                id: entry.id,
                jobs: entry.jobs,
                credential: entry.secret.into(),
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn lookup(&self, id: &str, ctx: &ExecutionContext) -> Option<Credential> {
        let Some(entry) = self.entries.iter().find(|entry| entry.id == id) else {
            warn!(id, "No credentials stored under this id");
            return None;
        };
        if !entry.visible_to(ctx) {
            warn!(id, job = %ctx.job, "Credentials are not available to this job");
            return None;
        }
        debug!(id, job = %ctx.job, "Credentials resolved");
        Some(entry.credential.clone())
    }
}
