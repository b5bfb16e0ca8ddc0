use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which backend to deploy to and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepositoryConfig {
    ObjectStore(ObjectStoreConfig),
    Http(HttpConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub credentials_id: String,
    pub bucket_name: String,
    /// Overrides the region from the environment.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint of an S3-compatible store.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub remote_location: String,
    /// Absent or empty means anonymous uploads.
    #[serde(default)]
    pub credentials_id: Option<String>,
}

/// Everything a deploy step needs besides the artifact tree itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub flatten: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub repository: RepositoryConfig,
}

fn default_concurrency() -> usize {
    1
}

impl DeployConfig {
    pub fn trace_loaded(&self) {
        let backend = match &self.repository {
            RepositoryConfig::ObjectStore(_) => "object_store",
            RepositoryConfig::Http(_) => "http",
        };
        info!(
            backend,
            flatten = self.flatten,
            concurrency = self.concurrency,
            "Loaded deploy config"
        );
        debug!(?self, "Deploy config loaded (full debug)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_repository_and_defaults() {
        let yaml = r#"
repository:
  type: http
  remote_location: "https://repo.example.com/releases"
"#;
        let config: DeployConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.flatten);
        assert_eq!(config.concurrency, 1);
        assert_eq!(
            config.repository,
            RepositoryConfig::Http(HttpConfig {
                remote_location: "https://repo.example.com/releases".into(),
                credentials_id: None,
            })
        );
    }

    #[test]
    fn parses_object_store() {
        let yaml = r#"
flatten: true
concurrency: 4
repository:
  type: object_store
  credentials_id: aws-deploy
  bucket_name: build-artifacts
  region: eu-west-1
"#;
        let config: DeployConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.flatten);
        assert_eq!(config.concurrency, 4);
        match config.repository {
            RepositoryConfig::ObjectStore(s3) => {
                assert_eq!(s3.bucket_name, "build-artifacts");
                assert_eq!(s3.region.as_deref(), Some("eu-west-1"));
                assert_eq!(s3.endpoint_url, None);
            }
            other => panic!("unexpected repository {other:?}"),
        }
    }
}
