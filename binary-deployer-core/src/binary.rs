use std::fmt;
use std::sync::Arc;

use crate::error::DeployError;
use crate::node::FileNode;

/// A leaf of the artifact tree paired with the name it is deployed under.
///
/// The destination name is relative to the repository root: it never starts
/// with `/`, uses `/` between segments and is never empty.
#[derive(Clone)]
pub struct Binary {
    file: Arc<dyn FileNode>,
    name: String,
}

impl Binary {
    /// Deploys `file` under its own name.
    pub fn from_file(file: Arc<dyn FileNode>) -> Result<Self, DeployError> {
        Self::with_parent(file, Some(""))
    }

    /// Deploys `file` under `parent`. A missing parent is rejected; an empty
    /// one means the repository root.
    pub fn with_parent(file: Arc<dyn FileNode>, parent: Option<&str>) -> Result<Self, DeployError> {
        let parent = parent.ok_or_else(|| {
            DeployError::InvalidArgument(format!("parent of {} must not be null", file.name()))
        })?;
        if file.is_directory() {
            return Err(DeployError::InvalidArgument(format!(
                "{} is a directory and cannot be deployed as a binary",
                file.name()
            )));
        }
        if file.name().is_empty() {
            return Err(DeployError::InvalidArgument(
                "binary file name must not be empty".into(),
            ));
        }
        if file.name().contains('/') {
            return Err(DeployError::InvalidArgument(format!(
                "binary file name {} must be a single path segment",
                file.name()
            )));
        }
        let name = normalize_parent(parent) + file.name();
        Ok(Self { file, name })
    }

    pub fn file(&self) -> &Arc<dyn FileNode> {
        &self.file
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binary")
            .field("name", &self.name)
            .field("size", &self.file.size())
            .finish()
    }
}

/// `""` stays `""`, anything else ends with exactly one `/` and has no
/// leading `/`.
pub fn normalize_parent(parent: &str) -> String {
    let parent = parent.trim_start_matches('/');
    if parent.is_empty() || parent.ends_with('/') {
        parent.to_string()
    } else {
        format!("{parent}/")
    }
}
