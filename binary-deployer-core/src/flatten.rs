//! Turns the artifact tree into the ordered list of binaries to deploy.
//!
//! The walk is depth-first and follows the order in which each directory lists
//! its children; nothing is sorted here. With the flatten policy on, every leaf
//! lands at the repository root under its own name, so two leaves with the same
//! name end up with the same destination and the one listed last overwrites the
//! other at upload time. That collision is not detected.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::binary::Binary;
use crate::error::DeployError;
use crate::node::FileNode;

/// Flattens everything below `root` (the root itself is never emitted).
pub fn flatten(root: &dyn FileNode, flatten: bool) -> Result<Vec<Binary>, DeployError> {
    info!(root = root.name(), flatten, "Flattening artifact tree");
    let mut binaries = Vec::new();

    // `path` is where the node really sits in the tree, `parent` is the
    // destination prefix handed to its leaves.
    fn visit_dir(
        dir: &dyn FileNode,
        path: &str,
        parent: &str,
        flatten: bool,
        results: &mut Vec<Binary>,
    ) -> Result<(), DeployError> {
        let children = dir.children().map_err(|e| {
            error!(path, error = ?e, "Failed to list directory");
            DeployError::io(path, e)
        })?;
        for child in children {
            if child.is_directory() {
                let child_path = join(path, child.name());
                let next = if flatten {
                    parent.to_string()
                } else {
                    join(parent, child.name())
                };
                visit_dir(child.as_ref(), &child_path, &next, flatten, results)?;
            } else {
                let binary = Binary::with_parent(Arc::clone(&child), Some(parent))?;
                debug!(name = binary.name(), size = binary.size(), "Prepared binary for deployment");
                results.push(binary);
            }
        }
        Ok(())
    }

    visit_dir(root, "", "", flatten, &mut binaries).map_err(|e| match e {
        DeployError::Io { path, source } if path.is_empty() => DeployError::io(root.name(), source),
        other => other,
    })?;

    info!(count = binaries.len(), "Completed flattening artifact tree");
    Ok(binaries)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
