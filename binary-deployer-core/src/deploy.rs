//! Build-step entry point: flatten the artifact tree, hand it to a repository,
//! report a build status.
//!
//! # Responsibilities
//! - Runs the flattener with the configured policy
//! - Calls [`Repository::deploy`] exactly once, without retrying
//! - Turns the [`DeployResult`] into a [`BuildOutcome`] the host can act on
//!
//! Files uploaded before a failure stay uploaded; a partial deployment is
//! reported as a failed build, nothing is rolled back.

use tracing::{debug, error, info, info_span, Instrument};

use crate::contract::{DeployResult, ExecutionContext, Repository};
use crate::error::DeployError;
use crate::flatten::flatten;
use crate::node::FileNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Failure,
}

/// What the host gets back from a deploy step.
#[derive(Debug)]
pub struct BuildOutcome {
    pub status: BuildStatus,
    /// Binaries produced by the flattener.
    pub planned: usize,
    /// Binaries fully uploaded.
    pub deployed: usize,
    pub error: Option<DeployError>,
}

impl BuildOutcome {
    fn from_result(planned: usize, result: DeployResult) -> Self {
        Self {
            status: if result.is_success() {
                BuildStatus::Success
            } else {
                BuildStatus::Failure
            },
            planned,
            deployed: result.succeeded,
            error: result.failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }
}

/// Deploys everything below `root` to `repository`.
pub async fn perform<R>(
    root: &dyn FileNode,
    flatten_policy: bool,
    repository: &R,
    ctx: &ExecutionContext,
) -> BuildOutcome
where
    R: Repository + ?Sized,
{
    let span = info_span!("deploy", job = %ctx.job, run_id = %ctx.run_id);
    async {
        info!("Deploying files");

        let binaries = match flatten(root, flatten_policy) {
            Ok(binaries) => binaries,
            Err(e) => {
                error!(error = %e, "Could not collect files to deploy");
                return BuildOutcome::from_result(0, DeployResult::failed(0, e));
            }
        };
        info!(count = binaries.len(), "Will deploy files to the repository");
        for binary in &binaries {
            debug!(name = binary.name(), size = binary.size(), "Planned binary");
        }

        let outcome = BuildOutcome::from_result(binaries.len(), repository.deploy(&binaries, ctx).await);
        match &outcome.error {
            None => info!(deployed = outcome.deployed, "Deployment succeeded"),
            Some(e) => error!(
                deployed = outcome.deployed,
                planned = outcome.planned,
                binary = e.binary().unwrap_or("-"),
                error = %e,
                "Deployment failed, marking build as failed"
            ),
        }
        outcome
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockRepository;
    use crate::error::ErrorKind;
    use crate::node::MemoryNode;

    fn tree() -> std::sync::Arc<dyn FileNode> {
        MemoryNode::dir(
            "artifacts",
            vec![
                MemoryNode::file("a.txt", "a"),
                MemoryNode::dir("sub", vec![MemoryNode::file("b.txt", "b")]),
            ],
        )
    }

    #[tokio::test]
    async fn passes_flattened_binaries_to_the_repository() {
        let mut repo = MockRepository::new();
        repo.expect_deploy()
            .withf(|binaries, ctx| {
                let names: Vec<&str> = binaries.iter().map(|b| b.name()).collect();
                names == ["a.txt", "sub/b.txt"] && ctx.job == "nightly"
            })
            .times(1)
            .returning(|binaries, _| DeployResult::success(binaries.len()));

        let ctx = ExecutionContext::new("nightly", "7");
        let outcome = perform(tree().as_ref(), false, &repo, &ctx).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.planned, 2);
        assert_eq!(outcome.deployed, 2);
    }

    #[tokio::test]
    async fn repository_failure_fails_the_build() {
        let mut repo = MockRepository::new();
        repo.expect_deploy().times(1).returning(|_, _| {
            DeployResult::failed(
                1,
                DeployError::RemoteRejected {
                    binary: "b.txt".into(),
                    status_line: "HTTP/1.1 500 Internal Server Error".into(),
                },
            )
        });

        let ctx = ExecutionContext::new("nightly", "8");
        let outcome = perform(tree().as_ref(), true, &repo, &ctx).await;
        assert_eq!(outcome.status, BuildStatus::Failure);
        assert_eq!(outcome.deployed, 1);
        assert_eq!(outcome.error.unwrap().kind(), ErrorKind::RemoteRejected);
    }

    #[tokio::test]
    async fn flatten_failure_never_reaches_the_repository() {
        let mut repo = MockRepository::new();
        repo.expect_deploy().times(0);

        let leaf_as_root = MemoryNode::file("not-a-dir", "x");
        let ctx = ExecutionContext::new("nightly", "9");
        let outcome = perform(leaf_as_root.as_ref(), false, &repo, &ctx).await;
        assert_eq!(outcome.status, BuildStatus::Failure);
        assert_eq!(outcome.error.unwrap().kind(), ErrorKind::Io);
    }
}
