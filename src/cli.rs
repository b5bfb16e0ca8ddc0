use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use binary_deployer_core::deploy::perform;
use binary_deployer_core::flatten::flatten;
use binary_deployer_core::node::LocalFileNode;
use binary_deployer_core::upload::UploadOptions;
use binary_deployer_core::{CredentialStore, ExecutionContext};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::credentials::FileCredentialStore;
use crate::load_config::load_config;
use crate::repository::AnyRepository;

/// CLI for binary-deployer: publish a directory of build artifacts.
#[derive(Parser)]
#[clap(
    name = "binary-deployer",
    version,
    about = "Deploy build artifacts to an HTTP endpoint or an object store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy every file below --root to the repository from the config file
    Deploy {
        /// Path to the YAML deploy config
        #[clap(long)]
        config: PathBuf,
        /// Directory holding the artifacts
        #[clap(long)]
        root: PathBuf,
        /// Collapse the directory structure, overriding the config file
        #[clap(long, overrides_with = "no_flatten")]
        flatten: bool,
        /// Keep the directory structure, overriding the config file
        #[clap(long, overrides_with = "flatten")]
        no_flatten: bool,
        /// YAML file with the stored credentials
        #[clap(long, env = "BINARY_DEPLOYER_CREDENTIALS")]
        credentials: Option<PathBuf>,
        /// Job name the deployment runs for; scoped credentials match against it
        #[clap(long, default_value = "default")]
        job: String,
        /// Identifier of this run, generated when absent
        #[clap(long)]
        run_id: Option<String>,
        /// Print where each file would go without uploading anything
        #[clap(long)]
        dry_run: bool,
    },
}

/// Runs a parsed command line. `main` only adds process setup around this.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::debug!("Dispatching command");

    match cli.command {
        Commands::Deploy {
            config,
            root,
            flatten: flatten_flag,
            no_flatten,
            credentials,
            job,
            run_id,
            dry_run,
        } => {
            let config = load_config(config)?;
            let flatten_policy = flatten_override(flatten_flag, no_flatten).unwrap_or(config.flatten);
            let ctx = ExecutionContext::new(
                job,
                run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            );

            let store: Arc<dyn CredentialStore> = match credentials {
                Some(path) => Arc::new(FileCredentialStore::load(path)?),
                None => {
                    tracing::info!("No credentials file given, deploying without stored credentials");
                    Arc::new(FileCredentialStore::default())
                }
            };

            let cancel = CancellationToken::new();
            let options = UploadOptions {
                concurrency: config.concurrency,
                cancel: cancel.clone(),
            };
            let repository = AnyRepository::from_config(&config.repository, store, options)
                .context("Invalid repository configuration")?;

            let root = LocalFileNode::open(&root)
                .with_context(|| format!("Cannot open artifact root {}", root.display()))?;

            if dry_run {
                let binaries = flatten(&root, flatten_policy)?;
                println!("Dry run, {} file(s) would be deployed:", binaries.len());
                for binary in &binaries {
                    println!("{} -> {}", binary.name(), repository.describe(binary));
                }
                return Ok(());
            }

            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after in-flight uploads");
                    cancel.cancel();
                }
            });

            println!("Deploying {} ({})...", root.path().display(), ctx);
            let outcome = perform(&root, flatten_policy, &repository, &ctx).await;
            interrupt.abort();

            match outcome.error {
                None => {
                    println!("Deployment succeeded: {} file(s) deployed.", outcome.deployed);
                    Ok(())
                }
                Some(e) => {
                    eprintln!(
                        "[ERROR] Deployment failed after {} of {} file(s): {}",
                        outcome.deployed, outcome.planned, e
                    );
                    Err(anyhow::Error::new(e).context("Deployment failed"))
                }
            }
        }
    }
}

/// The last of `--flatten` / `--no-flatten` wins; neither defers to the config file.
fn flatten_override(flatten: bool, no_flatten: bool) -> Option<bool> {
    match (flatten, no_flatten) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
