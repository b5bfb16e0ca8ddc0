#![doc = "binary-deployer-core: core logic library for binary-deployer."]

//! This crate holds everything that does not talk to the network: the
//! artifact tree abstraction, flattening into binaries, the repository and
//! credential contracts, the fail-fast upload driver and the orchestrator.
//! Concrete backends live in the `binary-deployer` crate.
//!
//! # Usage
//! Build a [`node::FileNode`] tree, pick a [`contract::Repository`] and call
//! [`deploy::perform`].

pub mod binary;
pub mod config;
pub mod contract;
pub mod deploy;
pub mod error;
pub mod flatten;
pub mod node;
pub mod upload;

pub use binary::Binary;
pub use contract::{Credential, CredentialStore, DeployResult, ExecutionContext, Repository};
pub use error::{DeployError, ErrorKind};
