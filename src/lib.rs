#![doc = "binary-deployer: network backends, credential store and CLI on top of binary-deployer-core."]

pub mod cli;
pub mod credentials;
pub mod load_config;
pub mod repository;

pub use repository::{AnyRepository, HttpRepository, ObjectStoreRepository};
