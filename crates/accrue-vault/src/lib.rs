//! # accrue-vault
//! The serialized vault façade over both ledgers, with configuration,
//! snapshot persistence and in-memory collaborators.

pub mod config;
pub mod memory;
pub mod storage;
pub mod vault;

pub use config::VaultConfig;
pub use storage::{SnapshotStore, VaultSnapshot};
pub use vault::{TokenDeposit, Vault};
