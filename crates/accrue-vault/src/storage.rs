//! Snapshot persistence for vault state.
//!
//! The durable state is the four ledger record types plus the per-token
//! deposit bookkeeping. [`SnapshotStore`] writes it as a single bincode
//! file: the new snapshot goes to a temporary sibling first and is renamed
//! over the old one, so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use accrue_core::error::AccrueError;
use accrue_core::history::InjectionLog;
use accrue_core::types::{AccountId, AssetId, BoostPool, BoostingAccount, GlobalState, UserAccount};

use crate::vault::TokenDeposit;

/// Format version written ahead of every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete durable state of a vault.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct VaultSnapshot {
    pub global: GlobalState,
    pub injections: InjectionLog,
    pub accounts: Vec<(AccountId, UserAccount)>,
    pub boost_pool: BoostPool,
    pub boost_accounts: Vec<(AccountId, BoostingAccount)>,
    pub token_deposits: Vec<(AccountId, AssetId, TokenDeposit)>,
    pub token_totals: Vec<(AssetId, u128)>,
}

impl VaultSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, AccrueError> {
        bincode::encode_to_vec((SNAPSHOT_VERSION, self), bincode::config::standard())
            .map_err(|e| AccrueError::Storage(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AccrueError> {
        let ((version, snapshot), read): ((u32, VaultSnapshot), usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| AccrueError::Storage(e.to_string()))?;
        if version != SNAPSHOT_VERSION {
            return Err(AccrueError::Storage(format!(
                "unsupported snapshot version {version}"
            )));
        }
        if read != bytes.len() {
            return Err(AccrueError::Storage(format!(
                "trailing bytes after snapshot: {}",
                bytes.len() - read
            )));
        }
        Ok(snapshot)
    }
}

/// File-backed snapshot store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the snapshot on disk.
    pub fn save(&self, snapshot: &VaultSnapshot) -> Result<(), AccrueError> {
        let bytes = snapshot.encode()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| AccrueError::Storage(e.to_string()))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| AccrueError::Storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| AccrueError::Storage(e.to_string()))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    /// Read the snapshot, or `None` if none has been written yet.
    pub fn load(&self) -> Result<Option<VaultSnapshot>, AccrueError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| AccrueError::Storage(e.to_string()))?;
        VaultSnapshot::decode(&bytes).map(Some)
    }
}
