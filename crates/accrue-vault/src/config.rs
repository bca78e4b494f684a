//! Vault configuration.
//!
//! Provides [`VaultConfig`] with defaults for the data directory, reward
//! asset and boosting policy. It can be built programmatically or loaded
//! from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use accrue_core::error::AccrueError;
use accrue_core::types::{AssetId, BoostParams};

/// Configuration for a vault instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory for persistent data.
    pub data_dir: PathBuf,
    /// Token paid out by both reward streams and staked for boosting.
    #[serde(with = "hex_asset")]
    pub reward_asset: AssetId,
    /// Initial boosting policy.
    pub boost: BoostParams,
    /// Snapshot file name inside `data_dir`.
    pub snapshot_file: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("accrue");

        Self {
            data_dir,
            reward_asset: AssetId::default(),
            boost: BoostParams::default(),
            snapshot_file: "vault.snapshot".to_string(),
        }
    }
}

impl VaultConfig {
    /// Path of the ledger snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    pub fn from_json_str(s: &str) -> Result<Self, AccrueError> {
        serde_json::from_str(s).map_err(|e| AccrueError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AccrueError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AccrueError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }
}

/// Asset ids as `0x`-prefixed hex strings in config files.
mod hex_asset {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use accrue_core::types::AssetId;

    pub fn serialize<S: Serializer>(asset: &AssetId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(asset)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AssetId, D::Error> {
        let s = String::deserialize(deserializer)?;
        AssetId::from_hex(&s).ok_or_else(|| D::Error::custom(format!("invalid asset id: {s}")))
    }
}
