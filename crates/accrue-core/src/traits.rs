//! Trait interfaces for the collaborators around the ledger.
//!
//! - [`AssetMovement`]: debits and credits of token balances (custody lives elsewhere)
//! - [`TokenRegistry`]: accepted tokens and their USD normalization
//! - [`Clock`]: wall-clock seconds and block numbers
//! - [`ValueBalances`]: read-only view of deposited value, consumed by the boosting ledger

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_RATE_DECIMALS, MAX_TOKEN_DECIMALS, VALUE_DECIMALS};
use crate::error::AssetError;
use crate::math::mul_div;
use crate::types::{AccountId, AssetId};

/// Synchronous, fallible movement of token balances.
///
/// A vault calls `debit` at most once per operation, before any state is
/// written, so a failed debit aborts the whole operation. `credit` cannot
/// fail: it only ever moves funds the pool already holds.
pub trait AssetMovement: Send + Sync {
    /// Take `amount` of `asset` from `account` into the pool.
    fn debit(&self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), AssetError>;

    /// Pay `amount` of `asset` out of the pool to `account`.
    fn credit(&self, account: &AccountId, asset: &AssetId, amount: u128);
}

/// Normalization parameters of an accepted token.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenInfo {
    /// Decimal places of the token's smallest unit.
    pub decimals: u32,
    /// USD price of one whole token, scaled by `10^rate_decimals`.
    pub usd_rate: u128,
    /// Decimal places of `usd_rate`.
    pub rate_decimals: u32,
}

impl TokenInfo {
    /// Convert a token amount into 18-decimal USD value.
    ///
    /// `value = amount * 10^(18 - decimals) * usd_rate / 10^rate_decimals`, truncating.
    pub fn normalize(&self, amount: u128) -> Result<u128, AssetError> {
        if self.decimals > MAX_TOKEN_DECIMALS || self.rate_decimals > MAX_RATE_DECIMALS {
            return Err(AssetError::UnsupportedToken(format!(
                "decimals {}, rate decimals {}",
                self.decimals, self.rate_decimals
            )));
        }
        let scale = 10u128.pow(VALUE_DECIMALS - self.decimals);
        let scaled = amount
            .checked_mul(scale)
            .ok_or(AssetError::ArithmeticOverflow)?;
        mul_div(scaled, self.usd_rate, 10u128.pow(self.rate_decimals))
            .ok_or(AssetError::ArithmeticOverflow)
    }
}

/// Registry of tokens the vault accepts.
pub trait TokenRegistry: Send + Sync {
    /// Parameters of `asset`, or `None` if it is not accepted.
    fn token(&self, asset: &AssetId) -> Option<TokenInfo>;

    /// Normalize `amount` of `asset` into USD value.
    ///
    /// Default implementation looks the token up and applies [`TokenInfo::normalize`].
    fn normalize(&self, asset: &AssetId, amount: u128) -> Result<u128, AssetError> {
        self.token(asset)
            .ok_or_else(|| AssetError::UnknownAsset(asset.to_string()))?
            .normalize(amount)
    }
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in seconds.
    fn now(&self) -> u64;

    /// Current block number.
    fn block_number(&self) -> u64;
}

/// Read-only view of per-user deposited value.
pub trait ValueBalances {
    /// Current value balance of `user` (0 if unknown).
    fn value_balance(&self, user: &AccountId) -> u128;
}
