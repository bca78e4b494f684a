//! Ledger record types: identifiers, global state, injection records and
//! per-user accounts for both reward streams.
//!
//! All value amounts are u128 fixed-point with 18 decimals. Dollar-time
//! accumulators are i128 because withdrawals subtract `amount * now`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{DEFAULT_MAX_ACTIVE, DEFAULT_MAX_RATE_PER_USD, DEFAULT_REWARD_PER_BLOCK};

/// A 20-byte participant address.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an AccountId from a byte array.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a 40-character hex string (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Option<Self> {
        decode_address(s).map(Self)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for AccountId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// A 20-byte token identifier.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AssetId(pub [u8; 20]);

impl AssetId {
    /// Create an AssetId from a byte array.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a 40-character hex string (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Option<Self> {
        decode_address(s).map(Self)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for AssetId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

fn decode_address(s: &str) -> Option<[u8; 20]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Pool-wide aggregates of the dollar-time ledger.
///
/// `total_dollar_time` is kept so that `now * total_value - total_dollar_time`
/// is the dollar-time accrued by all current holders since the last
/// injection. Each injection rebases it to `total_value * now`.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct GlobalState {
    /// Sum of all user value balances.
    pub total_value: u128,
    /// Running dollar-time accumulator.
    pub total_dollar_time: i128,
    /// Timestamp of the last mutation (seconds).
    pub last_update: u64,
}

/// One reward injection. Immutable once appended to the history.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct InjectionRecord {
    /// Reward per unit of dollar-time over the interval ending here, scaled by `PRECISION`.
    pub coefficient: u128,
    /// Reward amount injected.
    pub amount: u128,
    /// Injection time (seconds).
    pub timestamp: u64,
}

/// Per-participant state of the dollar-time ledger.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UserAccount {
    /// Current deposited value.
    pub value_balance: u128,
    /// The user's own dollar-time accumulator, rebased on every balance change.
    pub dollar_time_accum: i128,
    /// Injections before this index are folded into `settled_balance`.
    pub last_settled_index: usize,
    /// Length of the injection history at the most recent balance change;
    /// the injection at this index closes the user's partial interval.
    pub deposit_event_index: usize,
    /// Reward computed and awaiting claim.
    pub settled_balance: u128,
}

impl UserAccount {
    /// A fresh account opened while the history holds `history_len` records.
    pub fn opened_at(history_len: usize) -> Self {
        Self {
            last_settled_index: history_len,
            deposit_event_index: history_len,
            ..Self::default()
        }
    }
}

/// Adjustable policy of the boosting stream.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BoostParams {
    /// Reward-token stake counted per unit of deposited value, scaled by `PRECISION`.
    pub max_rate_per_usd: u128,
    /// Reward emitted per block per unit of effective stake, scaled by `PRECISION`.
    pub reward_per_block: u128,
    /// Ceiling on the sum of effective stakes before accrual is scaled down.
    pub max_active: u128,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            max_rate_per_usd: DEFAULT_MAX_RATE_PER_USD,
            reward_per_block: DEFAULT_REWARD_PER_BLOCK,
            max_active: DEFAULT_MAX_ACTIVE,
        }
    }
}

/// Pool-wide state of the boosting stream.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BoostPool {
    /// Current policy.
    pub params: BoostParams,
    /// Accumulated reward per unit of effective stake, scaled by `PRECISION`.
    pub acc_reward_per_share: u128,
    /// Block up to which `acc_reward_per_share` has been accrued.
    pub last_reward_block: u64,
    /// Sum of all `deposited` stakes.
    pub total_deposited: u128,
    /// Sum of per-user `active_stake` snapshots.
    pub active_supply: u128,
}

/// Boosting stream lifecycle of one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoostState {
    /// No reward-token stake.
    NoStake,
    /// Some reward-token stake is deposited.
    Staking,
}

/// Per-participant state of the boosting stream.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BoostingAccount {
    /// Reward-token amount staked for boosting.
    pub deposited: u128,
    /// `acc_reward_per_share` at the last settlement.
    pub reward_debt: u128,
    /// Effective stake as of the last settlement; only feeds `active_supply`.
    pub active_stake: u128,
}

impl BoostingAccount {
    /// Lifecycle state derived from the stake.
    pub fn state(&self) -> BoostState {
        if self.deposited > 0 {
            BoostState::Staking
        } else {
            BoostState::NoStake
        }
    }
}
