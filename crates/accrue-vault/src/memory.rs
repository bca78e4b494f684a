//! In-memory collaborators for tests and embedding.
//!
//! - [`MemoryAssets`]: token balances and allowances per account
//! - [`MemoryRegistry`]: accepted tokens with fixed USD rates
//! - [`ManualClock`]: a clock that only moves when told to

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use accrue_core::error::AssetError;
use accrue_core::traits::{AssetMovement, Clock, TokenInfo, TokenRegistry};
use accrue_core::types::{AccountId, AssetId};

#[derive(Default)]
struct Ledgers {
    balances: HashMap<(AccountId, AssetId), u128>,
    allowances: HashMap<(AccountId, AssetId), u128>,
    held: HashMap<AssetId, u128>,
}

/// Token balances with allowance semantics: a debit needs both an allowance
/// and the funds. An allowance of `u128::MAX` is never decremented.
#[derive(Default)]
pub struct MemoryAssets {
    inner: RwLock<Ledgers>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        let mut inner = self.inner.write();
        let balance = inner.balances.entry((*account, *asset)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn approve(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        self.inner.write().allowances.insert((*account, *asset), amount);
    }

    /// Mint `amount` and grant an unlimited allowance.
    pub fn fund(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        self.mint(account, asset, amount);
        self.approve(account, asset, u128::MAX);
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.inner
            .read()
            .balances
            .get(&(*account, *asset))
            .copied()
            .unwrap_or(0)
    }

    pub fn allowance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.inner
            .read()
            .allowances
            .get(&(*account, *asset))
            .copied()
            .unwrap_or(0)
    }

    /// Place `amount` of `asset` in the pool without debiting any account,
    /// as when rewards are funded from outside the vault.
    pub fn reserve(&self, asset: &AssetId, amount: u128) {
        let mut inner = self.inner.write();
        let held = inner.held.entry(*asset).or_default();
        *held = held.saturating_add(amount);
    }

    /// Amount of `asset` currently held by the pool.
    pub fn held(&self, asset: &AssetId) -> u128 {
        self.inner.read().held.get(asset).copied().unwrap_or(0)
    }
}

impl AssetMovement for MemoryAssets {
    fn debit(&self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), AssetError> {
        let mut inner = self.inner.write();
        let key = (*account, *asset);

        let allowed = inner.allowances.get(&key).copied().unwrap_or(0);
        if allowed < amount {
            return Err(AssetError::InsufficientAllowance { allowed, need: amount });
        }
        let have = inner.balances.get(&key).copied().unwrap_or(0);
        if have < amount {
            return Err(AssetError::InsufficientFunds { have, need: amount });
        }

        inner.balances.insert(key, have - amount);
        if allowed != u128::MAX {
            inner.allowances.insert(key, allowed - amount);
        }
        let held = inner.held.entry(*asset).or_default();
        *held = held.saturating_add(amount);
        Ok(())
    }

    fn credit(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        let mut inner = self.inner.write();
        let held = inner.held.entry(*asset).or_default();
        debug_assert!(*held >= amount, "pool pays {amount} of {asset} but holds {held}");
        *held = held.saturating_sub(amount);
        let balance = inner.balances.entry((*account, *asset)).or_default();
        *balance = balance.saturating_add(amount);
    }
}

/// Token registry with rates fixed at registration.
#[derive(Default)]
pub struct MemoryRegistry {
    tokens: RwLock<HashMap<AssetId, TokenInfo>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `asset`. Returns `false` and keeps the existing entry if it
    /// is already registered.
    pub fn register(&self, asset: AssetId, info: TokenInfo) -> bool {
        let mut tokens = self.tokens.write();
        if tokens.contains_key(&asset) {
            return false;
        }
        tokens.insert(asset, info);
        true
    }
}

impl TokenRegistry for MemoryRegistry {
    fn token(&self, asset: &AssetId) -> Option<TokenInfo> {
        self.tokens.read().get(asset).copied()
    }
}

/// Clock driven by the caller.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    block: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64, block: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
            block: AtomicU64::new(block),
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_blocks(&self, blocks: u64) {
        self.block.fetch_add(blocks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn block_number(&self) -> u64 {
        self.block.load(Ordering::SeqCst)
    }
}
