//! Serialized vault façade.
//!
//! The [`Vault`] wires the dollar-time and boosting ledgers to the asset
//! movement, token registry and clock collaborators. All ledger state sits
//! behind one `RwLock`: mutations hold the write lock for their whole
//! duration, which gives a single total order; queries share the read lock.
//!
//! Every mutation follows the same shape: prepare the ledger updates, make
//! at most one fallible debit, make the infallible credits, then apply. A
//! failure anywhere before the apply step leaves every record unchanged.
//!
//! The clock's block number is the last sealed block. Mutations execute in
//! the pending block after it, and boosting queries value that same block,
//! so a reported claimable amount is exactly what a claim would pay.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use accrue_core::error::{AccrueError, LedgerError};
use accrue_core::math::mul_div;
use accrue_core::traits::{AssetMovement, Clock, TokenRegistry, ValueBalances};
use accrue_core::types::{
    AccountId, AssetId, BoostParams, BoostState, GlobalState, InjectionRecord,
};
use accrue_ledger::{BoostUpdate, BoostingLedger, DollarTimeLedger, LedgerUpdate};

use crate::config::VaultConfig;
use crate::storage::{SnapshotStore, VaultSnapshot};

/// Token-denominated deposit of one user in one asset, with the USD value
/// it was credited at.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TokenDeposit {
    pub amount: u128,
    pub value: u128,
}

#[derive(Default)]
struct VaultState {
    ledger: DollarTimeLedger,
    boosting: BoostingLedger,
    token_deposits: BTreeMap<(AccountId, AssetId), TokenDeposit>,
    token_totals: BTreeMap<AssetId, u128>,
}

impl VaultState {
    fn apply(&mut self, ledger: Option<LedgerUpdate>, boost: Option<BoostUpdate>) {
        if let Some(update) = ledger {
            self.ledger.apply(update);
        }
        if let Some(update) = boost {
            self.boosting.apply(update);
        }
    }
}

/// Value balance after a prepared ledger update, or `current` if it leaves the user alone.
fn balance_after(update: &LedgerUpdate, current: u128) -> u128 {
    update
        .account
        .as_ref()
        .map_or(current, |(_, account)| account.value_balance)
}

pub struct Vault {
    state: RwLock<VaultState>,
    assets: Arc<dyn AssetMovement>,
    registry: Arc<dyn TokenRegistry>,
    clock: Arc<dyn Clock>,
    config: VaultConfig,
}

impl Vault {
    /// Create an empty vault.
    pub fn new(
        config: VaultConfig,
        assets: Arc<dyn AssetMovement>,
        registry: Arc<dyn TokenRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = VaultState {
            boosting: BoostingLedger::new(config.boost),
            ..VaultState::default()
        };
        Self {
            state: RwLock::new(state),
            assets,
            registry,
            clock,
            config,
        }
    }

    /// Rebuild a vault from a snapshot. The snapshot's boosting policy wins
    /// over `config.boost`.
    pub fn restore(
        config: VaultConfig,
        snapshot: VaultSnapshot,
        assets: Arc<dyn AssetMovement>,
        registry: Arc<dyn TokenRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = VaultState {
            ledger: DollarTimeLedger::from_parts(
                snapshot.global,
                snapshot.injections,
                snapshot.accounts,
            ),
            boosting: BoostingLedger::from_parts(snapshot.boost_pool, snapshot.boost_accounts),
            token_deposits: snapshot
                .token_deposits
                .into_iter()
                .map(|(user, asset, deposit)| ((user, asset), deposit))
                .collect(),
            token_totals: snapshot.token_totals.into_iter().collect(),
        };
        info!(
            injections = state.ledger.history().len(),
            total_value = state.ledger.total_value(),
            "vault restored from snapshot"
        );
        Self {
            state: RwLock::new(state),
            assets,
            registry,
            clock,
            config,
        }
    }

    /// Restore from `config.snapshot_path()` if a snapshot exists, else start empty.
    pub fn open(
        config: VaultConfig,
        assets: Arc<dyn AssetMovement>,
        registry: Arc<dyn TokenRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AccrueError> {
        match SnapshotStore::new(config.snapshot_path()).load()? {
            Some(snapshot) => Ok(Self::restore(config, snapshot, assets, registry, clock)),
            None => Ok(Self::new(config, assets, registry, clock)),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Consistent copy of the whole durable state.
    pub fn snapshot(&self) -> VaultSnapshot {
        let state = self.state.read();
        VaultSnapshot {
            global: *state.ledger.global(),
            injections: state.ledger.history().clone(),
            accounts: state.ledger.accounts().map(|(u, a)| (*u, *a)).collect(),
            boost_pool: *state.boosting.pool(),
            boost_accounts: state.boosting.accounts().map(|(u, a)| (*u, *a)).collect(),
            token_deposits: state
                .token_deposits
                .iter()
                .map(|(&(user, asset), deposit)| (user, asset, *deposit))
                .collect(),
            token_totals: state.token_totals.iter().map(|(a, t)| (*a, *t)).collect(),
        }
    }

    pub fn save_snapshot(&self) -> Result<(), AccrueError> {
        SnapshotStore::new(self.config.snapshot_path()).save(&self.snapshot())
    }

    fn pending_block(&self) -> u64 {
        self.clock.block_number().saturating_add(1)
    }

    fn pay(&self, user: &AccountId, amount: u128) {
        if amount > 0 {
            self.assets.credit(user, &self.config.reward_asset, amount);
        }
    }

    // --- Stablecoin deposits ---

    /// Deposit `amount` of `asset` and return the USD value credited.
    pub fn deposit(&self, user: &AccountId, asset: &AssetId, amount: u128) -> Result<u128, AccrueError> {
        self.deposit_on_behalf(user, user, asset, amount)
    }

    /// Debit `payer` and credit the deposit to `beneficiary`.
    pub fn deposit_on_behalf(
        &self,
        payer: &AccountId,
        beneficiary: &AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<u128, AccrueError> {
        self.try_deposit(payer, beneficiary, asset, amount)
            .inspect_err(|e| warn!(payer = %payer, user = %beneficiary, asset = %asset, amount, error = %e, "deposit rejected"))
    }

    fn try_deposit(
        &self,
        payer: &AccountId,
        beneficiary: &AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<u128, AccrueError> {
        let mut state = self.state.write();
        let now = self.clock.now();
        let block = self.pending_block();

        let value = self.registry.normalize(asset, amount)?;
        let ledger_update = state.ledger.prepare_deposit(beneficiary, value, now)?;
        let before = state.ledger.value_balance(beneficiary);
        let after = balance_after(&ledger_update, before);
        let boost_update = state
            .boosting
            .prepare_value_change(beneficiary, block, before, after)?;

        let key = (*beneficiary, *asset);
        let mut deposit = state.token_deposits.get(&key).copied().unwrap_or_default();
        deposit.amount = deposit
            .amount
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        deposit.value = deposit
            .value
            .checked_add(value)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total = state
            .token_totals
            .get(asset)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.assets.debit(payer, asset, amount)?;
        self.pay(beneficiary, boost_update.payout);

        state.apply(Some(ledger_update), Some(boost_update));
        state.token_deposits.insert(key, deposit);
        state.token_totals.insert(*asset, total);
        debug!(payer = %payer, user = %beneficiary, asset = %asset, amount, value, now, "deposit recorded");
        Ok(value)
    }

    /// Withdraw `amount` of `asset` and return the USD value removed.
    ///
    /// The value removed is the same fraction of the credited value as
    /// `amount` is of the user's token deposit.
    pub fn withdraw(&self, user: &AccountId, asset: &AssetId, amount: u128) -> Result<u128, AccrueError> {
        self.try_withdraw(user, asset, amount)
            .inspect_err(|e| warn!(user = %user, asset = %asset, amount, error = %e, "withdraw rejected"))
    }

    fn try_withdraw(&self, user: &AccountId, asset: &AssetId, amount: u128) -> Result<u128, AccrueError> {
        let mut state = self.state.write();
        let now = self.clock.now();
        let block = self.pending_block();

        if amount == 0 {
            return Err(LedgerError::InvalidAmount.into());
        }
        let key = (*user, *asset);
        let deposit = state.token_deposits.get(&key).copied().unwrap_or_default();
        if amount > deposit.amount {
            return Err(LedgerError::InsufficientBalance {
                have: deposit.amount,
                need: amount,
            }
            .into());
        }
        let value = if amount == deposit.amount {
            deposit.value
        } else {
            mul_div(deposit.value, amount, deposit.amount).ok_or(LedgerError::ArithmeticOverflow)?
        };

        let ledger_update = state.ledger.prepare_withdraw(user, value, now)?;
        let before = state.ledger.value_balance(user);
        let after = balance_after(&ledger_update, before);
        let boost_update = state.boosting.prepare_value_change(user, block, before, after)?;

        let remaining = TokenDeposit {
            amount: deposit.amount - amount,
            value: deposit.value - value,
        };
        let total = state
            .token_totals
            .get(asset)
            .copied()
            .unwrap_or(0)
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.assets.credit(user, asset, amount);
        self.pay(user, boost_update.payout);

        state.apply(Some(ledger_update), Some(boost_update));
        if remaining == TokenDeposit::default() {
            state.token_deposits.remove(&key);
        } else {
            state.token_deposits.insert(key, remaining);
        }
        state.token_totals.insert(*asset, total);
        debug!(user = %user, asset = %asset, amount, value, now, "withdrawal recorded");
        Ok(value)
    }

    // --- Distribution rewards ---

    /// Fund and record a reward injection. Returns its index in the history.
    pub fn inject_reward(&self, funder: &AccountId, amount: u128) -> Result<usize, AccrueError> {
        self.try_inject_reward(funder, amount)
            .inspect_err(|e| warn!(funder = %funder, amount, error = %e, "injection rejected"))
    }

    fn try_inject_reward(&self, funder: &AccountId, amount: u128) -> Result<usize, AccrueError> {
        let mut state = self.state.write();
        let now = self.clock.now();

        let update = state.ledger.prepare_injection(amount, now)?;
        let coefficient = update.injection.map_or(0, |r| r.coefficient);

        self.assets.debit(funder, &self.config.reward_asset, amount)?;

        state.apply(Some(update), None);
        let index = state.ledger.history().len() - 1;
        info!(funder = %funder, amount, coefficient, index, now, "reward injected");
        Ok(index)
    }

    /// Pay out the user's settled and earned distribution reward.
    pub fn claim(&self, user: &AccountId) -> Result<u128, AccrueError> {
        self.try_claim(user)
            .inspect_err(|e| warn!(user = %user, error = %e, "claim rejected"))
    }

    fn try_claim(&self, user: &AccountId) -> Result<u128, AccrueError> {
        let mut state = self.state.write();
        let now = self.clock.now();

        let update = state.ledger.prepare_claim(user, now)?;
        let payout = update.payout;

        self.pay(user, payout);

        state.apply(Some(update), None);
        info!(user = %user, payout, now, "reward claimed");
        Ok(payout)
    }

    // --- Boosting ---

    /// Stake `amount` of the reward token. Returns the boosting reward paid.
    pub fn deposit_boost(&self, user: &AccountId, amount: u128) -> Result<u128, AccrueError> {
        self.try_deposit_boost(user, amount)
            .inspect_err(|e| warn!(user = %user, amount, error = %e, "boost deposit rejected"))
    }

    fn try_deposit_boost(&self, user: &AccountId, amount: u128) -> Result<u128, AccrueError> {
        let mut state = self.state.write();
        let block = self.pending_block();

        let update = state
            .boosting
            .prepare_deposit_boost(user, amount, block, &state.ledger)?;
        let payout = update.payout;

        self.assets.debit(user, &self.config.reward_asset, amount)?;
        self.pay(user, payout);

        state.apply(None, Some(update));
        debug!(user = %user, amount, payout, block, "boost deposited");
        Ok(payout)
    }

    /// Unstake `amount` of the reward token. Returns the boosting reward paid.
    pub fn withdraw_boost(&self, user: &AccountId, amount: u128) -> Result<u128, AccrueError> {
        self.try_withdraw_boost(user, amount)
            .inspect_err(|e| warn!(user = %user, amount, error = %e, "boost withdrawal rejected"))
    }

    fn try_withdraw_boost(&self, user: &AccountId, amount: u128) -> Result<u128, AccrueError> {
        let mut state = self.state.write();
        let block = self.pending_block();

        let update = state
            .boosting
            .prepare_withdraw_boost(user, amount, block, &state.ledger)?;
        let payout = update.payout;

        self.pay(user, update.released);
        self.pay(user, payout);

        state.apply(None, Some(update));
        debug!(user = %user, amount, payout, block, "boost withdrawn");
        Ok(payout)
    }

    pub fn claim_boost(&self, user: &AccountId) -> Result<u128, AccrueError> {
        self.try_claim_boost(user)
            .inspect_err(|e| warn!(user = %user, error = %e, "boost claim rejected"))
    }

    fn try_claim_boost(&self, user: &AccountId) -> Result<u128, AccrueError> {
        let mut state = self.state.write();
        let block = self.pending_block();

        let update = state.boosting.prepare_claim_boost(user, block, &state.ledger)?;
        let payout = update.payout;

        self.pay(user, payout);

        state.apply(None, Some(update));
        info!(user = %user, payout, block, "boost reward claimed");
        Ok(payout)
    }

    /// Replace the boosting policy from the pending block on.
    pub fn set_boost_params(&self, params: BoostParams) -> Result<(), AccrueError> {
        self.try_set_boost_params(params)
            .inspect_err(|e| warn!(error = %e, "boost params rejected"))
    }

    fn try_set_boost_params(&self, params: BoostParams) -> Result<(), AccrueError> {
        let mut state = self.state.write();
        let block = self.pending_block();

        let update = state.boosting.prepare_set_params(params, block)?;

        state.apply(None, Some(update));
        info!(
            max_rate_per_usd = params.max_rate_per_usd,
            reward_per_block = params.reward_per_block,
            max_active = params.max_active,
            block,
            "boost params updated"
        );
        Ok(())
    }

    // --- Queries ---

    pub fn value_balance(&self, user: &AccountId) -> u128 {
        self.state.read().ledger.value_balance(user)
    }

    pub fn total_value(&self) -> u128 {
        self.state.read().ledger.total_value()
    }

    pub fn global(&self) -> GlobalState {
        *self.state.read().ledger.global()
    }

    /// Reward earned since the user's last settlement.
    pub fn earned(&self, user: &AccountId) -> Result<u128, AccrueError> {
        Ok(self.state.read().ledger.earned(user)?)
    }

    /// Distribution reward a claim would pay now.
    pub fn claimable_reward(&self, user: &AccountId) -> Result<u128, AccrueError> {
        Ok(self.state.read().ledger.claimable(user)?)
    }

    /// Boosting reward a claim in the pending block would pay.
    pub fn boost_claimable(&self, user: &AccountId) -> Result<u128, AccrueError> {
        let state = self.state.read();
        let sealed = self.clock.block_number();
        Ok(state.boosting.get_claimable(user, sealed, &state.ledger)?)
    }

    pub fn boost_deposit(&self, user: &AccountId) -> u128 {
        self.state.read().boosting.deposited(user)
    }

    pub fn boost_state(&self, user: &AccountId) -> BoostState {
        self.state.read().boosting.state(user)
    }

    pub fn boost_params(&self) -> BoostParams {
        *self.state.read().boosting.params()
    }

    /// Effective boosting stake under the current policy.
    pub fn effective_stake(&self, user: &AccountId) -> u128 {
        let state = self.state.read();
        state.boosting.effective_stake_of(user, &state.ledger)
    }

    pub fn token_deposit(&self, user: &AccountId, asset: &AssetId) -> u128 {
        self.state
            .read()
            .token_deposits
            .get(&(*user, *asset))
            .map_or(0, |d| d.amount)
    }

    pub fn total_token_deposit(&self, asset: &AssetId) -> u128 {
        self.state.read().token_totals.get(asset).copied().unwrap_or(0)
    }

    pub fn injection_count(&self) -> usize {
        self.state.read().ledger.history().len()
    }

    pub fn injection(&self, index: usize) -> Option<InjectionRecord> {
        self.state.read().ledger.history().get(index).copied()
    }
}
