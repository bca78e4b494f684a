//! Block-weighted boosting ledger.
//!
//! A second reward stream paid in the reward token. Each user's effective
//! stake is `min(value_balance * max_rate_per_usd, deposited)`; the pool
//! accrues `reward_per_block` per unit of effective stake per block into
//! `acc_reward_per_share`, scaled down pro-rata while the sum of stakes
//! exceeds `max_active`. Users settle against the accumulator on every
//! interaction, so the cost of a settlement is O(1).
//!
//! The pool scales accrual by `active_supply`, the sum of the stakes
//! snapshotted at each user's last settlement. A settlement pays
//! `min(effective_stake, active_stake)` over the unsettled interval, so the
//! paid stakes never sum past the scaling base and emission stays under
//! `reward_per_block * max_active` per block. A lower `max_rate_per_usd`
//! therefore applies to the whole unsettled interval, while a higher one
//! only counts from the user's next settlement. `reward_per_block` changes
//! are never retroactive because setting the policy first accrues the pool
//! up to that block.

use std::collections::BTreeMap;

use tracing::debug;

use accrue_core::constants::PRECISION;
use accrue_core::error::BoostError;
use accrue_core::math::{apply_rate, mul_div};
use accrue_core::traits::ValueBalances;
use accrue_core::types::{AccountId, BoostParams, BoostPool, BoostState, BoostingAccount};

/// The record writes of one prepared boosting mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "a prepared update does nothing until applied"]
pub struct BoostUpdate {
    pub pool: BoostPool,
    pub account: Option<(AccountId, BoostingAccount)>,
    /// Pending reward paid to the user by this mutation.
    pub payout: u128,
    /// Stake returned to the user (boost withdrawals only).
    pub released: u128,
}

/// Effective stake of a user holding `value_balance` with `deposited` boost stake.
pub fn effective_stake(value_balance: u128, deposited: u128, params: &BoostParams) -> u128 {
    // A cap too large for u128 cannot bind.
    apply_rate(value_balance, params.max_rate_per_usd).map_or(deposited, |cap| cap.min(deposited))
}

#[derive(Clone, Debug, Default)]
pub struct BoostingLedger {
    pool: BoostPool,
    accounts: BTreeMap<AccountId, BoostingAccount>,
}

impl BoostingLedger {
    pub fn new(params: BoostParams) -> Self {
        Self {
            pool: BoostPool {
                params,
                ..BoostPool::default()
            },
            accounts: BTreeMap::new(),
        }
    }

    /// Rebuild a ledger from persisted records.
    pub fn from_parts(
        pool: BoostPool,
        accounts: impl IntoIterator<Item = (AccountId, BoostingAccount)>,
    ) -> Self {
        Self {
            pool,
            accounts: accounts.into_iter().collect(),
        }
    }

    pub fn pool(&self) -> &BoostPool {
        &self.pool
    }

    pub fn params(&self) -> &BoostParams {
        &self.pool.params
    }

    pub fn account(&self, user: &AccountId) -> Option<&BoostingAccount> {
        self.accounts.get(user)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, &BoostingAccount)> {
        self.accounts.iter()
    }

    pub fn deposited(&self, user: &AccountId) -> u128 {
        self.accounts.get(user).map_or(0, |a| a.deposited)
    }

    pub fn state(&self, user: &AccountId) -> BoostState {
        self.accounts
            .get(user)
            .map_or(BoostState::NoStake, BoostingAccount::state)
    }

    // --- Queries ---

    /// Reward `user` would be paid by a mutation executing in block
    /// `sealed_block + 1`.
    pub fn get_claimable(
        &self,
        user: &AccountId,
        sealed_block: u64,
        balances: &impl ValueBalances,
    ) -> Result<u128, BoostError> {
        let Some(account) = self.accounts.get(user) else {
            return Ok(0);
        };
        let pending_block = sealed_block
            .checked_add(1)
            .ok_or(BoostError::ArithmeticOverflow)?;
        let pool = self.accrued_pool(pending_block)?;
        pending_reward(&pool, account, balances.value_balance(user))
    }

    /// Effective stake of `user` under the current policy.
    pub fn effective_stake_of(&self, user: &AccountId, balances: &impl ValueBalances) -> u128 {
        effective_stake(
            balances.value_balance(user),
            self.deposited(user),
            &self.pool.params,
        )
    }

    /// The pool accrued up to `block`.
    fn accrued_pool(&self, block: u64) -> Result<BoostPool, BoostError> {
        let mut pool = self.pool;
        if block < pool.last_reward_block {
            return Err(BoostError::BlockWentBackwards {
                last: pool.last_reward_block,
                now: block,
            });
        }
        if pool.active_supply > 0 {
            let blocks = u128::from(block - pool.last_reward_block);
            let mut increment = pool
                .params
                .reward_per_block
                .checked_mul(blocks)
                .ok_or(BoostError::ArithmeticOverflow)?;
            if pool.active_supply > pool.params.max_active {
                increment = mul_div(increment, pool.params.max_active, pool.active_supply)
                    .ok_or(BoostError::ArithmeticOverflow)?;
            }
            pool.acc_reward_per_share = pool
                .acc_reward_per_share
                .checked_add(increment)
                .ok_or(BoostError::ArithmeticOverflow)?;
        }
        pool.last_reward_block = block;
        Ok(pool)
    }

    // --- Prepare ---

    /// Stake `amount` of the reward token. Requires an underlying deposit.
    pub fn prepare_deposit_boost(
        &self,
        user: &AccountId,
        amount: u128,
        block: u64,
        balances: &impl ValueBalances,
    ) -> Result<BoostUpdate, BoostError> {
        if amount == 0 {
            return Err(BoostError::InvalidAmount);
        }
        let value_balance = balances.value_balance(user);
        if value_balance == 0 {
            return Err(BoostError::NoUnderlyingDeposit);
        }
        self.settle(user, block, value_balance, value_balance, |deposited| {
            deposited
                .checked_add(amount)
                .ok_or(BoostError::ArithmeticOverflow)
        })
    }

    pub fn prepare_withdraw_boost(
        &self,
        user: &AccountId,
        amount: u128,
        block: u64,
        balances: &impl ValueBalances,
    ) -> Result<BoostUpdate, BoostError> {
        if amount == 0 {
            return Err(BoostError::InvalidAmount);
        }
        let have = self.deposited(user);
        if amount > have {
            return Err(BoostError::InsufficientBoostBalance { have, need: amount });
        }
        let value_balance = balances.value_balance(user);
        let mut update = self.settle(user, block, value_balance, value_balance, |deposited| {
            Ok(deposited - amount)
        })?;
        update.released = amount;
        Ok(update)
    }

    pub fn prepare_claim_boost(
        &self,
        user: &AccountId,
        block: u64,
        balances: &impl ValueBalances,
    ) -> Result<BoostUpdate, BoostError> {
        if !self.accounts.contains_key(user) {
            return Err(BoostError::NothingToClaim);
        }
        let value_balance = balances.value_balance(user);
        let update = self.settle(user, block, value_balance, value_balance, Ok)?;
        if update.payout == 0 {
            return Err(BoostError::NothingToClaim);
        }
        Ok(update)
    }

    /// Settle and pay `user` before their value balance moves from `before`
    /// to `after`, then re-snapshot their stake against `after`.
    ///
    /// Users without a boosting account only advance the pool.
    pub fn prepare_value_change(
        &self,
        user: &AccountId,
        block: u64,
        before: u128,
        after: u128,
    ) -> Result<BoostUpdate, BoostError> {
        if !self.accounts.contains_key(user) {
            return Ok(BoostUpdate {
                pool: self.accrued_pool(block)?,
                account: None,
                payout: 0,
                released: 0,
            });
        }
        self.settle(user, block, before, after, Ok)
    }

    /// Replace the policy after accruing the pool to `block` under the old one.
    pub fn prepare_set_params(
        &self,
        params: BoostParams,
        block: u64,
    ) -> Result<BoostUpdate, BoostError> {
        let mut pool = self.accrued_pool(block)?;
        pool.params = params;
        Ok(BoostUpdate {
            pool,
            account: None,
            payout: 0,
            released: 0,
        })
    }

    /// Accrue the pool, compute the pending reward at the stake held before
    /// the change, then apply the stake change and re-snapshot.
    fn settle(
        &self,
        user: &AccountId,
        block: u64,
        value_before: u128,
        value_after: u128,
        change: impl FnOnce(u128) -> Result<u128, BoostError>,
    ) -> Result<BoostUpdate, BoostError> {
        let mut pool = self.accrued_pool(block)?;
        let mut account = self.accounts.get(user).copied().unwrap_or_default();

        let payout = pending_reward(&pool, &account, value_before)?;

        let deposited = change(account.deposited)?;
        pool.total_deposited = pool
            .total_deposited
            .checked_sub(account.deposited)
            .and_then(|rest| rest.checked_add(deposited))
            .ok_or(BoostError::ArithmeticOverflow)?;
        account.deposited = deposited;

        let active = effective_stake(value_after, deposited, &pool.params);
        pool.active_supply = pool
            .active_supply
            .saturating_sub(account.active_stake)
            .checked_add(active)
            .ok_or(BoostError::ArithmeticOverflow)?;
        account.active_stake = active;
        account.reward_debt = pool.acc_reward_per_share;

        Ok(BoostUpdate {
            pool,
            account: Some((*user, account)),
            payout,
            released: 0,
        })
    }

    // --- Apply ---

    pub fn apply(&mut self, update: BoostUpdate) {
        self.pool = update.pool;
        if let Some((user, account)) = update.account {
            debug!(
                user = %user,
                deposited = account.deposited,
                active_stake = account.active_stake,
                payout = update.payout,
                "boosting account settled"
            );
            self.accounts.insert(user, account);
        }
    }
}

fn pending_reward(
    pool: &BoostPool,
    account: &BoostingAccount,
    value_balance: u128,
) -> Result<u128, BoostError> {
    let stake = effective_stake(value_balance, account.deposited, &pool.params)
        .min(account.active_stake);
    let accrued = pool
        .acc_reward_per_share
        .saturating_sub(account.reward_debt);
    mul_div(stake, accrued, PRECISION).ok_or(BoostError::ArithmeticOverflow)
}
