//! Shared test helpers for scenario and property tests.

use std::collections::HashMap;
use std::sync::Arc;

use accrue_core::constants::SECS_PER_HOUR;
use accrue_core::traits::TokenInfo;
use accrue_core::types::{AccountId, AssetId};
use accrue_vault::memory::{ManualClock, MemoryAssets, MemoryRegistry};
use accrue_vault::{Vault, VaultConfig};

/// Absolute tolerance, in reward units, between ledger payouts and
/// [`ReferenceModel`] predictions.
pub const TOLERANCE: f64 = 1e3;

/// Start of every fixture clock.
pub const T0: u64 = 1_700_000_000;

/// First sealed block of every fixture clock.
pub const B0: u64 = 1_000;

/// Token balance minted to every fixture account for every fixture asset.
pub const STARTING_FUNDS: u128 = 1_000_000_000_000_000_000_000_000;

/// Reward tokens placed in the pool up front to fund boosting payouts.
pub const BOOST_RESERVE: u128 = 1_000_000 * STARTING_FUNDS;

/// USD rate of the slightly depegged stablecoin, 8 decimals.
pub const USDT_RATE: u128 = 99_997_069;

/// USD rate of the token registered mid-scenario, 8 decimals.
pub const USDTN2_RATE: u128 = 199_994_138;

pub fn account(seed: u8) -> AccountId {
    AccountId([seed; 20])
}

pub fn alexander() -> AccountId {
    account(0xA1)
}

pub fn dmitry() -> AccountId {
    account(0xD1)
}

pub fn victor() -> AccountId {
    account(0x71)
}

/// Account that funds reward injections.
pub fn strategy() -> AccountId {
    account(0x5E)
}

pub fn usdt() -> AssetId {
    AssetId([0x55; 20])
}

pub fn usdc() -> AssetId {
    AssetId([0xC0; 20])
}

pub fn usdtn2() -> AssetId {
    AssetId([0x52; 20])
}

/// Reward token, also the boosting stake.
pub fn blid() -> AssetId {
    AssetId([0xB1; 20])
}

pub fn stable(usd_rate: u128) -> TokenInfo {
    TokenInfo {
        decimals: 18,
        usd_rate,
        rate_decimals: 8,
    }
}

pub fn hours(n: u64) -> u64 {
    n * SECS_PER_HOUR
}

/// Route vault logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A vault over in-memory collaborators with three funded users.
///
/// `usdt` and `usdc` are registered up front; `usdtn2` is left for tests
/// that add a token mid-scenario through [`Fixture::registry`].
pub struct Fixture {
    pub vault: Vault,
    pub assets: Arc<MemoryAssets>,
    pub registry: Arc<MemoryRegistry>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(VaultConfig {
            reward_asset: blid(),
            ..VaultConfig::default()
        })
    }

    pub fn with_config(config: VaultConfig) -> Self {
        init_tracing();
        let assets = Arc::new(MemoryAssets::new());
        let registry = Arc::new(MemoryRegistry::new());
        registry.register(usdt(), stable(USDT_RATE));
        registry.register(usdc(), stable(100_000_000));
        let clock = Arc::new(ManualClock::new(T0, B0));

        for who in [alexander(), dmitry(), victor(), strategy()] {
            for asset in [usdt(), usdc(), usdtn2(), blid()] {
                assets.fund(&who, &asset, STARTING_FUNDS);
            }
        }
        assets.reserve(&blid(), BOOST_RESERVE);

        let vault = Vault::new(config, assets.clone(), registry.clone(), clock.clone());
        Self {
            vault,
            assets,
            registry,
            clock,
        }
    }

    /// Reward tokens received by `who` since the fixture was built.
    pub fn reward_received(&self, who: &AccountId) -> u128 {
        self.assets.balance(who, &blid()).saturating_sub(STARTING_FUNDS)
    }

    /// Move the clock forward by `secs` and one block.
    pub fn wait(&self, secs: u64) {
        self.clock.advance_secs(secs);
        self.clock.advance_blocks(1);
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Reference model
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct ModelUser {
    balance: f64,
    /// Integral of balance over time since the last injection.
    weight: f64,
    earned: f64,
    claimed: f64,
}

/// Floating-point model of time-weighted distribution.
///
/// Integrates every balance over time directly: an injection splits its
/// amount by each user's integral since the previous injection, then resets
/// the integrals. It shares no code or intermediate values with the ledger.
#[derive(Debug, Default, Clone)]
pub struct ReferenceModel {
    users: HashMap<AccountId, ModelUser>,
    last_time: u64,
}

impl ReferenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(&mut self, now: u64) {
        let dt = now.saturating_sub(self.last_time) as f64;
        for user in self.users.values_mut() {
            user.weight += user.balance * dt;
        }
        self.last_time = self.last_time.max(now);
    }

    pub fn deposit(&mut self, who: AccountId, value: u128, now: u64) {
        self.advance(now);
        self.users.entry(who).or_default().balance += value as f64;
    }

    pub fn withdraw(&mut self, who: AccountId, value: u128, now: u64) {
        self.advance(now);
        self.users.entry(who).or_default().balance -= value as f64;
    }

    pub fn distribute(&mut self, amount: u128, now: u64) {
        self.advance(now);
        let total: f64 = self.users.values().map(|u| u.weight).sum();
        if total <= 0.0 {
            return;
        }
        for user in self.users.values_mut() {
            user.earned += amount as f64 * user.weight / total;
            user.weight = 0.0;
        }
    }

    /// Unclaimed reward of `who`.
    pub fn earned(&self, who: &AccountId) -> f64 {
        self.users.get(who).map_or(0.0, |u| u.earned)
    }

    /// Move the unclaimed reward into the claimed total and return it.
    pub fn claim(&mut self, who: &AccountId) -> f64 {
        let user = self.users.entry(*who).or_default();
        let paid = user.earned;
        user.claimed += paid;
        user.earned = 0.0;
        paid
    }

    /// Everything ever paid to `who`.
    pub fn claimed(&self, who: &AccountId) -> f64 {
        self.users.get(who).map_or(0.0, |u| u.claimed)
    }

    pub fn balance(&self, who: &AccountId) -> f64 {
        self.users.get(who).map_or(0.0, |u| u.balance)
    }
}

/// Assert `actual` is within [`TOLERANCE`] of `expected`.
#[track_caller]
pub fn assert_close(actual: u128, expected: f64) {
    let diff = (actual as f64 - expected).abs();
    assert!(
        diff <= TOLERANCE,
        "expected ~{expected}, got {actual} (off by {diff})"
    );
}
