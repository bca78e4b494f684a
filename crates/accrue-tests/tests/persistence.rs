//! Snapshot and configuration round trips through the filesystem.

use accrue_core::constants::PRECISION;
use accrue_core::error::AccrueError;
use accrue_core::types::BoostParams;
use accrue_tests::helpers::*;
use accrue_vault::{SnapshotStore, Vault, VaultConfig};

const ONE: u128 = PRECISION;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config_in(dir: &tempfile::TempDir) -> VaultConfig {
    VaultConfig {
        data_dir: dir.path().join("vault"),
        reward_asset: blid(),
        ..VaultConfig::default()
    }
}

/// Reopen the fixture's vault from its snapshot file over the same collaborators.
fn reopen(fx: &Fixture, config: VaultConfig) -> Vault {
    Vault::open(config, fx.assets.clone(), fx.registry.clone(), fx.clock.clone()).unwrap()
}

/// Deposits, an injection, a claim and a boost stake.
fn populate(fx: &Fixture) {
    fx.vault.deposit(&alexander(), &usdt(), 3 * ONE).unwrap();
    fx.vault.deposit(&dmitry(), &usdc(), ONE).unwrap();
    fx.vault.deposit_boost(&alexander(), 4 * ONE).unwrap();
    fx.wait(hours(5));
    fx.vault.inject_reward(&strategy(), 10 * ONE).unwrap();
    fx.vault.claim(&dmitry()).unwrap();
    fx.wait(hours(1));
    fx.vault.withdraw(&alexander(), &usdt(), ONE).unwrap();
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[test]
fn open_without_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::with_config(config_in(&dir));
    let vault = reopen(&fx, config_in(&dir));
    assert_eq!(vault.total_value(), 0);
    assert_eq!(vault.injection_count(), 0);
    assert_eq!(vault.boost_params(), BoostParams::default());
}

#[test]
fn reopened_vault_answers_like_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::with_config(config_in(&dir));
    populate(&fx);
    fx.vault.save_snapshot().unwrap();
    assert!(config_in(&dir).snapshot_path().exists());

    let reopened = reopen(&fx, config_in(&dir));
    assert_eq!(reopened.snapshot(), fx.vault.snapshot());
    for user in [alexander(), dmitry(), victor()] {
        assert_eq!(reopened.value_balance(&user), fx.vault.value_balance(&user));
        assert_eq!(
            reopened.claimable_reward(&user).unwrap(),
            fx.vault.claimable_reward(&user).unwrap()
        );
        assert_eq!(
            reopened.boost_claimable(&user).unwrap(),
            fx.vault.boost_claimable(&user).unwrap()
        );
        assert_eq!(reopened.token_deposit(&user, &usdt()), fx.vault.token_deposit(&user, &usdt()));
    }
    assert_eq!(reopened.total_token_deposit(&usdt()), 2 * ONE);
}

#[test]
fn reopened_vault_continues_the_history() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::with_config(config_in(&dir));
    populate(&fx);
    fx.vault.save_snapshot().unwrap();
    let reopened = reopen(&fx, config_in(&dir));

    // Both vaults see the same next injection and pay the same claims.
    // They share one asset ledger, so compare payouts, not balances.
    fx.wait(hours(2));
    let original = fx.vault.inject_reward(&strategy(), 5 * ONE).unwrap();
    let restored = reopened.inject_reward(&strategy(), 5 * ONE).unwrap();
    assert_eq!(original, restored);
    assert_eq!(reopened.injection(restored), fx.vault.injection(original));

    for user in [alexander(), dmitry()] {
        assert_eq!(reopened.claim(&user).unwrap(), fx.vault.claim(&user).unwrap());
    }
    assert_eq!(
        reopened.claim_boost(&alexander()).unwrap(),
        fx.vault.claim_boost(&alexander()).unwrap()
    );
}

#[test]
fn later_snapshot_replaces_earlier_one() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::with_config(config_in(&dir));
    fx.vault.deposit(&alexander(), &usdc(), ONE).unwrap();
    fx.vault.save_snapshot().unwrap();
    fx.vault.deposit(&dmitry(), &usdc(), ONE).unwrap();
    fx.vault.save_snapshot().unwrap();

    let reopened = reopen(&fx, config_in(&dir));
    assert_eq!(reopened.total_value(), 2 * ONE);
}

#[test]
fn snapshot_policy_wins_over_config() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::with_config(config_in(&dir));
    let tuned = BoostParams {
        reward_per_block: 7 * ONE,
        ..BoostParams::default()
    };
    fx.vault.set_boost_params(tuned).unwrap();
    fx.vault.save_snapshot().unwrap();

    let reopened = reopen(&fx, config_in(&dir));
    assert_eq!(reopened.boost_params(), tuned);
}

#[test]
fn corrupt_snapshot_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    std::fs::create_dir_all(&config.data_dir).unwrap();
    std::fs::write(config.snapshot_path(), b"not a snapshot").unwrap();

    let fx = Fixture::with_config(config.clone());
    let err = Vault::open(config, fx.assets.clone(), fx.registry.clone(), fx.clock.clone())
        .err()
        .unwrap();
    assert!(matches!(err, AccrueError::Storage(_)));
}

#[test]
fn store_reads_what_the_vault_wrote() {
    let dir = tempfile::tempdir().unwrap();
    let fx = Fixture::with_config(config_in(&dir));
    populate(&fx);
    fx.vault.save_snapshot().unwrap();

    let store = SnapshotStore::new(config_in(&dir).snapshot_path());
    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.injections.len(), 1);
    assert_eq!(snapshot.boost_accounts.len(), 1);
    assert_eq!(snapshot, fx.vault.snapshot());
}

// ---------------------------------------------------------------------------
// Configuration files
// ---------------------------------------------------------------------------

#[test]
fn config_file_drives_a_fresh_vault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accrue.json");
    let json = format!(
        r#"{{
            "data_dir": {data_dir:?},
            "reward_asset": "{reward}",
            "boost": {{
                "max_rate_per_usd": 2000000000000000000,
                "reward_per_block": 5000000000000000000,
                "max_active": 500000000000000000000
            }}
        }}"#,
        data_dir = dir.path().join("data"),
        reward = blid(),
    );
    std::fs::write(&path, json).unwrap();

    let config = VaultConfig::from_json_file(&path).unwrap();
    assert_eq!(config.reward_asset, blid());
    assert_eq!(config.snapshot_path(), dir.path().join("data").join("vault.snapshot"));

    let fx = Fixture::new();
    let vault = Vault::open(config, fx.assets.clone(), fx.registry.clone(), fx.clock.clone()).unwrap();
    assert_eq!(vault.boost_params().reward_per_block, 5 * ONE);

    vault.deposit(&alexander(), &usdc(), ONE).unwrap();
    vault.deposit_boost(&alexander(), 3 * ONE).unwrap();
    assert_eq!(vault.effective_stake(&alexander()), 2 * ONE);
    fx.clock.advance_blocks(1);
    assert_eq!(vault.boost_claimable(&alexander()).unwrap(), 10 * ONE);
}

#[test]
fn unreadable_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = VaultConfig::from_json_file(&path).unwrap_err();
    assert!(matches!(err, AccrueError::Config(_)));
}
