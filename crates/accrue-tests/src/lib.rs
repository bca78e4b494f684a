//! Scenario and property test suite for Accrue.
//!
//! The integration tests under `tests/` drive a full [`accrue_vault::Vault`]
//! through multi-user deposit, injection, withdrawal and boosting histories
//! and compare the payouts against an independent floating-point model.

pub mod helpers;
