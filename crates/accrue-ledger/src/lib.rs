//! # accrue-ledger
//! The dollar-time distribution ledger and the block-weighted boosting
//! ledger. Both are plain state machines: callers supply time and block
//! numbers and serialize access themselves.

pub mod boosting;
pub mod distribution;

pub use boosting::{BoostUpdate, BoostingLedger};
pub use distribution::{DollarTimeLedger, LedgerUpdate};
