//! # accrue-core
//! Records, collaborator traits, fixed-point math and the injection history
//! shared by the Accrue ledgers.

pub mod constants;
pub mod error;
pub mod history;
pub mod math;
pub mod traits;
pub mod types;
