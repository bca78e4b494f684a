//! Error types for the Accrue ledger.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("amount must be positive")] InvalidAmount,
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("no depositors to distribute to")] NoDepositors,
    #[error("zero dollar-time elapsed since the previous injection")] DegenerateInterval,
    #[error("nothing to claim")] NothingToClaim,
    #[error("time went backwards: last update {last}, now {now}")] TimeWentBackwards { last: u64, now: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoostError {
    #[error("amount must be positive")] InvalidAmount,
    #[error("insufficient boost balance: have {have}, need {need}")] InsufficientBoostBalance { have: u128, need: u128 },
    #[error("no underlying deposit")] NoUnderlyingDeposit,
    #[error("nothing to claim")] NothingToClaim,
    #[error("block went backwards: last reward block {last}, now {now}")] BlockWentBackwards { last: u64, now: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("unknown asset: {0}")] UnknownAsset(String),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u128, need: u128 },
    #[error("insufficient allowance: allowed {allowed}, need {need}")] InsufficientAllowance { allowed: u128, need: u128 },
    #[error("unsupported token parameters: {0}")] UnsupportedToken(String),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug)]
pub enum AccrueError {
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Boost(#[from] BoostError),
    #[error(transparent)] Asset(#[from] AssetError),
    #[error("storage: {0}")] Storage(String),
    #[error("config: {0}")] Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_amounts() {
        let e = LedgerError::InsufficientBalance { have: 5, need: 7 };
        assert_eq!(e.to_string(), "insufficient balance: have 5, need 7");
        let e = BoostError::InsufficientBoostBalance { have: 1, need: 2 };
        assert_eq!(e.to_string(), "insufficient boost balance: have 1, need 2");
    }

    #[test]
    fn umbrella_is_transparent() {
        let e: AccrueError = LedgerError::NoDepositors.into();
        assert_eq!(e.to_string(), "no depositors to distribute to");
        let e: AccrueError = AssetError::UnknownAsset("ab".into()).into();
        assert_eq!(e.to_string(), "unknown asset: ab");
        assert!(matches!(e, AccrueError::Asset(AssetError::UnknownAsset(_))));
    }
}
