//! Ledger constants. All value amounts carry 18 implied decimals.

/// Fixed-point scale shared by values, rewards, coefficients and rates (10^18).
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Decimal places of the normalized USD value unit.
pub const VALUE_DECIMALS: u32 = 18;

/// One whole unit of normalized value (1 USD).
pub const ONE_USD: u128 = PRECISION;

/// Largest token decimals the registry accepts.
///
/// Normalization scales amounts up by `10^(VALUE_DECIMALS - decimals)`, so a
/// token may not carry more decimals than the value unit itself.
pub const MAX_TOKEN_DECIMALS: u32 = VALUE_DECIMALS;

/// Largest rate decimals the registry accepts (`10^38` still fits in u128).
pub const MAX_RATE_DECIMALS: u32 = 38;

/// Default boosting cap: reward-token stake allowed per USD of deposit (3.0).
pub const DEFAULT_MAX_RATE_PER_USD: u128 = 3 * PRECISION;

/// Default boosting emission per block per unit of effective stake (10.0).
pub const DEFAULT_REWARD_PER_BLOCK: u128 = 10 * PRECISION;

/// Default pool-wide ceiling on the sum of effective stakes.
pub const DEFAULT_MAX_ACTIVE: u128 = 1_000 * PRECISION;

/// Seconds in one hour, used by tests and scenario helpers.
pub const SECS_PER_HOUR: u64 = 3_600;
