pub mod account;
pub mod chain;
pub mod error;
pub mod record;

pub use account::Account;
pub use chain::{Chain, Validity};
pub use error::ChainError;
pub use record::{validators_root, CommittedRecord};

/// Stake threshold below which a peer is not counted as a validator.
pub const MIN_STAKE: i64 = 1_000_000_000;

/// Flat fee deducted from every transfer and split among the validators
/// that voted it through.
pub const FEE: i64 = 100;

/// Stake deducted from a validator whose recorded vote dissented from the
/// committed outcome.
pub const FINE: i64 = 10_000;

/// Tolerated clock skew, in seconds, for the transaction timestamp gates.
pub const TIMESTAMP_RANGE: i64 = 60;

/// How long one voting round may run before non-voters are disconnected
/// and the candidate is rebroadcast.
pub const MAX_VOTE_TIME_MS: u64 = 10_000;

/// Number of leading records exempt from signature checks so the initial
/// balances can be minted without a signing key.
pub const GENESIS_WINDOW: usize = 6;
