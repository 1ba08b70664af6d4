pub mod error;
pub mod transaction;

pub use error::TransactionError;
pub use transaction::Transaction;

/// Sender literal used by bootstrap records that mint the initial balances.
/// Not a public key; signature verification always fails for it.
pub const GENESIS: &str = "GENESIS";

/// Recipient literal that routes a transfer into the sender's stake instead
/// of a peer's balance.
pub const STAKE: &str = "stake";
