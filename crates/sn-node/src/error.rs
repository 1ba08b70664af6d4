use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] sn_crypto::CryptoError),

    #[error("transaction error: {0}")]
    Transaction(#[from] sn_transaction::TransactionError),

    #[error("chain error: {0}")]
    Chain(#[from] sn_chain::ChainError),

    #[error("sync error: {0}")]
    Sync(#[from] sn_sync::SyncError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
