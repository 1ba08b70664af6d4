use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transaction error: {0}")]
    Transaction(#[from] sn_transaction::TransactionError),
}
