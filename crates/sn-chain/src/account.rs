use serde::{Deserialize, Serialize};

/// Balance, stake, and nonce for one public key.
///
/// Accounts are created the first time a transition touches them and are
/// never deleted; a fine can push `stake` below zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: i64,
    pub stake: i64,
    pub nonce: u64,
}
