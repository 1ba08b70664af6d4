use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sn_crypto::sha256_hex;
use sn_transaction::{Transaction, GENESIS};

/// One committed slot: the agreed transaction plus the per-validator vote
/// that carried it, committed to by `validators_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedRecord {
    pub transaction: Transaction,

    /// Public key → the vote that validator cast.
    pub validators: BTreeMap<String, bool>,

    #[serde(rename = "validatorsRoot")]
    pub validators_root: String,
}

impl CommittedRecord {
    /// Build a record with its vote commitment computed from `validators`.
    pub fn new(transaction: Transaction, validators: BTreeMap<String, bool>) -> Self {
        let validators_root = validators_root(&validators);
        Self {
            transaction,
            validators,
            validators_root,
        }
    }

    /// Build a bootstrap record: unsigned, nonce and timestamp zero, body
    /// set to the genesis marker, no validator votes.
    ///
    /// Only meaningful inside the genesis window, where the ledger accepts
    /// such records without a signature.
    pub fn genesis(from: impl Into<String>, to: impl Into<String>, amount: i64) -> Self {
        let transaction = Transaction {
            from: from.into(),
            to: to.into(),
            amount,
            nonce: 0,
            timestamp: 0,
            body: GENESIS.to_owned(),
            signature: String::new(),
        };
        Self::new(transaction, BTreeMap::new())
    }
}

/// Hash committing to a validator-vote map:
/// `sha256(sorted keys joined by ':' + ':' + sorted vote strings joined by ':')`,
/// with votes rendered as `"true"`/`"false"`.
pub fn validators_root(validators: &BTreeMap<String, bool>) -> String {
    let keys: Vec<&str> = validators.keys().map(String::as_str).collect();
    let mut votes: Vec<&str> = validators
        .values()
        .map(|valid| if *valid { "true" } else { "false" })
        .collect();
    votes.sort_unstable();
    sha256_hex(format!("{}:{}", keys.join(":"), votes.join(":")).as_bytes())
}
