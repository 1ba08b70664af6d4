use chrono::Utc;
use serde::{Deserialize, Serialize};
use sn_crypto::Keypair;

use crate::TransactionError;

/// A single transfer on the stakenet ledger.
///
/// The canonical serialization is the JSON object with the fields in exactly
/// the declaration order below; every node must produce the same byte string
/// for the same transaction or the vote hashes stop lining up. The unsigned
/// form (used for hashing before signing, and as the vote-matching identity)
/// omits the `signature` key entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender public key hex, or the [`crate::GENESIS`] literal.
    pub from: String,

    /// Recipient public key hex, or the [`crate::STAKE`] literal.
    pub to: String,

    /// Transferred amount; must cover the protocol fee to be valid.
    pub amount: i64,

    /// Sender's account nonce at submission time.
    pub nonce: u64,

    /// Unix timestamp (seconds) when the transaction was created.
    pub timestamp: i64,

    /// Opaque payload; the [`crate::GENESIS`] literal marks bootstrap records.
    pub body: String,

    /// Hex DER secp256k1 signature over the unsigned hash. Empty until signed.
    #[serde(default)]
    pub signature: String,
}

/// The unsigned canonical view: same field order, no `signature` key.
#[derive(Serialize)]
struct Unsigned<'a> {
    from: &'a str,
    to: &'a str,
    amount: i64,
    nonce: u64,
    timestamp: i64,
    body: &'a str,
}

impl Transaction {
    /// Create a new unsigned transaction stamped with the current time.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: i64,
        nonce: u64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
            nonce,
            timestamp: Utc::now().timestamp(),
            body: body.into(),
            signature: String::new(),
        }
    }

    /// Canonical JSON byte string, with or without the `signature` field.
    pub fn canonical(&self, include_signature: bool) -> Result<String, TransactionError> {
        let json = if include_signature {
            serde_json::to_string(self)?
        } else {
            serde_json::to_string(&Unsigned {
                from: &self.from,
                to: &self.to,
                amount: self.amount,
                nonce: self.nonce,
                timestamp: self.timestamp,
                body: &self.body,
            })?
        };
        Ok(json)
    }

    /// SHA-256 digest of the canonical serialization.
    pub fn digest(&self, include_signature: bool) -> Result<[u8; 32], TransactionError> {
        Ok(sn_crypto::sha256(self.canonical(include_signature)?.as_bytes()))
    }

    /// Hex-encoded hash of the canonical serialization.
    ///
    /// The unsigned hash (`include_signature = false`) identifies a
    /// transaction for vote matching and is the Merkle leaf value.
    pub fn hash(&self, include_signature: bool) -> Result<String, TransactionError> {
        Ok(hex::encode(self.digest(include_signature)?))
    }

    /// Sign the unsigned hash with `keypair`, filling the signature field.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), TransactionError> {
        self.signature = keypair.sign(self.digest(false)?);
        Ok(())
    }

    /// True iff the signature over the unsigned hash verifies under `from`.
    ///
    /// `from` values that are not public keys (the `GENESIS` literal in
    /// particular) always fail; the genesis window bypasses this check at
    /// the ledger layer, not here.
    pub fn verify(&self) -> bool {
        match self.digest(false) {
            Ok(digest) => sn_crypto::verify(&self.from, digest, &self.signature),
            Err(_) => false,
        }
    }
}
