use serde::{Deserialize, Serialize};
use sn_crypto::Keypair;
use uuid::Uuid;

/// How many recently seen envelope ids each node retains for gossip dedup.
pub const GOSSIP_DEDUP_WINDOW: usize = 10;

/// The seven protocol messages, tagged on the wire as
/// `{ "type": ..., "data": ... }` with `data` omitted for the bare kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    /// Request a chain snapshot from every peer.
    #[serde(rename = "GET_CHAIN")]
    GetChain,

    /// Snapshot reply, addressed to one requester via the envelope's `for`.
    #[serde(rename = "CHAIN")]
    Chain(ChainPayload),

    /// Ask all peers to re-announce themselves.
    #[serde(rename = "VALIDATORS")]
    Validators,

    /// Announce presence; `data` is the announcing public key.
    #[serde(rename = "VALIDATOR")]
    Validator(String),

    /// Acknowledge a presence announcement. Never answered.
    #[serde(rename = "HELLO_VALIDATOR")]
    HelloValidator(String),

    /// Submit a transaction; `data` is its canonical serialization.
    #[serde(rename = "NEW_TRANSACTION")]
    NewTransaction(String),

    /// Cast a vote on the open candidate.
    #[serde(rename = "TRANSACTION")]
    Transaction(VotePayload),
}

/// Chain snapshot: the record sequence as a JSON string, plus the Merkle
/// root the sender claims for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainPayload {
    pub transactions: String,
    pub root: String,
}

/// One vote: the serialized candidate, the verdict, and the voter's root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotePayload {
    pub transaction: String,
    pub valid: bool,
    pub root: String,
}

/// The signed wrapper around every gossip message.
///
/// The canonical byte string that gets signed is this struct serialized with
/// `sign` set to `None`; optional fields that are `None` are omitted rather
/// than serialized as null, and the key order is fixed at
/// `type, data, for, id, key, sign`. Verifiers re-serialize the parsed
/// envelope the same way, so both sides hash identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: Message,

    /// Addressee public key for directed replies (`CHAIN`).
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub addressee: Option<String>,

    /// Unique message id; the dedup key for flood termination.
    pub id: String,

    /// Sender public key, also bound to the delivering socket.
    pub key: String,

    /// Hex DER signature over the canonical unsigned bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl Envelope {
    /// Build and sign an envelope for `message` from this node.
    pub fn sealed(
        message: Message,
        addressee: Option<String>,
        keypair: &Keypair,
    ) -> Result<Self, serde_json::Error> {
        let mut envelope = Self {
            message,
            addressee,
            id: Uuid::new_v4().to_string(),
            key: keypair.public_hex(),
            sign: None,
        };
        let digest = sn_crypto::sha256(envelope.canonical()?.as_bytes());
        envelope.sign = Some(keypair.sign(digest));
        Ok(envelope)
    }

    /// The canonical byte string: this envelope with the signature blanked.
    pub fn canonical(&self) -> Result<String, serde_json::Error> {
        let unsigned = Self {
            sign: None,
            ..self.clone()
        };
        serde_json::to_string(&unsigned)
    }

    /// True iff the signature verifies under the envelope's own `key`.
    pub fn verify(&self) -> bool {
        let Some(sign) = &self.sign else {
            return false;
        };
        let Ok(canonical) = self.canonical() else {
            return false;
        };
        sn_crypto::verify(&self.key, sn_crypto::sha256(canonical.as_bytes()), sign)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
