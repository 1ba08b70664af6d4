use crate::transport::SocketId;

/// High-level events emitted by a running [`crate::Node`] that callers can
/// subscribe to via the channel returned from [`crate::Node::new`].
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// The WebSocket listener is bound; carries the actual port.
    Listening { port: u16 },

    /// A socket opened (accepted, or dialed when `dialed` is true).
    PeerConnected { socket: SocketId, dialed: bool },

    /// A socket closed; the validator set has been reset.
    PeerDisconnected { socket: SocketId },

    /// A staked peer announced itself and joined the validator set.
    ValidatorJoined { key: String },

    /// The local chain was replaced by a peer snapshot during startup sync.
    ChainSynced { new_length: usize },

    /// A voting round opened on the candidate with this unsigned hash.
    RoundOpened { hash: String },

    /// A submission arrived while a round was open and was queued.
    TransactionQueued { hash: String },

    /// The open round timed out; silent validators were disconnected and
    /// the candidate was rebroadcast.
    VoteTimeout { hash: String },

    /// The candidate was committed at the given chain height.
    TransactionCommitted { hash: String, chain_length: usize },

    /// The vote tally went against the candidate; nothing was appended.
    TransactionRejected { hash: String },
}
