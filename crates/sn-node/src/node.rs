use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use sn_chain::{Chain, CommittedRecord, MAX_VOTE_TIME_MS, MIN_STAKE};
use sn_crypto::Keypair;
use sn_sync::{Snapshot, SyncManager};
use sn_transaction::Transaction;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::NodeConfig,
    consensus::{Ballot, Slot},
    error::NodeError,
    event::NodeEvent,
    protocol::{ChainPayload, Envelope, Message, VotePayload, GOSSIP_DEDUP_WINDOW},
    transport::{self, SocketEvent, SocketId},
};

/// Grace before the first no-peers liveness check after the initial dial.
const INITIAL_RECONNECT_GRACE: Duration = Duration::from_secs(10);
/// Grace for every later check.
const RECONNECT_GRACE: Duration = Duration::from_secs(5);

/// Requests injected into the event loop from outside it.
#[derive(Debug)]
enum Command {
    Submit(Transaction),
    CheckPeers,
}

/// Outbound half of one socket plus the peer identity bound to it once the
/// first verified envelope arrives.
struct PeerSocket {
    sender: UnboundedSender<String>,
    key: Option<String>,
}

/// Cheap clonable handle for injecting work into a running [`Node`].
#[derive(Clone)]
pub struct NodeHandle {
    commands: UnboundedSender<Command>,
}

impl NodeHandle {
    /// Submit a locally created transaction. Returns false once the node is
    /// gone.
    pub fn submit(&self, tx: Transaction) -> bool {
        self.commands.send(Command::Submit(tx)).is_ok()
    }
}

/// A stakenet validator node.
///
/// Owns every piece of mutable state (socket table, validator set, the
/// chain, the consensus slot) from a single `tokio::select!` loop, so no
/// handler ever races another. Socket tasks talk to it exclusively through
/// the [`SocketEvent`] channel.
pub struct Node {
    keypair: Keypair,
    public_key: String,
    port: u16,
    peers: Vec<String>,

    chain: Chain,
    validators: BTreeSet<String>,
    /// Snapshot of the validator set taken when the open round was last
    /// (re)broadcast; consulted by the vote timeout after the live set has
    /// been reset by socket churn.
    last_validators: BTreeSet<String>,
    sockets: HashMap<SocketId, PeerSocket>,
    seen: VecDeque<String>,
    slot: Slot,
    vote_deadline: Option<Instant>,
    sync: SyncManager,
    want_chain: bool,
    synced: bool,
    first_grace: bool,

    net_tx: UnboundedSender<SocketEvent>,
    net_rx: UnboundedReceiver<SocketEvent>,
    cmd_tx: UnboundedSender<Command>,
    cmd_rx: UnboundedReceiver<Command>,
    events: UnboundedSender<NodeEvent>,
}

impl Node {
    /// Create a node from a [`NodeConfig`].
    ///
    /// Returns the node together with a receiver for [`NodeEvent`]s that the
    /// calling application can process independently.
    pub fn new(config: NodeConfig) -> Result<(Self, UnboundedReceiver<NodeEvent>), NodeError> {
        let keypair = Keypair::from_secret_hex(&config.private_key)?;
        let public_key = keypair.public_hex();
        info!("Local key: {public_key}");

        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let node = Self {
            keypair,
            public_key,
            port: config.port,
            peers: config.peers,
            chain: config.chain,
            validators: BTreeSet::new(),
            last_validators: BTreeSet::new(),
            sockets: HashMap::new(),
            seen: VecDeque::new(),
            slot: Slot::new(),
            vote_deadline: None,
            sync: SyncManager::new(),
            want_chain: false,
            synced: false,
            first_grace: true,
            net_tx,
            net_rx,
            cmd_tx,
            cmd_rx,
            events,
        };

        Ok((node, event_rx))
    }

    /// This node's public key hex.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Read access to the local chain.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Handle for submitting transactions while the node runs.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            commands: self.cmd_tx.clone(),
        }
    }

    /// Bind the listener, dial the seed peers, bootstrap local state when
    /// there are none, and run the event loop. Runs until the process exits.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        self.port = transport::listen(self.port, self.net_tx.clone()).await?;
        info!("Listening on port {}", self.port);
        let _ = self.events.send(NodeEvent::Listening { port: self.port });

        for url in self.peers.clone() {
            transport::dial(url, self.net_tx.clone());
        }
        if self.peers.is_empty() {
            self.bootstrap_local()?;
        }

        self.run().await;
        Ok(())
    }

    async fn run(&mut self) {
        loop {
            let deadline = self
                .vote_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                Some(event) = self.net_rx.recv() => self.on_socket_event(event),
                Some(command) = self.cmd_rx.recv() => self.on_command(command),
                _ = tokio::time::sleep_until(deadline), if self.vote_deadline.is_some() => {
                    if let Err(e) = self.on_vote_timeout() {
                        warn!("vote timeout handling failed: {e}");
                    }
                }
            }
        }
    }

    /// Startup with no seed peers: derive local state from whatever chain
    /// the launcher supplied. Pre-materialized accounts mean the balances
    /// are authoritative and only the Merkle tree needs folding; otherwise
    /// the full replay builds them.
    fn bootstrap_local(&mut self) -> Result<(), NodeError> {
        self.synced = true;
        if self.chain.is_empty() {
            return Ok(());
        }
        if self.chain.accounts().is_empty() {
            self.chain.rebuild()?;
            info!("Replayed {} local records", self.chain.len());
        } else {
            self.chain.rebuild_merkle_only()?;
        }
        Ok(())
    }

    // ── Socket lifecycle ─────────────────────────────────────────────────

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened {
                socket,
                sender,
                dialed,
            } => {
                self.sockets.insert(socket, PeerSocket { sender, key: None });
                info!("Socket {socket} open (dialed: {dialed})");
                let _ = self.events.send(NodeEvent::PeerConnected { socket, dialed });
                if let Err(e) = self.on_socket_open(dialed) {
                    warn!("open handling failed: {e}");
                }
            }
            SocketEvent::Frame { socket, text } => {
                if let Err(e) = self.on_frame(socket, &text) {
                    warn!("message handling failed: {e}");
                }
            }
            SocketEvent::Closed { socket } => self.on_socket_closed(socket),
        }
    }

    fn on_socket_open(&mut self, dialed: bool) -> Result<(), NodeError> {
        if dialed && !self.synced && !self.want_chain {
            self.want_chain = true;
            self.broadcast(Message::GetChain, None)?;
        }
        self.broadcast(Message::Validator(self.public_key.clone()), None)
    }

    fn on_socket_closed(&mut self, socket: SocketId) {
        self.sockets.remove(&socket);
        info!("Socket {socket} closed");
        let _ = self.events.send(NodeEvent::PeerDisconnected { socket });

        // The validator set is defined by live membership; any close makes
        // it stale, so drop it and ask everyone to re-announce.
        self.validators.clear();
        if let Err(e) = self.broadcast(Message::Validators, None) {
            warn!("re-announce request failed: {e}");
        }

        let grace = if self.first_grace {
            self.first_grace = false;
            INITIAL_RECONNECT_GRACE
        } else {
            RECONNECT_GRACE
        };
        let commands = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = commands.send(Command::CheckPeers);
        });
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit(tx) => {
                if let Err(e) = self.submit(tx) {
                    warn!("submit failed: {e}");
                }
            }
            Command::CheckPeers => {
                if self.sockets.is_empty() {
                    info!("No peer connected after grace period, exiting");
                    std::process::exit(0);
                }
            }
        }
    }

    // ── Gossip ───────────────────────────────────────────────────────────

    fn on_frame(&mut self, socket: SocketId, text: &str) -> Result<(), NodeError> {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("dropping undecodable frame: {e}");
                return Ok(());
            }
        };
        if envelope.key.is_empty() || envelope.id.is_empty() || envelope.sign.is_none() {
            debug!("dropping envelope with missing identity fields");
            return Ok(());
        }
        if self.seen.contains(&envelope.id) {
            return Ok(());
        }
        if !envelope.verify() {
            debug!("dropping envelope with bad signature from {}", envelope.key);
            return Ok(());
        }

        self.remember(envelope.id.clone());
        self.flood(text, socket);
        if let Some(peer) = self.sockets.get_mut(&socket) {
            peer.key = Some(envelope.key.clone());
        }
        self.dispatch(envelope)
    }

    fn remember(&mut self, id: String) {
        if self.seen.len() == GOSSIP_DEDUP_WINDOW {
            self.seen.pop_front();
        }
        self.seen.push_back(id);
    }

    /// Forward a verified frame verbatim to every socket but the origin.
    fn flood(&self, text: &str, origin: SocketId) {
        for (id, peer) in &self.sockets {
            if *id != origin {
                let _ = peer.sender.send(text.to_owned());
            }
        }
    }

    /// Sign and send a message of our own to every open socket, recording
    /// its id so the flooded echo dies on the way back in.
    fn broadcast(&mut self, message: Message, addressee: Option<String>) -> Result<(), NodeError> {
        let envelope = Envelope::sealed(message, addressee, &self.keypair)?;
        self.remember(envelope.id.clone());
        let text = envelope.encode()?;
        for peer in self.sockets.values() {
            let _ = peer.sender.send(text.clone());
        }
        Ok(())
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<(), NodeError> {
        let Envelope {
            message,
            addressee,
            key,
            ..
        } = envelope;
        match message {
            Message::GetChain => self.on_get_chain(key),
            Message::Chain(payload) => self.on_chain(key, addressee, payload),
            Message::Validators => {
                self.broadcast(Message::Validator(self.public_key.clone()), None)
            }
            Message::Validator(announced) => self.on_validator(announced, true),
            Message::HelloValidator(announced) => self.on_validator(announced, false),
            Message::NewTransaction(raw) => self.on_new_transaction(&raw),
            Message::Transaction(payload) => self.on_ballot(key, payload),
        }
    }

    // ── Validator set ────────────────────────────────────────────────────

    fn on_validator(&mut self, announced: String, acknowledge: bool) -> Result<(), NodeError> {
        if self.chain.stake_of(&announced) < MIN_STAKE {
            debug!("ignoring announcement from understaked {announced}");
            return Ok(());
        }
        if self.validators.insert(announced.clone()) {
            self.last_validators.insert(announced.clone());
            info!("Validator joined: {announced}");
            let _ = self.events.send(NodeEvent::ValidatorJoined { key: announced });
        }
        if acknowledge {
            self.broadcast(Message::HelloValidator(self.public_key.clone()), None)?;
        }
        Ok(())
    }

    // ── Chain sync ───────────────────────────────────────────────────────

    fn on_get_chain(&mut self, requester: String) -> Result<(), NodeError> {
        let payload = ChainPayload {
            transactions: serde_json::to_string(self.chain.records())?,
            root: self.chain.root(),
        };
        self.broadcast(Message::Chain(payload), Some(requester))
    }

    fn on_chain(
        &mut self,
        sender: String,
        addressee: Option<String>,
        payload: ChainPayload,
    ) -> Result<(), NodeError> {
        if !self.want_chain || addressee.as_deref() != Some(self.public_key.as_str()) {
            return Ok(());
        }

        let snapshot = Snapshot::decode(&payload.transactions, payload.root)?;
        self.sync.record_snapshot(sender, snapshot);
        if !self.sync.ready(self.validators.len()) {
            return Ok(());
        }
        let Some(winner) = self.sync.plurality() else {
            return Ok(());
        };

        let records = winner.records.clone();
        if self.chain.adopt(records)? {
            self.synced = true;
            self.want_chain = false;
            self.sync.clear();
            let new_length = self.chain.len();
            info!("Adopted peer chain of length {new_length}");
            let _ = self.events.send(NodeEvent::ChainSynced { new_length });
        }
        Ok(())
    }

    // ── Vote state machine ───────────────────────────────────────────────

    /// Inject a locally created transaction: flood it as a submission so
    /// the other validators open the same round, then take it locally.
    pub fn submit(&mut self, tx: Transaction) -> Result<(), NodeError> {
        self.broadcast(Message::NewTransaction(tx.canonical(true)?), None)?;
        self.take_candidate(tx)
    }

    fn on_new_transaction(&mut self, raw: &str) -> Result<(), NodeError> {
        let tx: Transaction = match serde_json::from_str(raw) {
            Ok(tx) => tx,
            Err(e) => {
                debug!("dropping unparseable submission: {e}");
                return Ok(());
            }
        };
        self.take_candidate(tx)
    }

    fn take_candidate(&mut self, tx: Transaction) -> Result<(), NodeError> {
        if self.slot.is_open() {
            let _ = self.events.send(NodeEvent::TransactionQueued {
                hash: tx.hash(false)?,
            });
            self.slot.enqueue(tx);
            return Ok(());
        }
        self.open_round(tx)
    }

    fn open_round(&mut self, tx: Transaction) -> Result<(), NodeError> {
        let hash = tx.hash(false)?;
        let verdict = self.chain.validate(&tx, true, self.slot.pending_len());
        if !verdict.reasons.is_empty() {
            debug!("candidate {hash} flagged: {:?}", verdict.reasons);
        }

        self.slot.open(tx.clone());
        self.last_validators = self.validators.clone();
        self.broadcast(
            Message::Transaction(VotePayload {
                transaction: tx.canonical(true)?,
                valid: verdict.valid,
                root: self.chain.root(),
            }),
            None,
        )?;
        self.vote_deadline = Some(Instant::now() + Duration::from_millis(MAX_VOTE_TIME_MS));
        info!("Round opened on {hash}");
        let _ = self.events.send(NodeEvent::RoundOpened { hash });
        Ok(())
    }

    fn on_ballot(&mut self, sender: String, payload: VotePayload) -> Result<(), NodeError> {
        let Some(candidate_hash) = self.slot.candidate().map(|c| c.hash(false)).transpose()?
        else {
            debug!("vote from {sender} with no open round");
            return Ok(());
        };
        if payload.root != self.chain.root() {
            // Divergent state forbids counting the vote.
            debug!("vote from {sender} dropped: root mismatch");
            return Ok(());
        }
        if self.chain.stake_of(&sender) < MIN_STAKE {
            debug!("vote from {sender} dropped: understaked");
            return Ok(());
        }
        let tx: Transaction = match serde_json::from_str(&payload.transaction) {
            Ok(tx) => tx,
            Err(e) => {
                debug!("vote from {sender} dropped: unparseable candidate: {e}");
                return Ok(());
            }
        };
        if tx.hash(false)? != candidate_hash {
            debug!("vote from {sender} dropped: different candidate");
            return Ok(());
        }

        self.slot.record_ballot(
            sender,
            Ballot {
                valid: payload.valid,
                root: payload.root,
                transaction: payload.transaction,
            },
        );
        self.try_commit()
    }

    /// Tally once every live validator has voted. A majority of `valid`
    /// verdicts commits the candidate through the ledger transition; any
    /// other outcome drops it silently. Either way the slot closes and the
    /// next queued submission opens the following round.
    fn try_commit(&mut self) -> Result<(), NodeError> {
        if !self.slot.quorum_reached(self.validators.len()) {
            return Ok(());
        }
        let Some(candidate) = self.slot.candidate().cloned() else {
            return Ok(());
        };
        let hash = candidate.hash(false)?;

        let self_verdict = self
            .chain
            .validate(&candidate, true, self.slot.pending_len());
        let mut votes = self.slot.votes();
        votes.insert(self.public_key.clone(), self_verdict.valid);

        let approvals = votes.values().filter(|valid| **valid).count();
        let rejections = votes.len() - approvals;
        if approvals > rejections {
            self.chain
                .commit(CommittedRecord::new(candidate, votes))?;
            let chain_length = self.chain.len();
            info!("Committed {hash} at height {chain_length}");
            let _ = self.events.send(NodeEvent::TransactionCommitted { hash, chain_length });
        } else {
            info!("Rejected {hash} ({approvals} for, {rejections} against)");
            let _ = self.events.send(NodeEvent::TransactionRejected { hash });
        }

        self.vote_deadline = None;
        if let Some(next) = self.slot.close() {
            self.open_round(next)?;
        }
        Ok(())
    }

    /// The round outlived its deadline: cut sockets of validators that never
    /// voted, forget the partial tally, and run the round again. The
    /// candidate itself is only ever cleared by a commit decision.
    fn on_vote_timeout(&mut self) -> Result<(), NodeError> {
        self.vote_deadline = None;
        let Some(candidate) = self.slot.candidate().cloned() else {
            return Ok(());
        };
        let hash = candidate.hash(false)?;

        let silent: Vec<SocketId> = self
            .sockets
            .iter()
            .filter_map(|(id, peer)| match &peer.key {
                Some(key)
                    if self.last_validators.contains(key) && !self.slot.has_ballot(key) =>
                {
                    Some(*id)
                }
                _ => None,
            })
            .collect();
        for id in silent {
            info!("Disconnecting silent validator on socket {id}");
            // Dropping the sender closes the socket; the Closed event then
            // resets the validator set like any other disconnect.
            self.sockets.remove(&id);
        }

        self.slot.clear_ballots();
        let verdict = self.chain.validate(&candidate, true, self.slot.pending_len());
        self.broadcast(
            Message::Transaction(VotePayload {
                transaction: candidate.canonical(true)?,
                valid: verdict.valid,
                root: self.chain.root(),
            }),
            None,
        )?;
        self.last_validators = self.validators.clone();
        self.vote_deadline = Some(Instant::now() + Duration::from_millis(MAX_VOTE_TIME_MS));
        info!("Vote timeout on {hash}, round rebroadcast");
        let _ = self.events.send(NodeEvent::VoteTimeout { hash });
        Ok(())
    }
}
