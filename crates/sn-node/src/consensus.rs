use std::collections::{BTreeMap, VecDeque};

use sn_transaction::Transaction;

/// One received vote on the open candidate.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub valid: bool,
    pub root: String,
    pub transaction: String,
}

/// The single consensus slot.
///
/// At most one candidate is ever live; everything else waits in the pending
/// queue in arrival order. Ballots are keyed by voter public key, so a peer
/// voting twice in one round only counts once.
#[derive(Debug, Default)]
pub struct Slot {
    candidate: Option<Transaction>,
    ballots: BTreeMap<String, Ballot>,
    pending: VecDeque<Transaction>,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.candidate.is_some()
    }

    pub fn candidate(&self) -> Option<&Transaction> {
        self.candidate.as_ref()
    }

    /// Make `tx` the live candidate and forget any earlier ballots.
    pub fn open(&mut self, tx: Transaction) {
        self.candidate = Some(tx);
        self.ballots.clear();
    }

    /// Queue a submission behind the open round.
    pub fn enqueue(&mut self, tx: Transaction) {
        self.pending.push_back(tx);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn record_ballot(&mut self, voter: String, ballot: Ballot) {
        self.ballots.insert(voter, ballot);
    }

    pub fn has_ballot(&self, voter: &str) -> bool {
        self.ballots.contains_key(voter)
    }

    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    /// Every live validator has voted; time to tally.
    pub fn quorum_reached(&self, validator_count: usize) -> bool {
        self.ballots.len() >= validator_count
    }

    /// The verdict map for the committed record: voter key → vote.
    pub fn votes(&self) -> BTreeMap<String, bool> {
        self.ballots
            .iter()
            .map(|(key, ballot)| (key.clone(), ballot.valid))
            .collect()
    }

    /// Drop the ballots but keep the candidate; used on vote timeout before
    /// the round is rebroadcast.
    pub fn clear_ballots(&mut self) {
        self.ballots.clear();
    }

    /// Finish the round: clear the candidate and its ballots, and hand back
    /// the next queued submission, if any.
    pub fn close(&mut self) -> Option<Transaction> {
        self.candidate = None;
        self.ballots.clear();
        self.pending.pop_front()
    }
}
