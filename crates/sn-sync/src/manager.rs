use std::collections::BTreeMap;

use sn_chain::CommittedRecord;

use crate::SyncError;

/// One peer's answer to a chain request: its record sequence and the Merkle
/// root it claims for it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub root: String,
    pub records: Vec<CommittedRecord>,
}

impl Snapshot {
    /// Decode the wire form, where the record sequence travels as a JSON
    /// string nested inside the message payload.
    pub fn decode(transactions_json: &str, root: String) -> Result<Self, SyncError> {
        let records: Vec<CommittedRecord> = serde_json::from_str(transactions_json)?;
        Ok(Self { root, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Collects chain snapshots from peers during startup sync and picks the
/// one to adopt: the snapshot whose root is reported by the most peers.
///
/// Keyed by peer public key, so a peer that answers twice only counts once.
#[derive(Debug, Default)]
pub struct SyncManager {
    snapshots: BTreeMap<String, Snapshot>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) one peer's snapshot.
    pub fn record_snapshot(&mut self, peer: String, snapshot: Snapshot) {
        self.snapshots.insert(peer, snapshot);
    }

    /// Number of distinct peers that have answered.
    pub fn responses(&self) -> usize {
        self.snapshots.len()
    }

    /// Enough answers to decide: every currently known validator except the
    /// requester itself has reported.
    pub fn ready(&self, validator_count: usize) -> bool {
        self.snapshots.len() >= validator_count.saturating_sub(1)
    }

    /// The snapshot carrying the plurality root. Ties resolve to the
    /// lexicographically smallest root so every replica picks the same
    /// winner; among peers reporting that root, the smallest peer key wins.
    pub fn plurality(&self) -> Option<&Snapshot> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for snapshot in self.snapshots.values() {
            *counts.entry(snapshot.root.as_str()).or_default() += 1;
        }

        let mut best: Option<(&str, usize)> = None;
        for (root, count) in &counts {
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((root, *count));
            }
        }

        let winner = best?.0;
        self.snapshots.values().find(|s| s.root == winner)
    }

    /// Drop all collected snapshots once a chain has been adopted.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Record factory; the ledger semantics are irrelevant here.
    fn records_of_len(len: usize) -> Vec<CommittedRecord> {
        (0..len)
            .map(|i| CommittedRecord::genesis("GENESIS", format!("acct-{i}"), 1_000))
            .collect()
    }

    fn snapshot(root: &str, len: usize) -> Snapshot {
        Snapshot {
            root: root.to_owned(),
            records: records_of_len(len),
        }
    }

    #[test]
    fn plurality_picks_the_most_reported_root() {
        let mut manager = SyncManager::new();
        manager.record_snapshot("p1".into(), snapshot("root-a", 5));
        manager.record_snapshot("p2".into(), snapshot("root-a", 5));
        manager.record_snapshot("p3".into(), snapshot("root-b", 3));

        let winner = manager.plurality().unwrap();
        assert_eq!(winner.root, "root-a");
        assert_eq!(winner.len(), 5);
    }

    #[test]
    fn plurality_tie_breaks_deterministically() {
        let mut manager = SyncManager::new();
        manager.record_snapshot("p1".into(), snapshot("root-b", 2));
        manager.record_snapshot("p2".into(), snapshot("root-a", 4));

        assert_eq!(manager.plurality().unwrap().root, "root-a");
    }

    #[test]
    fn duplicate_answers_count_once() {
        let mut manager = SyncManager::new();
        manager.record_snapshot("p1".into(), snapshot("root-a", 5));
        manager.record_snapshot("p1".into(), snapshot("root-b", 6));

        assert_eq!(manager.responses(), 1);
        assert_eq!(manager.plurality().unwrap().root, "root-b");
    }

    #[test]
    fn readiness_excludes_the_requester() {
        let mut manager = SyncManager::new();
        assert!(manager.ready(0));
        assert!(manager.ready(1));
        assert!(!manager.ready(2));

        manager.record_snapshot("p1".into(), snapshot("root-a", 1));
        assert!(manager.ready(2));
        assert!(!manager.ready(3));
    }

    #[test]
    fn wire_snapshot_roundtrips_through_json_string() {
        let records = records_of_len(3);
        let json = serde_json::to_string(&records).unwrap();
        let snapshot = Snapshot::decode(&json, "root-a".into()).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.records, records);

        assert!(Snapshot::decode("not json", "root-a".into()).is_err());
    }

    #[test]
    fn clear_resets_collection() {
        let mut manager = SyncManager::new();
        manager.record_snapshot("p1".into(), snapshot("root-a", 1));
        manager.clear();
        assert_eq!(manager.responses(), 0);
        assert!(manager.plurality().is_none());
    }
}
