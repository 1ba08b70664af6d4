use sn_crypto::sha256_hex;

/// An incremental binary hash tree over hex-encoded transaction hashes.
///
/// `add` pushes a leaf and promotes pairs upward: whenever a level holds an
/// even number of nodes, its last two are replaced by their parent on the
/// next level. At rest every level therefore holds at most one node, and the
/// set of resting nodes covers the leaves in order, largest subtree first.
///
/// Hashing input is the *string concatenation of the two hex nodes*, not
/// their raw bytes; peers compare roots byte-for-byte, so this choice is
/// part of the wire contract.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// `levels[0]` holds pending leaves, `levels[n]` pending 2^n-subtrees.
    levels: Vec<Vec<String>>,
}

fn hash_pair(left: &str, right: &str) -> String {
    sha256_hex(format!("{left}{right}").as_bytes())
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no leaf has been added yet.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|level| level.is_empty())
    }

    /// Append one leaf (the hex of an unsigned transaction hash) and fold
    /// completed pairs upward.
    pub fn add(&mut self, leaf: String) {
        if self.levels.is_empty() {
            self.levels.push(Vec::new());
        }
        self.levels[0].push(leaf);

        let mut level = 0;
        loop {
            let len = self.levels[level].len();
            if len < 2 || len % 2 != 0 {
                break;
            }
            let right = self.levels[level].pop().unwrap();
            let left = self.levels[level].pop().unwrap();
            let parent = hash_pair(&left, &right);
            if self.levels.len() == level + 1 {
                self.levels.push(Vec::new());
            }
            self.levels[level + 1].push(parent);
            level += 1;
        }
    }

    /// Fold the resting nodes of every level, highest level first, pairwise
    /// (duplicating the last node when the count is odd) until one remains.
    ///
    /// The empty tree hashes to `sha256("0")`.
    pub fn root(&self) -> String {
        let mut nodes: Vec<String> = self
            .levels
            .iter()
            .rev()
            .flat_map(|level| level.iter().cloned())
            .collect();

        if nodes.is_empty() {
            return sha256_hex(b"0");
        }

        while nodes.len() > 1 {
            if nodes.len() % 2 != 0 {
                // Safety: len > 1 here, so last() exists.
                nodes.push(nodes.last().unwrap().clone());
            }
            nodes = nodes
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
        }
        nodes.pop().unwrap()
    }
}
