use sha2::{Digest, Sha256};

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Lowercase hex of the SHA-256 digest of `data`.
///
/// Every hash that crosses the wire (transaction hashes, Merkle nodes,
/// validator roots) is exchanged in this encoding.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
