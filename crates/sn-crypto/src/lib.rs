pub mod error;
pub mod hash;
pub mod keys;

pub use error::CryptoError;
pub use hash::{sha256, sha256_hex};
pub use keys::{verify, Keypair};
