use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};

use crate::error::CryptoError;

/// A secp256k1 keypair identifying one node on the network.
///
/// The public side travels as lowercase hex of the 33-byte compressed key;
/// signatures travel as lowercase hex of the DER encoding.
pub struct Keypair {
    secp: Secp256k1<All>,
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Load a keypair from a hex-encoded 32-byte secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_hex)?;
        let secret =
            SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secp, secret, public })
    }

    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self { secp, secret, public }
    }

    /// Hex of the compressed public key.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Hex of the secret key (for handing to an external supervisor's env).
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Sign a 32-byte digest, returning the DER signature as hex.
    pub fn sign(&self, digest: [u8; 32]) -> String {
        let message = Message::from_digest(digest);
        let signature = self.secp.sign_ecdsa(&message, &self.secret);
        hex::encode(signature.serialize_der())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret half.
        f.debug_struct("Keypair")
            .field("public", &self.public_hex())
            .finish()
    }
}

/// Verify a hex DER signature over a 32-byte digest under a hex-encoded
/// compressed public key.
///
/// Any decode failure (malformed key, malformed signature) counts as a
/// failed verification rather than an error, so callers can treat
/// non-key senders like `"GENESIS"` uniformly.
pub fn verify(public_hex: &str, digest: [u8; 32], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_hex) else {
        return false;
    };
    let Ok(public) = PublicKey::from_slice(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    let message = Message::from_digest(digest);
    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, &public)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn sign_then_verify_roundtrip() {
        let keypair = Keypair::generate();
        let digest = sha256(b"payload");
        let signature = keypair.sign(digest);
        assert!(verify(&keypair.public_hex(), digest, &signature));
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(sha256(b"payload"));
        assert!(!verify(&keypair.public_hex(), sha256(b"other"), &signature));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let digest = sha256(b"payload");
        let signature = keypair.sign(digest);
        assert!(!verify(&other.public_hex(), digest, &signature));
    }

    #[test]
    fn verify_tolerates_garbage_inputs() {
        let digest = sha256(b"payload");
        assert!(!verify("GENESIS", digest, "00"));
        assert!(!verify("", digest, ""));
        assert!(!verify("zz", digest, "not-hex"));
    }

    #[test]
    fn secret_hex_roundtrip() {
        let keypair = Keypair::generate();
        let reloaded = Keypair::from_secret_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(keypair.public_hex(), reloaded.public_hex());
    }

    #[test]
    fn from_secret_hex_rejects_bad_input() {
        assert!(Keypair::from_secret_hex("not-hex").is_err());
        assert!(Keypair::from_secret_hex("00").is_err());
    }
}
