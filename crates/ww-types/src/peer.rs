use std::fmt;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identity of a cluster peer.
///
/// A `PeerId` is derived deterministically from an ed25519 public key using
/// BLAKE3. The same key always produces the same identity. Host anchors are
/// named by the hex form of a `PeerId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId {
    hash: [u8; 32],
}

impl PeerId {
    /// Derive a `PeerId` from a raw ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"ww-peer-v1:");
        hasher.update(public_key);
        Self {
            hash: *hasher.finalize().as_bytes(),
        }
    }

    /// Create an ephemeral (random) PeerId for tests and demos.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self::from_public_key(&bytes)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Full hex-encoded string. This is the form used as an anchor segment.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("peer:{}", hex::encode(&self.hash[..4]))
    }

    /// Parse from a hex string (64 hex characters).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self { hash: arr })
    }

    /// Create from a raw 32-byte hash. Use `from_public_key()` for production code.
    pub fn from_raw(hash: [u8; 32]) -> Self {
        Self { hash }
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short_id())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// An ed25519 signing key together with the [`PeerId`] it identifies.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS random source.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Restore a keypair from its 32-byte secret.
    pub fn from_secret(secret: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&secret),
        }
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_secret_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self::from_secret(secret))
    }

    /// The identity of this keypair.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(self.signing.verifying_key().as_bytes())
    }

    /// Hex-encoded secret, suitable for storing in a config file.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("peer", &self.peer_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let id1 = PeerId::from_public_key(&[42u8; 32]);
        let id2 = PeerId::from_public_key(&[42u8; 32]);
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_keys_produce_different_ids() {
        let id1 = PeerId::from_public_key(&[1; 32]);
        let id2 = PeerId::from_public_key(&[2; 32]);
        assert_ne!(id1, id2);
    }

    #[test]
    fn ephemeral_ids_are_unique() {
        assert_ne!(PeerId::ephemeral(), PeerId::ephemeral());
    }

    #[test]
    fn short_id_format() {
        let id = PeerId::from_public_key(&[0; 32]);
        let short = id.short_id();
        assert!(short.starts_with("peer:"));
        assert_eq!(short.len(), 13); // "peer:" + 8 hex chars
    }

    #[test]
    fn display_is_full_hex() {
        let id = PeerId::from_public_key(&[99; 32]);
        assert_eq!(id.to_string(), id.to_hex());
        assert_eq!(PeerId::from_hex(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = PeerId::from_hex("abcd").unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 32, actual: 2 });
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(PeerId::from_hex("zz"), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn serde_roundtrip() {
        let id = PeerId::from_public_key(&[10; 32]);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn keypair_secret_restores_same_peer() {
        let kp = Keypair::generate();
        let restored = Keypair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(kp.peer_id(), restored.peer_id());
    }

    #[test]
    fn keypair_rejects_short_secret() {
        assert!(Keypair::from_secret_hex("00ff").is_err());
    }
}
