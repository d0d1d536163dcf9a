//! Recoverable secp256k1 ECDSA.
//!
//! Signatures carry Ethereum's `v` convention (27 or 28). The signer of a
//! hash is identified by the address recovered from `(v, r, s)`, the last
//! 20 bytes of the Keccak-256 of the uncompressed public key.

use libsecp256k1::{Message, PublicKey, RecoveryId, SecretKey};
use moc_types::{Address, H256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{CryptoError, Result};

/// A recoverable signature in `(v, r, s)` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Recovery id plus 27.
    pub v: u8,
    /// First half of the ECDSA signature.
    pub r: H256,
    /// Second half of the ECDSA signature.
    pub s: H256,
}

/// A secp256k1 signing key. Used by oracle operators and tests; the
/// round manager itself only recovers.
pub struct SigningKey {
    inner: SecretKey,
}

impl SigningKey {
    /// Create a signing key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = SecretKey::parse(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { inner })
    }

    /// Parse a hex secret, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let raw = hex::decode(secret.trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("secret must be 32 bytes".to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// The address controlled by this key.
    pub fn address(&self) -> Address {
        public_key_to_address(&PublicKey::from_secret_key(&self.inner))
    }

    /// Sign a 32-byte hash.
    pub fn sign_hash(&self, hash: &H256) -> Signature {
        let message = Message::parse(hash.as_fixed_bytes());
        let (signature, recovery_id) = libsecp256k1::sign(&message, &self.inner);
        let bytes = signature.serialize();
        Signature {
            v: recovery_id.serialize() + 27,
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..]),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address())
            .finish()
    }
}

/// Recover the address that produced `signature` over `hash`.
///
/// # Errors
///
/// - [`CryptoError::InvalidRecoveryId`] if `v` is not 27 or 28
/// - [`CryptoError::Recovery`] if `(r, s)` does not recover to a key
pub fn recover_signer(hash: &H256, signature: &Signature) -> Result<Address> {
    let recovery_id = match signature.v {
        27 | 28 => signature.v - 27,
        other => return Err(CryptoError::InvalidRecoveryId(other)),
    };
    let message = Message::parse(hash.as_fixed_bytes());

    let mut standard_slice = [0u8; 64];
    standard_slice[..32].copy_from_slice(signature.r.as_fixed_bytes());
    standard_slice[32..].copy_from_slice(signature.s.as_fixed_bytes());
    let parsed = libsecp256k1::Signature::parse_standard_slice(&standard_slice)
        .map_err(|_| CryptoError::Recovery)?;

    let recovery_id = RecoveryId::parse(recovery_id).map_err(|_| CryptoError::Recovery)?;
    let public_key =
        libsecp256k1::recover(&message, &parsed, &recovery_id).map_err(|_| CryptoError::Recovery)?;
    Ok(public_key_to_address(&public_key))
}

fn public_key_to_address(public_key: &PublicKey) -> Address {
    let digest = Keccak256::digest(&public_key.serialize()[1..]);
    Address::from_slice(&digest[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keccak::eth_message_hash;

    const SECRET: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn address(hex_str: &str) -> Address {
        Address::from_slice(&hex::decode(hex_str).expect("hex"))
    }

    #[test]
    fn test_address_from_secret() {
        let key = SigningKey::from_hex(SECRET).expect("valid secret");
        assert_eq!(
            key.address(),
            address("2c7536e3605d9c16a7a3d7b1898e529396a65c23")
        );
    }

    #[test]
    fn test_recover_known_signature() {
        let hash = eth_message_hash(b"Some data");
        let signature = Signature {
            v: 0x1c,
            r: H256::from_slice(
                &hex::decode("b91467e570a6466aa9e9876cbcd013baba02900b8979d43fe208a4a4f339f5fd")
                    .expect("hex"),
            ),
            s: H256::from_slice(
                &hex::decode("6007e74cd82e037b800186422fc2da167c747ef045e5d18a5f5d4300f8e1a029")
                    .expect("hex"),
            ),
        };
        let signer = recover_signer(&hash, &signature).expect("recoverable");
        assert_eq!(signer, address("2c7536e3605d9c16a7a3d7b1898e529396a65c23"));
    }

    #[test]
    fn test_sign_recover_roundtrip() {
        let key = SigningKey::from_bytes(&[7u8; 32]).expect("valid secret");
        let hash = eth_message_hash(b"price");
        let signature = key.sign_hash(&hash);
        assert!(signature.v == 27 || signature.v == 28);
        assert_eq!(recover_signer(&hash, &signature).expect("recover"), key.address());
    }

    #[test]
    fn test_wrong_hash_recovers_other_address() {
        let key = SigningKey::from_bytes(&[9u8; 32]).expect("valid secret");
        let signature = key.sign_hash(&eth_message_hash(b"a"));
        let other = recover_signer(&eth_message_hash(b"b"), &signature);
        assert!(other.map(|a| a != key.address()).unwrap_or(true));
    }

    #[test]
    fn test_invalid_recovery_id() {
        let key = SigningKey::from_bytes(&[3u8; 32]).expect("valid secret");
        let hash = eth_message_hash(b"x");
        let mut signature = key.sign_hash(&hash);
        signature.v = 100;
        assert!(matches!(
            recover_signer(&hash, &signature),
            Err(CryptoError::InvalidRecoveryId(100))
        ));
    }

    #[test]
    fn test_zero_signature_rejected() {
        let hash = eth_message_hash(b"x");
        let signature = Signature {
            v: 27,
            r: H256::zero(),
            s: H256::zero(),
        };
        assert!(matches!(
            recover_signer(&hash, &signature),
            Err(CryptoError::Recovery)
        ));
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(SigningKey::from_bytes(&[0u8; 32]).is_err());
    }
}
