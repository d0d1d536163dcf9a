//! Signature-set verification.
//!
//! A signature set certifies a message when every signature recovers,
//! the recovered signers are strictly ascending, and every signer is a
//! round member. Strict ascent rules out repeats without a separate set.

use moc_crypto::secp256k1::recover_signer;
use moc_crypto::Signature;
use moc_types::{Address, H256};

use crate::{Result, RoundError};

/// Recover and check every signer of `hash`. Returns the signers, ascending.
///
/// Signatures are checked in order; the first failing one decides the error.
pub fn verify_signatures<F>(hash: &H256, signatures: &[Signature], is_member: F) -> Result<Vec<Address>>
where
    F: Fn(&Address) -> bool,
{
    let mut signers: Vec<Address> = Vec::with_capacity(signatures.len());
    for (index, signature) in signatures.iter().enumerate() {
        let signer = recover_signer(hash, signature)
            .map_err(|_| RoundError::CannotRecoverSignature { index })?;
        if let Some(prev) = signers.last() {
            if signer <= *prev {
                return Err(RoundError::NotUniqueOrNotOrdered { index });
            }
        }
        if !is_member(&signer) {
            return Err(RoundError::SignerNotInRound { signer });
        }
        signers.push(signer);
    }
    Ok(signers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moc_crypto::keccak::eth_message_hash;
    use moc_crypto::SigningKey;

    fn keys() -> Vec<SigningKey> {
        let mut keys: Vec<_> = (1u8..=3)
            .map(|n| SigningKey::from_bytes(&[n; 32]).expect("key"))
            .collect();
        keys.sort_by_key(|k| k.address());
        keys
    }

    #[test]
    fn test_sorted_member_signatures_pass() {
        let keys = keys();
        let hash = eth_message_hash(b"m");
        let sigs: Vec<_> = keys.iter().map(|k| k.sign_hash(&hash)).collect();
        let members: Vec<_> = keys.iter().map(|k| k.address()).collect();
        let signers = verify_signatures(&hash, &sigs, |a| members.contains(a)).expect("valid");
        assert_eq!(signers, members);
    }

    #[test]
    fn test_duplicate_or_unsorted_rejected() {
        let keys = keys();
        let hash = eth_message_hash(b"m");
        let dup = vec![keys[0].sign_hash(&hash), keys[0].sign_hash(&hash)];
        assert!(matches!(
            verify_signatures(&hash, &dup, |_| true),
            Err(RoundError::NotUniqueOrNotOrdered { index: 1 })
        ));
        let reversed = vec![keys[1].sign_hash(&hash), keys[0].sign_hash(&hash)];
        assert!(matches!(
            verify_signatures(&hash, &reversed, |_| true),
            Err(RoundError::NotUniqueOrNotOrdered { index: 1 })
        ));
    }

    #[test]
    fn test_non_member_rejected() {
        let keys = keys();
        let hash = eth_message_hash(b"m");
        let outsider = keys[2].address();
        let sigs: Vec<_> = keys.iter().map(|k| k.sign_hash(&hash)).collect();
        let result = verify_signatures(&hash, &sigs, |a| *a != outsider);
        assert!(matches!(result, Err(RoundError::SignerNotInRound { signer }) if signer == outsider));
    }

    #[test]
    fn test_bad_v_rejected() {
        let keys = keys();
        let hash = eth_message_hash(b"m");
        let mut sig = keys[0].sign_hash(&hash);
        sig.v = 100;
        assert!(matches!(
            verify_signatures(&hash, &[sig], |_| true),
            Err(RoundError::CannotRecoverSignature { index: 0 })
        ));
    }
}
