//! The signed price message.
//!
//! Layout, all fields big-endian and fixed width:
//!
//! | offset | width | field                  |
//! |--------|-------|------------------------|
//! | 0      | 32    | version                |
//! | 32     | 32    | coin pair (ASCII, zero-padded) |
//! | 64     | 32    | price                  |
//! | 96     | 20    | voted oracle address   |
//! | 116    | 32    | last publication block |
//!
//! Oracles sign the Ethereum signed-message hash of these 148 bytes.

use moc_types::{Address, Amount, CoinPair, H256, U256};
use serde::{Deserialize, Serialize};

use crate::keccak::eth_message_hash;
use crate::secp256k1::{Signature, SigningKey};

/// Encoded length of a price message.
pub const PRICE_MESSAGE_LEN: usize = 148;

/// The fields certified by a price publication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMessage {
    /// Message format version.
    pub version: u64,
    /// Pair the price is quoted for.
    pub pair: CoinPair,
    /// Proposed price.
    pub price: Amount,
    /// Reporting address of the proposer, who must also submit.
    pub voted_oracle: Address,
    /// Publication block the proposer observed.
    pub last_publication_block: u64,
}

impl PriceMessage {
    /// Canonical 148-byte encoding.
    pub fn encode(&self) -> [u8; PRICE_MESSAGE_LEN] {
        let mut out = [0u8; PRICE_MESSAGE_LEN];
        U256::from(self.version).to_big_endian(&mut out[0..32]);
        out[32..64].copy_from_slice(self.pair.as_bytes());
        self.price.to_big_endian(&mut out[64..96]);
        out[96..116].copy_from_slice(self.voted_oracle.as_bytes());
        U256::from(self.last_publication_block).to_big_endian(&mut out[116..148]);
        out
    }

    /// The hash every co-signer signs.
    pub fn signing_hash(&self) -> H256 {
        eth_message_hash(&self.encode())
    }

    /// Co-sign this message.
    pub fn sign(&self, key: &SigningKey) -> Signature {
        key.sign_hash(&self.signing_hash())
    }
}
