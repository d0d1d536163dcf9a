//! Coin pair identifiers.
//!
//! A pair is identified on the wire by its ASCII name left-aligned in a
//! 32-byte field and padded with zero bytes, e.g. `BTCUSD`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, TypesError};

/// A 32-byte coin pair identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoinPair([u8; 32]);

impl CoinPair {
    /// Build a pair id from its name.
    pub fn from_name(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > 32 || !name.is_ascii() || name.contains('\0') {
            return Err(TypesError::InvalidPairName(name.to_string()));
        }
        let mut bytes = [0u8; 32];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(bytes))
    }

    /// Wrap raw wire bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The zero-padded wire representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The pair name with padding stripped.
    pub fn name(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(32);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Display for CoinPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for CoinPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoinPair({})", self.name())
    }
}

impl FromStr for CoinPair {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl Serialize for CoinPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for CoinPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name).map_err(serde::de::Error::custom)
    }
}
