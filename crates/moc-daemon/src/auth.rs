//! Caller authentication for RPC requests.
//!
//! A request whose params name a `caller` must prove control of that
//! account. `signature` is a recoverable secp256k1 signature over the
//! Ethereum signed-message hash of `"{method}:{nonce}:{params}"`, where
//! `params` is the compact JSON of the remaining parameters with object
//! keys sorted. `nonce` must exceed the last nonce accepted from the same
//! caller, so a captured request cannot be replayed.

use std::collections::HashMap;

use moc_crypto::keccak::eth_message_hash;
use moc_crypto::secp256k1::recover_signer;
use moc_crypto::Signature;
#[cfg(test)]
use moc_crypto::SigningKey;
use moc_types::{Address, H256};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::rpc::RpcError;

/// Parameter naming the acting account.
pub const CALLER_FIELD: &str = "caller";
/// Parameter carrying the request signature.
pub const SIGNATURE_FIELD: &str = "signature";
/// Parameter carrying the per-caller request counter.
pub const NONCE_FIELD: &str = "nonce";

/// Last accepted nonce per caller.
#[derive(Debug, Default)]
pub struct NonceTracker {
    last: Mutex<HashMap<Address, u64>>,
}

impl NonceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `nonce` for `caller` if it is above the last one accepted.
    pub async fn accept(&self, caller: Address, nonce: u64) -> Result<(), RpcError> {
        let mut last = self.last.lock().await;
        if let Some(previous) = last.get(&caller).copied().filter(|&p| nonce <= p) {
            return Err(RpcError::unauthorized(&format!(
                "nonce {nonce} not above {previous}"
            )));
        }
        last.insert(caller, nonce);
        Ok(())
    }
}

/// Rebuild `value` with every object's keys in sorted order.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonical(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Hash a caller signs to authorize `method` with `params`.
///
/// `params` must not contain the signature or nonce fields.
pub fn request_hash(method: &str, nonce: u64, params: &Value) -> H256 {
    let payload = format!("{method}:{nonce}:{}", canonical(params));
    eth_message_hash(payload.as_bytes())
}

/// Attach a nonce and `key`'s signature to `params`.
#[cfg(test)]
pub(crate) fn sign_request(key: &SigningKey, method: &str, nonce: u64, params: &Value) -> Value {
    let signature = key.sign_hash(&request_hash(method, nonce, params));
    let mut signed = params.as_object().cloned().unwrap_or_default();
    signed.insert(NONCE_FIELD.to_string(), Value::from(nonce));
    signed.insert(
        SIGNATURE_FIELD.to_string(),
        serde_json::json!({"v": signature.v, "r": signature.r, "s": signature.s}),
    );
    Value::Object(signed)
}

/// Check the caller's signature and nonce, returning the params the
/// handler sees. Requests without a `caller` pass through unchanged.
pub async fn authenticate(
    nonces: &NonceTracker,
    method: &str,
    params: &Value,
) -> Result<Value, RpcError> {
    let Some(object) = params.as_object() else {
        return Ok(params.clone());
    };
    let Some(caller) = object.get(CALLER_FIELD) else {
        return Ok(params.clone());
    };
    let caller: Address = serde_json::from_value(caller.clone())
        .map_err(|e| RpcError::invalid_params(&format!("caller: {e}")))?;

    let mut stripped = object.clone();
    let signature = stripped
        .remove(SIGNATURE_FIELD)
        .ok_or_else(|| RpcError::unauthorized("signature required"))?;
    let signature: Signature = serde_json::from_value(signature)
        .map_err(|e| RpcError::invalid_params(&format!("signature: {e}")))?;
    let nonce = stripped
        .remove(NONCE_FIELD)
        .and_then(|n| n.as_u64())
        .ok_or_else(|| RpcError::unauthorized("nonce required"))?;

    let stripped = Value::Object(stripped);
    let signer = recover_signer(&request_hash(method, nonce, &stripped), &signature)
        .map_err(|e| RpcError::unauthorized(&e.to_string()))?;
    if signer != caller {
        warn!(method, ?caller, ?signer, "request signed by another account");
        return Err(RpcError::unauthorized("signature does not match caller"));
    }
    nonces.accept(caller, nonce).await?;
    debug!(method, ?caller, nonce, "request authenticated");
    Ok(stripped)
}
