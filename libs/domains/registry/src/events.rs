use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::keys::{ShopKeys, hex_encode};

/// Signature of the empty chain prefix
const GENESIS_SIGNATURE: &str = "genesis";

/// One inventory event bound into a shop's signature chain.
///
/// `signature` covers the shop secret, the previous event's signature and
/// the canonical event bytes, so reordering, dropping or altering any event
/// invalidates every signature after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEvent {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub signature: String,
}

/// Canonical bytes the signature commits to (everything but the signature)
fn canonical_bytes(event: &SignedEvent) -> RegistryResult<Vec<u8>> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Canonical<'a> {
        id: Uuid,
        shop_id: Uuid,
        sequence: i64,
        timestamp: DateTime<Utc>,
        payload: &'a serde_json::Value,
    }
    Ok(serde_json::to_vec(&Canonical {
        id: event.id,
        shop_id: event.shop_id,
        sequence: event.sequence,
        timestamp: event.timestamp,
        payload: &event.payload,
    })?)
}

fn chain_signature(keys: &ShopKeys, prev: &str, canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(keys.secret());
    hasher.update(prev.as_bytes());
    hasher.update(canonical);
    hex_encode(&hasher.finalize())
}

/// Produces and verifies the per-shop event hash chain
pub struct EventSigner {
    keys: ShopKeys,
    next_sequence: i64,
    prev_signature: String,
}

impl EventSigner {
    pub fn new(keys: ShopKeys) -> Self {
        Self {
            keys,
            next_sequence: 0,
            prev_signature: GENESIS_SIGNATURE.to_string(),
        }
    }

    /// Resume a chain from its last known event
    pub fn resume(keys: ShopKeys, last: &SignedEvent) -> Self {
        Self {
            keys,
            next_sequence: last.sequence + 1,
            prev_signature: last.signature.clone(),
        }
    }

    pub fn shop_id(&self) -> Uuid {
        self.keys.shop_id()
    }

    /// Bind a payload into the chain as the next event
    pub fn sign(&mut self, payload: serde_json::Value) -> RegistryResult<SignedEvent> {
        let mut event = SignedEvent {
            id: Uuid::now_v7(),
            shop_id: self.keys.shop_id(),
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            payload,
            signature: String::new(),
        };
        let canonical = canonical_bytes(&event)?;
        event.signature = chain_signature(&self.keys, &self.prev_signature, &canonical);

        self.next_sequence += 1;
        self.prev_signature = event.signature.clone();
        Ok(event)
    }

    /// Verify a contiguous chain starting from genesis. Fails on the first
    /// event whose signature does not match the recomputed chain value.
    pub fn verify_chain(keys: &ShopKeys, events: &[SignedEvent]) -> RegistryResult<()> {
        let mut prev = GENESIS_SIGNATURE.to_string();
        for (index, event) in events.iter().enumerate() {
            if event.sequence != index as i64 {
                return Err(RegistryError::ChainBroken {
                    sequence: event.sequence,
                });
            }
            let canonical = canonical_bytes(event)?;
            let expected = chain_signature(keys, &prev, &canonical);
            if event.signature != expected {
                return Err(RegistryError::ChainBroken {
                    sequence: event.sequence,
                });
            }
            prev = event.signature.clone();
        }
        Ok(())
    }
}
