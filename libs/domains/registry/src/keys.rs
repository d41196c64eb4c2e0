use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Domain-separation tag mixed into every derived secret, so the same shop
/// id used elsewhere with sha2 can never collide with a registry key.
const KEY_DERIVATION_TAG: &[u8] = b"dan-registry/shop-key/v1";

/// Deterministic signing material for one shop.
///
/// The secret never leaves the process; the public identifier (hash of the
/// secret) is what the control plane knows the shop by. Derivation is pure,
/// so a restarted node recovers the same keys without any key storage.
#[derive(Clone)]
pub struct ShopKeys {
    shop_id: Uuid,
    secret: [u8; 32],
}

impl ShopKeys {
    pub fn derive(shop_id: Uuid) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_DERIVATION_TAG);
        hasher.update(shop_id.as_bytes());
        Self {
            shop_id,
            secret: hasher.finalize().into(),
        }
    }

    pub fn shop_id(&self) -> Uuid {
        self.shop_id
    }

    pub(crate) fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Hex identifier safe to share with the control plane
    pub fn public_id(&self) -> String {
        let digest = Sha256::digest(self.secret);
        hex_encode(&digest)
    }
}

impl std::fmt::Debug for ShopKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret deliberately omitted
        f.debug_struct("ShopKeys")
            .field("shop_id", &self.shop_id)
            .field("public_id", &self.public_id())
            .finish()
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
