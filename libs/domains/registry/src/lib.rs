//! DAN Event/Key Registry
//!
//! Decentralized inventory announcements: deterministic per-shop signing
//! keys, a hash-chained event log and an at-least-once outbound queue with
//! a JSON-lines durability buffer for control-plane outages.

pub mod error;
pub mod events;
pub mod keys;
pub mod queue;

pub use error::{RegistryError, RegistryResult};
pub use events::{EventSigner, SignedEvent};
pub use keys::ShopKeys;
pub use queue::{ControlPlane, EventQueue, PublishOutcome};
