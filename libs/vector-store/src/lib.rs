//! Vector Record Store
//!
//! Client-side consistency layer over a remote document+vector store
//! (Qdrant). The store has no foreign keys and no transactions; this crate
//! supplies the guarantees the domain layer builds on:
//!
//! ```text
//! ┌────────────────┐
//! │ SchemaManager  │  ← collection ensure: single-flight, self-heal, index reconcile
//! └───────┬────────┘
//!         │
//! ┌───────▼────────┐
//! │  RecordStore   │  ← trait: collection CRUD, upsert, scroll, search
//! │    (trait)     │
//! └───────┬────────┘
//!         │
//! ┌───────▼──────────┐
//! │ QdrantRecordStore│  ← gRPC implementation, retry-bounded scrolling
//! └──────────────────┘
//! ```
//!
//! Alongside: deterministic point-id derivation ([`point_id`]), placeholder
//! vector resolution ([`vectors`]) and a bounded diagnostics buffer
//! ([`diagnostics`]).

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod point_id;
pub mod qdrant;
pub mod repository;
pub mod retry;
pub mod schema;
pub mod vectors;

pub use config::StoreConfig;
pub use diagnostics::{DiagnosticEntry, DiagnosticLevel, DiagnosticsLog};
pub use error::{StoreError, StoreResult};
pub use models::{
    CollectionHandle, CollectionProfile, FieldCondition, FieldKind, MatchValue, PayloadFilter,
    PointRecord, ScoredPoint, VectorDistance, VectorProfile,
};
pub use point_id::derive_point_id;
pub use qdrant::QdrantRecordStore;
pub use repository::RecordStore;
pub use retry::{RetryPolicy, retry_linear};
pub use schema::{LogicalCollection, SchemaManager};
pub use vectors::{EMBEDDING_DIM, pseudo_vector, resolve_vector};
