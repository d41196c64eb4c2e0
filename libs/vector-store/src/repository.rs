use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    CollectionHandle, CollectionProfile, FieldKind, PayloadFilter, PointRecord, ScoredPoint,
    VectorProfile,
};

/// Repository trait for the remote document+vector store.
///
/// This abstracts the vendor client (Qdrant). Point operations take a
/// [`CollectionHandle`] so that collections using named vectors are
/// addressed consistently on both read and write paths.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ===== Collection Management =====

    /// List the names of all existing collections
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Fetch the observed configuration of a collection, or None if absent
    async fn collection_profile(&self, name: &str) -> StoreResult<Option<CollectionProfile>>;

    /// Create a collection with the given vector configuration.
    ///
    /// A duplicate create surfaces as `StoreError::Conflict`.
    async fn create_collection(&self, name: &str, profile: VectorProfile) -> StoreResult<()>;

    /// Delete a collection
    async fn delete_collection(&self, name: &str) -> StoreResult<()>;

    /// Declare a payload field index
    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldKind,
    ) -> StoreResult<()>;

    /// Remove a payload field index
    async fn delete_field_index(&self, collection: &str, field: &str) -> StoreResult<()>;

    // ===== Point Operations =====

    /// Insert-or-replace a batch of points
    async fn upsert(&self, target: &CollectionHandle, points: Vec<PointRecord>) -> StoreResult<()>;

    /// Fetch points by id
    async fn retrieve(
        &self,
        target: &CollectionHandle,
        ids: Vec<Uuid>,
    ) -> StoreResult<Vec<PointRecord>>;

    /// Scroll every point matching the filter, following the cursor until
    /// exhausted. Transient page failures are retried with a bounded budget;
    /// exhausting the budget truncates the result set rather than erroring.
    async fn scroll_all(
        &self,
        target: &CollectionHandle,
        filter: Option<PayloadFilter>,
    ) -> StoreResult<Vec<PointRecord>>;

    /// Top-k vector search with optional payload filter
    async fn search(
        &self,
        target: &CollectionHandle,
        vector: Vec<f32>,
        filter: Option<PayloadFilter>,
        limit: u64,
    ) -> StoreResult<Vec<ScoredPoint>>;

    /// Delete points by id
    async fn delete_points(&self, target: &CollectionHandle, ids: Vec<Uuid>) -> StoreResult<()>;
}
