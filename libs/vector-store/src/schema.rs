use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, instrument, warn};

use crate::diagnostics::DiagnosticsLog;
use crate::error::StoreResult;
use crate::models::{CollectionHandle, CollectionProfile, FieldKind, VectorDistance, VectorProfile};
use crate::repository::RecordStore;
use crate::retry::{RetryPolicy, retry_linear};
use crate::vectors::EMBEDDING_DIM;

/// The logical collections this application stores documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalCollection {
    Users,
    Shops,
    Suppliers,
    Products,
    Items,
    Batches,
    Sales,
    Drivers,
    Visual,
    Marketplace,
    Customers,
    DanInventory,
}

impl LogicalCollection {
    pub const ALL: [LogicalCollection; 12] = [
        LogicalCollection::Users,
        LogicalCollection::Shops,
        LogicalCollection::Suppliers,
        LogicalCollection::Products,
        LogicalCollection::Items,
        LogicalCollection::Batches,
        LogicalCollection::Sales,
        LogicalCollection::Drivers,
        LogicalCollection::Visual,
        LogicalCollection::Marketplace,
        LogicalCollection::Customers,
        LogicalCollection::DanInventory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogicalCollection::Users => "users",
            LogicalCollection::Shops => "shops",
            LogicalCollection::Suppliers => "suppliers",
            LogicalCollection::Products => "products",
            LogicalCollection::Items => "items",
            LogicalCollection::Batches => "batches",
            LogicalCollection::Sales => "sales",
            LogicalCollection::Drivers => "drivers",
            LogicalCollection::Visual => "visual",
            LogicalCollection::Marketplace => "marketplace",
            LogicalCollection::Customers => "customers",
            LogicalCollection::DanInventory => "dan_inventory",
        }
    }

    /// Every collection carries the same fixed vector configuration.
    pub fn vector_profile(&self) -> VectorProfile {
        VectorProfile::new(EMBEDDING_DIM as u64).with_distance(VectorDistance::Cosine)
    }

    /// Payload fields that must carry an index, with their types.
    pub fn payload_indexes(&self) -> &'static [(&'static str, FieldKind)] {
        match self {
            LogicalCollection::Users => &[("role", FieldKind::Keyword)],
            LogicalCollection::Shops => &[("ownerUserId", FieldKind::Keyword)],
            LogicalCollection::Suppliers => &[
                ("shopId", FieldKind::Keyword),
                ("linkedUserId", FieldKind::Keyword),
            ],
            LogicalCollection::Products => &[
                ("name", FieldKind::Keyword),
                ("category", FieldKind::Keyword),
            ],
            LogicalCollection::Items => &[
                ("shopId", FieldKind::Keyword),
                ("productId", FieldKind::Keyword),
                ("batchId", FieldKind::Keyword),
                ("status", FieldKind::Keyword),
                ("quantity", FieldKind::Integer),
            ],
            LogicalCollection::Batches => &[
                ("shopId", FieldKind::Keyword),
                ("supplierId", FieldKind::Keyword),
            ],
            LogicalCollection::Sales => &[("shopId", FieldKind::Keyword)],
            LogicalCollection::Drivers => &[
                ("shopId", FieldKind::Keyword),
                ("available", FieldKind::Bool),
            ],
            LogicalCollection::Visual => &[
                ("shopId", FieldKind::Keyword),
                ("productId", FieldKind::Keyword),
            ],
            LogicalCollection::Marketplace => &[
                ("shopId", FieldKind::Keyword),
                ("active", FieldKind::Bool),
            ],
            LogicalCollection::Customers => &[("shopId", FieldKind::Keyword)],
            LogicalCollection::DanInventory => &[
                ("shopId", FieldKind::Keyword),
                ("sequence", FieldKind::Integer),
            ],
        }
    }
}

type EnsureCell = Arc<OnceCell<Option<CollectionHandle>>>;

/// Ensures collections exist with the expected configuration before use.
///
/// Guarantees:
/// - idempotent: once a collection is verified ready, subsequent calls are a
///   cached lookup;
/// - single-flight: concurrent calls for the same collection share one
///   in-flight ensure, so exactly one create can reach the store;
/// - self-healing: an existing collection whose `{size, distance}` differ
///   from the catalog is deleted and recreated;
/// - non-fatal: every remote failure is logged and recorded in the
///   diagnostics buffer, and surfaces as `None` (callers skip the
///   operation, the application keeps running).
pub struct SchemaManager {
    store: Arc<dyn RecordStore>,
    diagnostics: Arc<DiagnosticsLog>,
    states: Mutex<HashMap<&'static str, EnsureCell>>,
    verify_retry: RetryPolicy,
}

impl SchemaManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            diagnostics: Arc::new(DiagnosticsLog::new()),
            states: Mutex::new(HashMap::new()),
            verify_retry: RetryPolicy::default(),
        }
    }

    /// Override the post-create verification retry policy
    pub fn with_verify_policy(mut self, policy: RetryPolicy) -> Self {
        self.verify_retry = policy;
        self
    }

    pub fn diagnostics(&self) -> Arc<DiagnosticsLog> {
        Arc::clone(&self.diagnostics)
    }

    /// Ensure the collection exists with the catalog configuration.
    ///
    /// Returns a handle on success; `None` means not-ready and the caller
    /// must treat its operation as skipped.
    pub async fn ensure_collection(
        &self,
        collection: LogicalCollection,
    ) -> Option<CollectionHandle> {
        let cell = {
            let mut states = self.states.lock().await;
            Arc::clone(
                states
                    .entry(collection.name())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        cell.get_or_init(|| self.ensure_inner(collection))
            .await
            .clone()
    }

    /// Ensure every catalog collection; returns the ones that became ready.
    pub async fn ensure_all(&self) -> Vec<LogicalCollection> {
        let mut ready = Vec::new();
        for collection in LogicalCollection::ALL {
            if self.ensure_collection(collection).await.is_some() {
                ready.push(collection);
            }
        }
        ready
    }

    /// Drop the cached ensure state for a collection so the next call
    /// re-checks the store. Used by explicit resyncs.
    pub async fn invalidate(&self, collection: LogicalCollection) {
        self.states.lock().await.remove(collection.name());
    }

    pub async fn invalidate_all(&self) {
        self.states.lock().await.clear();
    }

    #[instrument(skip(self), fields(collection = collection.name()))]
    async fn ensure_inner(&self, collection: LogicalCollection) -> Option<CollectionHandle> {
        let name = collection.name();
        let expected = collection.vector_profile();

        let existing = match self.store.list_collections().await {
            Ok(names) => names,
            Err(e) => {
                self.record_error(format!("Listing collections failed: {}", e));
                return None;
            }
        };

        let profile = if existing.iter().any(|c| c == name) {
            match self.store.collection_profile(name).await {
                Ok(profile) => profile,
                Err(e) => {
                    self.record_error(format!("Fetching profile of '{}' failed: {}", name, e));
                    return None;
                }
            }
        } else {
            None
        };

        let verified = match profile {
            Some(observed) if observed.matches(&expected) => observed,
            observed => {
                if let Some(observed) = observed {
                    warn!(
                        collection = name,
                        observed_dimension = observed.dimension,
                        expected_dimension = expected.dimension,
                        "Incompatible collection configuration, recreating"
                    );
                    self.diagnostics.warn(format!(
                        "Collection '{}' has incompatible configuration, recreating",
                        name
                    ));
                    if let Err(e) = self.store.delete_collection(name).await {
                        self.record_error(format!("Deleting '{}' failed: {}", name, e));
                        return None;
                    }
                }

                match self.store.create_collection(name, expected).await {
                    Ok(()) => {}
                    Err(e) if e.is_conflict() => {
                        // Another caller won the create race; verification
                        // below confirms whatever landed is compatible.
                        debug!(collection = name, "Create conflict, proceeding to verify");
                    }
                    Err(e) => {
                        self.record_error(format!("Creating '{}' failed: {}", name, e));
                        return None;
                    }
                }

                match self.verify_created(name, &expected).await {
                    Some(verified) => verified,
                    None => return None,
                }
            }
        };

        self.reconcile_indexes(collection, &verified).await;

        Some(CollectionHandle {
            name: name.to_string(),
            named_vector: verified.named_vector,
        })
    }

    /// Re-read the collection until it reports the expected configuration.
    /// Creation is eventually consistent on some deployments; a bounded
    /// retry absorbs the lag without masking a genuinely failed create.
    async fn verify_created(
        &self,
        name: &str,
        expected: &VectorProfile,
    ) -> Option<CollectionProfile> {
        let result: StoreResult<CollectionProfile> = retry_linear(
            || async {
                match self.store.collection_profile(name).await? {
                    Some(profile) if profile.matches(expected) => Ok(profile),
                    Some(_) => Err(crate::error::StoreError::Internal(format!(
                        "Collection '{}' reports unexpected configuration after create",
                        name
                    ))),
                    None => Err(crate::error::StoreError::CollectionNotFound(
                        name.to_string(),
                    )),
                }
            },
            &self.verify_retry,
        )
        .await;

        match result {
            Ok(profile) => Some(profile),
            Err(e) => {
                error!(collection = name, error = %e, "Collection not ready after create");
                self.record_error(format!(
                    "Collection '{}' not ready after create: {}",
                    name, e
                ));
                None
            }
        }
    }

    /// Bring declared payload indexes in line with the observed schema:
    /// missing → create, wrong type → delete then recreate, correct → skip.
    /// Index failures degrade query efficiency, not correctness, so they are
    /// logged and skipped rather than failing the ensure.
    async fn reconcile_indexes(&self, collection: LogicalCollection, observed: &CollectionProfile) {
        let name = collection.name();

        for (field, expected_kind) in collection.payload_indexes() {
            match observed.payload_indexes.get(*field) {
                Some(existing) if existing == expected_kind => continue,
                Some(_) => {
                    warn!(
                        collection = name,
                        field, "Payload index has wrong type, recreating"
                    );
                    if let Err(e) = self.store.delete_field_index(name, field).await {
                        self.diagnostics.warn(format!(
                            "Deleting index '{}.{}' failed: {}",
                            name, field, e
                        ));
                        continue;
                    }
                }
                None => {}
            }

            match self.store.create_field_index(name, field, *expected_kind).await {
                Ok(()) => {}
                Err(e) if e.is_conflict() => {}
                Err(e) => {
                    self.diagnostics.warn(format!(
                        "Creating index '{}.{}' failed: {}",
                        name, field, e
                    ));
                }
            }
        }
    }

    fn record_error(&self, message: String) {
        error!("{}", message);
        self.diagnostics.error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::repository::MockRecordStore;
    use mockall::predicate::eq;

    fn matching_profile(collection: LogicalCollection) -> CollectionProfile {
        CollectionProfile {
            dimension: EMBEDDING_DIM as u64,
            distance: VectorDistance::Cosine,
            named_vector: None,
            payload_indexes: collection
                .payload_indexes()
                .iter()
                .map(|(field, kind)| (field.to_string(), *kind))
                .collect(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new().with_max_attempts(2).with_delay(1)
    }

    #[tokio::test]
    async fn test_ensure_creates_absent_collection() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec![]));
        store
            .expect_create_collection()
            .with(eq("sales"), eq(LogicalCollection::Sales.vector_profile()))
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_collection_profile()
            .with(eq("sales"))
            .times(1)
            .returning(|_| Ok(Some(matching_profile(LogicalCollection::Sales))));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Sales).await;
        assert_eq!(handle, Some(CollectionHandle::unnamed("sales")));
    }

    #[tokio::test]
    async fn test_ensure_is_cached_after_success() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec!["sales".to_string()]));
        store
            .expect_collection_profile()
            .times(1)
            .returning(|_| Ok(Some(matching_profile(LogicalCollection::Sales))));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let first = manager.ensure_collection(LogicalCollection::Sales).await;
        let second = manager.ensure_collection(LogicalCollection::Sales).await;
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_ensures_collapse_to_one_create() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec![]));
        store
            .expect_create_collection()
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_collection_profile()
            .times(1)
            .returning(|_| Ok(Some(matching_profile(LogicalCollection::Sales))));

        let manager =
            Arc::new(SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(
                    async move { manager.ensure_collection(LogicalCollection::Sales).await },
                )
            })
            .collect();

        for task in tasks {
            let handle = task.await.expect("task panicked");
            assert_eq!(handle, Some(CollectionHandle::unnamed("sales")));
        }
    }

    #[tokio::test]
    async fn test_incompatible_collection_is_recreated() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec!["items".to_string()]));

        let mut seq = mockall::Sequence::new();
        store
            .expect_collection_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(Some(CollectionProfile {
                    dimension: 1536,
                    distance: VectorDistance::Cosine,
                    named_vector: None,
                    payload_indexes: HashMap::new(),
                }))
            });
        store
            .expect_delete_collection()
            .with(eq("items"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_create_collection()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_collection_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(matching_profile(LogicalCollection::Items))));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Items).await;
        assert!(handle.is_some());
    }

    #[tokio::test]
    async fn test_create_conflict_is_treated_as_success() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec![]));
        store
            .expect_create_collection()
            .times(1)
            .returning(|_, _| Err(StoreError::Conflict("already exists".to_string())));
        store
            .expect_collection_profile()
            .times(1)
            .returning(|_| Ok(Some(matching_profile(LogicalCollection::Sales))));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Sales).await;
        assert!(handle.is_some());
    }

    #[tokio::test]
    async fn test_verification_exhaustion_marks_not_ready() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec![]));
        store
            .expect_create_collection()
            .times(1)
            .returning(|_, _| Ok(()));
        // Collection never becomes visible
        store
            .expect_collection_profile()
            .times(2)
            .returning(|_| Ok(None));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Sales).await;
        assert!(handle.is_none());
        assert!(!manager.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_profile_transport_error_marks_not_ready() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec!["sales".to_string()]));
        // The collection exists but its profile cannot be fetched: that is
        // a failure to record, not an absent collection to recreate.
        store
            .expect_collection_profile()
            .times(1)
            .returning(|_| Err(StoreError::Remote("transport error".to_string())));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Sales).await;
        assert!(handle.is_none());
        assert!(!manager.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_named_vector_is_recorded_in_handle() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec!["visual".to_string()]));
        store.expect_collection_profile().times(1).returning(|_| {
            Ok(Some(CollectionProfile {
                dimension: EMBEDDING_DIM as u64,
                distance: VectorDistance::Cosine,
                named_vector: Some("image".to_string()),
                payload_indexes: LogicalCollection::Visual
                    .payload_indexes()
                    .iter()
                    .map(|(f, k)| (f.to_string(), *k))
                    .collect(),
            }))
        });

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager
            .ensure_collection(LogicalCollection::Visual)
            .await
            .expect("ready");
        assert_eq!(handle.named_vector.as_deref(), Some("image"));
    }

    #[tokio::test]
    async fn test_wrong_index_type_is_recreated_and_missing_created() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec!["items".to_string()]));

        // "quantity" indexed as Keyword instead of Integer; "shopId" missing;
        // the rest correct.
        store.expect_collection_profile().times(1).returning(|_| {
            let mut indexes: HashMap<String, FieldKind> = LogicalCollection::Items
                .payload_indexes()
                .iter()
                .map(|(f, k)| (f.to_string(), *k))
                .collect();
            indexes.insert("quantity".to_string(), FieldKind::Keyword);
            indexes.remove("shopId");
            Ok(Some(CollectionProfile {
                dimension: EMBEDDING_DIM as u64,
                distance: VectorDistance::Cosine,
                named_vector: None,
                payload_indexes: indexes,
            }))
        });

        store
            .expect_delete_field_index()
            .with(eq("items"), eq("quantity"))
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_create_field_index()
            .with(eq("items"), eq("quantity"), eq(FieldKind::Integer))
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_create_field_index()
            .with(eq("items"), eq("shopId"), eq(FieldKind::Keyword))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Items).await;
        assert!(handle.is_some());
    }

    #[tokio::test]
    async fn test_index_failure_is_not_fatal() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(1)
            .returning(|| Ok(vec!["sales".to_string()]));
        store.expect_collection_profile().times(1).returning(|_| {
            Ok(Some(CollectionProfile {
                dimension: EMBEDDING_DIM as u64,
                distance: VectorDistance::Cosine,
                named_vector: None,
                payload_indexes: HashMap::new(),
            }))
        });
        store
            .expect_create_field_index()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Remote("index service down".to_string())));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        let handle = manager.ensure_collection(LogicalCollection::Sales).await;
        assert!(handle.is_some());
        assert!(!manager.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_recheck() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_collections()
            .times(2)
            .returning(|| Ok(vec!["sales".to_string()]));
        store
            .expect_collection_profile()
            .times(2)
            .returning(|_| Ok(Some(matching_profile(LogicalCollection::Sales))));

        let manager = SchemaManager::new(Arc::new(store)).with_verify_policy(fast_policy());
        assert!(manager
            .ensure_collection(LogicalCollection::Sales)
            .await
            .is_some());
        manager.invalidate(LogicalCollection::Sales).await;
        assert!(manager
            .ensure_collection(LogicalCollection::Sales)
            .await
            .is_some());
    }
}
