//! In-memory [`RecordStore`] fake for domain tests. Implements enough of
//! the store contract to exercise the persistence paths: payload filters
//! are evaluated against the JSON payloads, collections auto-report a
//! matching profile once created.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;
use vector_store::models::{
    CollectionHandle, CollectionProfile, FieldCondition, FieldKind, MatchValue, PayloadFilter,
    PointRecord, ScoredPoint, VectorProfile,
};
use vector_store::{EMBEDDING_DIM, RecordStore, StoreError, StoreResult, VectorDistance};

#[derive(Default)]
struct Collection {
    points: BTreeMap<Uuid, PointRecord>,
    indexes: HashMap<String, FieldKind>,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: Mutex<HashMap<String, Collection>>,
    failing_upserts: Mutex<HashSet<String>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert against the named collection fail
    pub fn fail_upserts_for(&self, collection: &str) {
        self.failing_upserts
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    /// Stored vector of one point, for asserting what a write resolved to
    pub fn point_vector(&self, collection: &str, point_id: Uuid) -> Option<Vec<f32>> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|c| c.points.get(&point_id))
            .map(|p| p.vector.clone())
    }

    pub fn point_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

fn payload_matches(payload: &serde_json::Value, filter: &PayloadFilter) -> bool {
    filter.must.iter().all(|condition| match condition {
        FieldCondition::Match { key, value } => match (payload.get(key), value) {
            (Some(serde_json::Value::String(s)), MatchValue::Keyword(expected)) => s == expected,
            (Some(serde_json::Value::Bool(b)), MatchValue::Bool(expected)) => b == expected,
            (Some(serde_json::Value::Number(n)), MatchValue::Integer(expected)) => {
                n.as_i64() == Some(*expected)
            }
            _ => false,
        },
        FieldCondition::Range { key, gte, lte, gt, lt } => {
            let Some(actual) = payload.get(key).and_then(|v| v.as_f64()) else {
                return false;
            };
            gte.is_none_or(|bound| actual >= bound)
                && lte.is_none_or(|bound| actual <= bound)
                && gt.is_none_or(|bound| actual > bound)
                && lt.is_none_or(|bound| actual < bound)
        }
    })
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn collection_profile(&self, name: &str) -> StoreResult<Option<CollectionProfile>> {
        Ok(self.collections.lock().unwrap().get(name).map(|c| {
            CollectionProfile {
                dimension: EMBEDDING_DIM as u64,
                distance: VectorDistance::Cosine,
                named_vector: None,
                payload_indexes: c.indexes.clone(),
            }
        }))
    }

    async fn create_collection(&self, name: &str, _profile: VectorProfile) -> StoreResult<()> {
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(name) {
            return Err(StoreError::Conflict(format!(
                "collection '{}' already exists",
                name
            )));
        }
        collections.insert(name.to_string(), Collection::default());
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldKind,
    ) -> StoreResult<()> {
        let mut collections = self.collections.lock().unwrap();
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        entry.indexes.insert(field.to_string(), kind);
        Ok(())
    }

    async fn delete_field_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        if let Some(entry) = self.collections.lock().unwrap().get_mut(collection) {
            entry.indexes.remove(field);
        }
        Ok(())
    }

    async fn upsert(&self, target: &CollectionHandle, points: Vec<PointRecord>) -> StoreResult<()> {
        if self.failing_upserts.lock().unwrap().contains(&target.name) {
            return Err(StoreError::Remote(format!(
                "injected upsert failure for '{}'",
                target.name
            )));
        }
        let mut collections = self.collections.lock().unwrap();
        let entry = collections
            .get_mut(&target.name)
            .ok_or_else(|| StoreError::CollectionNotFound(target.name.clone()))?;
        for point in points {
            entry.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        target: &CollectionHandle,
        ids: Vec<Uuid>,
    ) -> StoreResult<Vec<PointRecord>> {
        let collections = self.collections.lock().unwrap();
        let entry = collections
            .get(&target.name)
            .ok_or_else(|| StoreError::CollectionNotFound(target.name.clone()))?;
        Ok(ids
            .iter()
            .filter_map(|id| entry.points.get(id).cloned())
            .collect())
    }

    async fn scroll_all(
        &self,
        target: &CollectionHandle,
        filter: Option<PayloadFilter>,
    ) -> StoreResult<Vec<PointRecord>> {
        let collections = self.collections.lock().unwrap();
        let entry = collections
            .get(&target.name)
            .ok_or_else(|| StoreError::CollectionNotFound(target.name.clone()))?;
        Ok(entry
            .points
            .values()
            .filter(|point| {
                filter
                    .as_ref()
                    .is_none_or(|f| payload_matches(&point.payload, f))
            })
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        target: &CollectionHandle,
        _vector: Vec<f32>,
        filter: Option<PayloadFilter>,
        limit: u64,
    ) -> StoreResult<Vec<ScoredPoint>> {
        let points = self.scroll_all(target, filter).await?;
        Ok(points
            .into_iter()
            .take(limit as usize)
            .map(|point| ScoredPoint {
                id: point.id,
                score: 1.0,
                payload: point.payload,
            })
            .collect())
    }

    async fn delete_points(&self, target: &CollectionHandle, ids: Vec<Uuid>) -> StoreResult<()> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(entry) = collections.get_mut(&target.name) {
            for id in ids {
                entry.points.remove(&id);
            }
        }
        Ok(())
    }
}
