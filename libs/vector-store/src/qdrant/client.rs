use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeleteFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    GetPointsBuilder, PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use tracing::warn;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CollectionHandle, CollectionProfile, FieldCondition, FieldKind, MatchValue, PayloadFilter,
    PointRecord, ScoredPoint, VectorDistance, VectorProfile,
};
use crate::repository::RecordStore;
use crate::retry::{RetryPolicy, retry_linear};

const SCROLL_PAGE_SIZE: u32 = 256;

/// Qdrant-backed implementation of [`RecordStore`]
pub struct QdrantRecordStore {
    client: Qdrant,
    scroll_retry: RetryPolicy,
}

impl QdrantRecordStore {
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }

        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            scroll_retry: RetryPolicy::default(),
        })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self {
            client,
            scroll_retry: RetryPolicy::default(),
        }
    }

    fn to_qdrant_distance(distance: VectorDistance) -> Distance {
        match distance {
            VectorDistance::Cosine => Distance::Cosine,
            VectorDistance::Euclidean => Distance::Euclid,
            VectorDistance::DotProduct => Distance::Dot,
        }
    }

    fn from_qdrant_distance(distance: Distance) -> VectorDistance {
        match distance {
            Distance::Cosine => VectorDistance::Cosine,
            Distance::Euclid => VectorDistance::Euclidean,
            Distance::Dot => VectorDistance::DotProduct,
            _ => VectorDistance::Cosine,
        }
    }

    fn uuid_to_point_id(id: Uuid) -> PointId {
        PointId::from(id.to_string())
    }

    fn point_id_to_uuid(point_id: &PointId) -> StoreResult<Uuid> {
        match &point_id.point_id_options {
            Some(qdrant::point_id::PointIdOptions::Uuid(uuid_str)) => Uuid::parse_str(uuid_str)
                .map_err(|e| StoreError::Internal(format!("Invalid UUID: {}", e))),
            Some(qdrant::point_id::PointIdOptions::Num(num)) => Ok(Uuid::from_u128(*num as u128)),
            None => Err(StoreError::Internal("Missing point ID".to_string())),
        }
    }

    fn to_point_struct(target: &CollectionHandle, record: PointRecord) -> PointStruct {
        let payload = payload_to_qdrant(record.payload);
        match &target.named_vector {
            Some(vector_name) => {
                let mut vectors = HashMap::new();
                vectors.insert(vector_name.clone(), record.vector);
                PointStruct::new(Self::uuid_to_point_id(record.id), vectors, payload)
            }
            None => PointStruct::new(Self::uuid_to_point_id(record.id), record.vector, payload),
        }
    }

    fn to_qdrant_filter(filter: PayloadFilter) -> Filter {
        let conditions: Vec<Condition> = filter
            .must
            .into_iter()
            .map(|condition| match condition {
                FieldCondition::Match { key, value } => match value {
                    MatchValue::Keyword(s) => Condition::matches(key, s),
                    MatchValue::Bool(b) => Condition::matches(key, b),
                    MatchValue::Integer(i) => Condition::matches(key, i),
                },
                FieldCondition::Range {
                    key,
                    gte,
                    lte,
                    gt,
                    lt,
                } => Condition::range(key, qdrant::Range { lt, gt, gte, lte }),
            })
            .collect();

        Filter::must(conditions)
    }

    fn to_field_type(kind: FieldKind) -> FieldType {
        match kind {
            FieldKind::Keyword => FieldType::Keyword,
            FieldKind::Integer => FieldType::Integer,
            FieldKind::Bool => FieldType::Bool,
        }
    }

    fn from_schema_type(data_type: qdrant::PayloadSchemaType) -> Option<FieldKind> {
        match data_type {
            qdrant::PayloadSchemaType::Keyword => Some(FieldKind::Keyword),
            qdrant::PayloadSchemaType::Integer => Some(FieldKind::Integer),
            qdrant::PayloadSchemaType::Bool => Some(FieldKind::Bool),
            _ => None,
        }
    }

    fn retrieved_to_record(point: qdrant::RetrievedPoint) -> StoreResult<PointRecord> {
        let id = point
            .id
            .as_ref()
            .map(Self::point_id_to_uuid)
            .transpose()?
            .ok_or_else(|| StoreError::Internal("Missing point ID".to_string()))?;

        let vector = Self::extract_vector_from_output(&point.vectors).unwrap_or_default();

        Ok(PointRecord {
            id,
            vector,
            payload: qdrant_to_payload(point.payload),
        })
    }

    /// Extract vector values from VectorsOutput.
    /// Note: uses the deprecated data field until migration to 1.18+.
    #[allow(deprecated)]
    fn extract_vector_from_output(vectors: &Option<qdrant::VectorsOutput>) -> Option<Vec<f32>> {
        match vectors {
            Some(qdrant::VectorsOutput {
                vectors_options: Some(opts),
            }) => match opts {
                qdrant::vectors_output::VectorsOptions::Vector(v) => Some(v.data.clone()),
                qdrant::vectors_output::VectorsOptions::Vectors(map) => {
                    map.vectors.values().next().map(|v| v.data.clone())
                }
            },
            _ => None,
        }
    }

    /// Pull `{size, distance}` and the named-vector choice out of the
    /// collection config. A collection created elsewhere may report its
    /// vectors either as a single unnamed config or as a name→params map;
    /// both shapes are handled and the name (if any) is recorded so point
    /// operations can address it.
    fn extract_vector_params(
        config: &Option<qdrant::CollectionConfig>,
    ) -> Option<(u64, VectorDistance, Option<String>)> {
        let params = config.as_ref()?.params.as_ref()?;
        let vectors_config = params.vectors_config.as_ref()?;
        match vectors_config.config.as_ref()? {
            qdrant::vectors_config::Config::Params(p) => {
                Some((p.size, Self::from_qdrant_distance(p.distance()), None))
            }
            qdrant::vectors_config::Config::ParamsMap(map) => {
                let (name, p) = map.map.iter().next()?;
                Some((
                    p.size,
                    Self::from_qdrant_distance(p.distance()),
                    Some(name.clone()),
                ))
            }
        }
    }
}

fn payload_to_qdrant(payload: serde_json::Value) -> HashMap<String, QdrantValue> {
    let mut result = HashMap::new();

    if let serde_json::Value::Object(map) = payload {
        for (key, val) in map {
            if let Some(qdrant_val) = json_to_qdrant_value(val) {
                result.insert(key, qdrant_val);
            }
        }
    }

    result
}

fn qdrant_to_payload(payload: HashMap<String, QdrantValue>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, val) in payload {
        if let Some(json_val) = qdrant_value_to_json(val) {
            map.insert(key, json_val);
        }
    }

    serde_json::Value::Object(map)
}

fn json_to_qdrant_value(val: serde_json::Value) -> Option<QdrantValue> {
    use qdrant::value::Kind;

    let kind = match val {
        serde_json::Value::Null => return None,
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64()?)
            }
        }
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(qdrant::ListValue {
            values: items.into_iter().filter_map(json_to_qdrant_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(qdrant::Struct {
            fields: map
                .into_iter()
                .filter_map(|(k, v)| json_to_qdrant_value(v).map(|qv| (k, qv)))
                .collect(),
        }),
    };

    Some(QdrantValue { kind: Some(kind) })
}

fn qdrant_value_to_json(val: QdrantValue) -> Option<serde_json::Value> {
    use qdrant::value::Kind;

    match val.kind {
        Some(Kind::NullValue(_)) => Some(serde_json::Value::Null),
        Some(Kind::BoolValue(b)) => Some(serde_json::Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(serde_json::Value::Number(i.into())),
        Some(Kind::DoubleValue(f)) => {
            serde_json::Number::from_f64(f).map(serde_json::Value::Number)
        }
        Some(Kind::StringValue(s)) => Some(serde_json::Value::String(s)),
        Some(Kind::ListValue(list)) => Some(serde_json::Value::Array(
            list.values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect(),
        )),
        Some(Kind::StructValue(fields)) => Some(serde_json::Value::Object(
            fields
                .fields
                .into_iter()
                .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                .collect(),
        )),
        None => None,
    }
}

#[async_trait]
impl RecordStore for QdrantRecordStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let response = self.client.list_collections().await?;
        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn collection_profile(&self, name: &str) -> StoreResult<Option<CollectionProfile>> {
        let info = match self.client.collection_info(name).await {
            Ok(info) => info,
            // Absence is an answer; anything else must reach the caller as
            // the failure it is, not masquerade as a missing collection.
            Err(e) => {
                let err = StoreError::from(e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };

        let result = info
            .result
            .ok_or_else(|| StoreError::Internal("Collection info missing result".to_string()))?;

        let Some((dimension, distance, named_vector)) =
            Self::extract_vector_params(&result.config)
        else {
            return Ok(None);
        };

        let payload_indexes = result
            .payload_schema
            .iter()
            .filter_map(|(field, schema)| {
                Self::from_schema_type(schema.data_type()).map(|kind| (field.clone(), kind))
            })
            .collect();

        Ok(Some(CollectionProfile {
            dimension,
            distance,
            named_vector,
            payload_indexes,
        }))
    }

    async fn create_collection(&self, name: &str, profile: VectorProfile) -> StoreResult<()> {
        let builder = CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
            profile.dimension,
            Self::to_qdrant_distance(profile.distance),
        ));

        self.client.create_collection(builder).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.client.delete_collection(name).await?;
        Ok(())
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldKind,
    ) -> StoreResult<()> {
        let builder =
            CreateFieldIndexCollectionBuilder::new(collection, field, Self::to_field_type(kind));
        self.client.create_field_index(builder).await?;
        Ok(())
    }

    async fn delete_field_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        let builder = DeleteFieldIndexCollectionBuilder::new(collection, field);
        self.client.delete_field_index(builder).await?;
        Ok(())
    }

    async fn upsert(&self, target: &CollectionHandle, points: Vec<PointRecord>) -> StoreResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|record| Self::to_point_struct(target, record))
            .collect();

        let builder = UpsertPointsBuilder::new(&target.name, points).wait(true);
        self.client.upsert_points(builder).await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        target: &CollectionHandle,
        ids: Vec<Uuid>,
    ) -> StoreResult<Vec<PointRecord>> {
        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::uuid_to_point_id(*id)).collect();

        let builder = GetPointsBuilder::new(&target.name, point_ids)
            .with_payload(true)
            .with_vectors(true);

        let response = self.client.get_points(builder).await?;

        response
            .result
            .into_iter()
            .map(Self::retrieved_to_record)
            .collect()
    }

    async fn scroll_all(
        &self,
        target: &CollectionHandle,
        filter: Option<PayloadFilter>,
    ) -> StoreResult<Vec<PointRecord>> {
        let qdrant_filter = filter.map(Self::to_qdrant_filter);
        let mut records = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let page = retry_linear(
                || {
                    let mut builder = ScrollPointsBuilder::new(&target.name)
                        .limit(SCROLL_PAGE_SIZE)
                        .with_payload(true)
                        .with_vectors(false);
                    if let Some(f) = qdrant_filter.clone() {
                        builder = builder.filter(f);
                    }
                    if let Some(cursor) = offset.clone() {
                        builder = builder.offset(cursor);
                    }
                    async { self.client.scroll(builder).await }
                },
                &self.scroll_retry,
            )
            .await;

            let response = match page {
                Ok(response) => response,
                Err(e) => {
                    // Budget spent: return what we have rather than hanging
                    // the whole load on one bad page.
                    warn!(
                        collection = %target.name,
                        error = %e,
                        "Scroll retries exhausted, truncating result set"
                    );
                    break;
                }
            };

            let next = response.next_page_offset.clone();
            for point in response.result {
                records.push(Self::retrieved_to_record(point)?);
            }

            match next {
                Some(cursor) => offset = Some(cursor),
                None => break,
            }
        }

        Ok(records)
    }

    async fn search(
        &self,
        target: &CollectionHandle,
        vector: Vec<f32>,
        filter: Option<PayloadFilter>,
        limit: u64,
    ) -> StoreResult<Vec<ScoredPoint>> {
        let mut builder =
            SearchPointsBuilder::new(&target.name, vector, limit).with_payload(true);

        if let Some(f) = filter {
            builder = builder.filter(Self::to_qdrant_filter(f));
        }
        if let Some(vector_name) = &target.named_vector {
            builder = builder.vector_name(vector_name);
        }

        let response = self.client.search_points(builder).await?;

        response
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .as_ref()
                    .map(Self::point_id_to_uuid)
                    .transpose()?
                    .ok_or_else(|| StoreError::Internal("Missing point ID".to_string()))?;

                Ok(ScoredPoint {
                    id,
                    score: point.score,
                    payload: qdrant_to_payload(point.payload),
                })
            })
            .collect()
    }

    async fn delete_points(&self, target: &CollectionHandle, ids: Vec<Uuid>) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::uuid_to_point_id(*id)).collect();
        let builder = DeletePointsBuilder::new(&target.name)
            .points(point_ids)
            .wait(true);

        self.client.delete_points(builder).await?;
        Ok(())
    }
}
