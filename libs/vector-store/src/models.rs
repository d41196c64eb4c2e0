use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Distance metric for similarity calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VectorDistance {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

/// Expected vector configuration for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorProfile {
    pub dimension: u64,
    pub distance: VectorDistance,
}

impl VectorProfile {
    pub fn new(dimension: u64) -> Self {
        Self {
            dimension,
            distance: VectorDistance::default(),
        }
    }

    pub fn with_distance(mut self, distance: VectorDistance) -> Self {
        self.distance = distance;
        self
    }
}

/// Payload field index type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Keyword,
    Integer,
    Bool,
}

/// Observed configuration of a remote collection.
///
/// `named_vector` records whether the collection stores its vectors under a
/// name (vs. a single unnamed vector); reads and writes against the
/// collection must address the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionProfile {
    pub dimension: u64,
    pub distance: VectorDistance,
    pub named_vector: Option<String>,
    pub payload_indexes: HashMap<String, FieldKind>,
}

impl CollectionProfile {
    pub fn matches(&self, expected: &VectorProfile) -> bool {
        self.dimension == expected.dimension && self.distance == expected.distance
    }
}

/// Handle to a verified-ready collection, carrying the vector addressing
/// choice every point operation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
    pub named_vector: Option<String>,
}

impl CollectionHandle {
    pub fn unnamed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            named_vector: None,
        }
    }

    pub fn named(name: impl Into<String>, vector_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            named_vector: Some(vector_name.into()),
        }
    }
}

/// A point record: id, vector and JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

impl PointRecord {
    pub fn new(id: Uuid, vector: Vec<f32>, payload: serde_json::Value) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// A search hit with similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// Value to match a payload field against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchValue {
    Keyword(String),
    Bool(bool),
    Integer(i64),
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Keyword(value.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        MatchValue::Keyword(value)
    }
}

impl From<Uuid> for MatchValue {
    fn from(value: Uuid) -> Self {
        MatchValue::Keyword(value.to_string())
    }
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        MatchValue::Bool(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        MatchValue::Integer(value)
    }
}

/// A single payload condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldCondition {
    Match {
        key: String,
        value: MatchValue,
    },
    Range {
        key: String,
        gte: Option<f64>,
        lte: Option<f64>,
        gt: Option<f64>,
        lt: Option<f64>,
    },
}

impl FieldCondition {
    pub fn matches(key: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        FieldCondition::Match {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn greater_than(key: impl Into<String>, value: f64) -> Self {
        FieldCondition::Range {
            key: key.into(),
            gte: None,
            lte: None,
            gt: Some(value),
            lt: None,
        }
    }
}

/// Conjunction of payload conditions (`must` semantics)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub must: Vec<FieldCondition>,
}

impl PayloadFilter {
    pub fn all(conditions: impl IntoIterator<Item = FieldCondition>) -> Self {
        Self {
            must: conditions.into_iter().collect(),
        }
    }

    pub fn and(mut self, condition: FieldCondition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_match() {
        let expected = VectorProfile::new(768);
        let observed = CollectionProfile {
            dimension: 768,
            distance: VectorDistance::Cosine,
            named_vector: None,
            payload_indexes: HashMap::new(),
        };
        assert!(observed.matches(&expected));
    }

    #[test]
    fn test_profile_mismatch_on_dimension() {
        let expected = VectorProfile::new(768);
        let observed = CollectionProfile {
            dimension: 1536,
            distance: VectorDistance::Cosine,
            named_vector: None,
            payload_indexes: HashMap::new(),
        };
        assert!(!observed.matches(&expected));
    }

    #[test]
    fn test_profile_mismatch_on_distance() {
        let expected = VectorProfile::new(768).with_distance(VectorDistance::Cosine);
        let observed = CollectionProfile {
            dimension: 768,
            distance: VectorDistance::DotProduct,
            named_vector: Some("default".to_string()),
            payload_indexes: HashMap::new(),
        };
        assert!(!observed.matches(&expected));
    }

    #[test]
    fn test_filter_builder() {
        let shop = Uuid::new_v4();
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", shop)])
            .and(FieldCondition::matches("status", "ACTIVE"))
            .and(FieldCondition::greater_than("quantity", 0.0));
        assert_eq!(filter.must.len(), 3);
    }
}
