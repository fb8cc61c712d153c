use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::AggregationKind;
use crate::aggregations::sketch::HyperLogLog;

/// Named results of a top-level aggregation tree.
pub type AggregationResults = BTreeMap<String, AggregationResult>;

/// Free-form per-result and per-bucket annotations.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: AggregationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AggregationValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<Bucket>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl AggregationResult {
    pub fn metric(field: impl Into<String>, kind: AggregationKind, value: AggregationValue) -> Self {
        Self {
            field: field.into(),
            kind,
            value: Some(value),
            buckets: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_buckets(field: impl Into<String>, kind: AggregationKind, buckets: Vec<Bucket>) -> Self {
        Self {
            field: field.into(),
            kind,
            value: None,
            buckets,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Scalar value as a float, for `Integer` and `Float` results.
    pub fn value_f64(&self) -> Option<f64> {
        match self.value.as_ref()? {
            AggregationValue::Integer(v) => Some(*v as f64),
            AggregationValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&StatsResult> {
        match self.value.as_ref()? {
            AggregationValue::Stats(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn cardinality(&self) -> Option<&CardinalityResult> {
        match self.value.as_ref()? {
            AggregationValue::Cardinality(card) => Some(card),
            _ => None,
        }
    }

    /// First bucket whose rendered key equals `key`.
    pub fn bucket(&self, key: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.key.to_string() == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationValue {
    Integer(i64),
    Float(f64),
    Stats(StatsResult),
    Cardinality(CardinalityResult),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub count: i64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
    pub variance: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardinalityResult {
    pub cardinality: i64,
    /// Serialized sketch for cross-shard union.
    #[serde(with = "base64_bytes")]
    pub sketch_bytes: Vec<u8>,
    /// Live sketch for in-process merging; never serialized.
    #[serde(skip)]
    pub sketch: Option<Arc<HyperLogLog>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub key: BucketKey,
    pub doc_count: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregations: AggregationResults,
}

impl Bucket {
    pub fn new(key: impl Into<BucketKey>, doc_count: i64) -> Self {
        Self {
            key: key.into(),
            doc_count,
            metadata: Metadata::new(),
            aggregations: AggregationResults::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn sub(&self, name: &str) -> Option<&AggregationResult> {
        self.aggregations.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketKey {
    Number(f64),
    Term(String),
}

impl BucketKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BucketKey::Term(s) => Some(s),
            BucketKey::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BucketKey::Number(n) => Some(*n),
            BucketKey::Term(_) => None,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Number(n) => write!(f, "{}", n),
            BucketKey::Term(s) => f.write_str(s),
        }
    }
}

impl From<String> for BucketKey {
    fn from(s: String) -> Self {
        BucketKey::Term(s)
    }
}

impl From<&str> for BucketKey {
    fn from(s: &str) -> Self {
        BucketKey::Term(s.to_string())
    }
}

impl From<f64> for BucketKey {
    fn from(n: f64) -> Self {
        BucketKey::Number(n)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
