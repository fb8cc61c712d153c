use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregations::types::AggregationResult;

/// The fixed set of aggregation kinds the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    #[serde(rename = "sumsquares")]
    SumSquares,
    Stats,
    Cardinality,
    Terms,
    Range,
    DateRange,
    Histogram,
    DateHistogram,
    GeohashGrid,
    GeoDistance,
    SignificantTerms,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Count => "count",
            AggregationKind::SumSquares => "sumsquares",
            AggregationKind::Stats => "stats",
            AggregationKind::Cardinality => "cardinality",
            AggregationKind::Terms => "terms",
            AggregationKind::Range => "range",
            AggregationKind::DateRange => "date_range",
            AggregationKind::Histogram => "histogram",
            AggregationKind::DateHistogram => "date_histogram",
            AggregationKind::GeohashGrid => "geohash_grid",
            AggregationKind::GeoDistance => "geo_distance",
            AggregationKind::SignificantTerms => "significant_terms",
        }
    }

    /// Bucket kinds partition documents and may host sub-aggregations.
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            AggregationKind::Terms
                | AggregationKind::Range
                | AggregationKind::DateRange
                | AggregationKind::Histogram
                | AggregationKind::DateHistogram
                | AggregationKind::GeohashGrid
                | AggregationKind::GeoDistance
        )
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming accumulator driven one document at a time.
///
/// For every matching document the executor calls [`start_doc`], then
/// [`update_visitor`] once per `(field, term)` pair stored for the document,
/// then [`end_doc`]. Visits for fields the aggregation does not consume are
/// ignored, as are undecodable terms. [`result`] may be called at any time
/// and never fails.
///
/// [`start_doc`]: AggregationBuilder::start_doc
/// [`update_visitor`]: AggregationBuilder::update_visitor
/// [`end_doc`]: AggregationBuilder::end_doc
/// [`result`]: AggregationBuilder::result
pub trait AggregationBuilder: fmt::Debug + Send {
    fn field(&self) -> &str;

    fn kind(&self) -> AggregationKind;

    fn start_doc(&mut self);

    fn update_visitor(&mut self, field: &str, term: &[u8]);

    fn end_doc(&mut self);

    fn result(&self) -> AggregationResult;

    /// Same configuration, no accumulated state.
    fn clone_empty(&self) -> Self
    where
        Self: Sized;

    /// Approximate heap and inline footprint of the accumulator.
    fn size_in_bytes(&self) -> usize;
}

/// Aggregations that route documents into buckets with nested
/// sub-aggregations.
pub trait BucketAggregation: AggregationBuilder {
    /// Every field the nested sub-aggregations read, transitively.
    fn sub_aggregation_fields(&self) -> BTreeSet<String>;
}
