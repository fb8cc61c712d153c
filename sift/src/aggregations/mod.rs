//! Streaming aggregations over the `(field, term)` visits of matching
//! documents.

mod agg_trait;
pub mod background;
pub mod bucket;
mod builder;
pub mod metric;
pub mod request;
pub mod sketch;
pub mod types;

pub use agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
pub use background::{
    collect_background_term_stats, BackgroundTermLookup, InMemoryTermStats, SignificantTermsStats,
};
pub use bucket::{
    CalendarInterval, DateHistogramAggregation, DateInterval, DateRange, DateRangeAggregation, DistanceRange,
    GeoDistanceAggregation, GeohashGridAggregation, HistogramAggregation, NumericRange, RangeAggregation,
    SignificanceAlgorithm, SignificantTermsAggregation, SubAggregations, TermsAggregation,
};
pub use builder::{Aggregation, AggregationsBuilder};
pub use metric::{
    AvgAggregation, CardinalityAggregation, CountAggregation, MinMaxAggregation, SegmentStats, StatsAggregation,
    SumAggregation, SumSquaresAggregation,
};
pub use request::{
    build_all, build_all_with_background, parse_json_requests, parse_yaml_requests, AggregationRequest,
    AggregationsRequest, BackgroundSources,
};
pub use sketch::HyperLogLog;
pub use types::{
    AggregationResult, AggregationResults, AggregationValue, Bucket, BucketKey, CardinalityResult, Metadata,
    StatsResult,
};
