mod arena;
mod date_histogram;
mod date_range;
mod geo_distance;
mod geohash_grid;
mod histogram;
mod range;
mod significant_terms;
mod terms;

pub use arena::SubAggregations;
pub use date_histogram::{
    format_fixed_interval, parse_fixed_interval, CalendarInterval, DateHistogramAggregation, DateInterval,
};
pub use date_range::{DateRange, DateRangeAggregation};
pub use geo_distance::{DistanceRange, GeoDistanceAggregation};
pub use geohash_grid::{GeohashGridAggregation, DEFAULT_GEOHASH_PRECISION};
pub use histogram::HistogramAggregation;
pub use range::{NumericRange, RangeAggregation};
pub use significant_terms::{SignificanceAlgorithm, SignificantTermsAggregation};
pub use terms::TermsAggregation;

pub const DEFAULT_SIZE: usize = 10;

pub(crate) fn normalize_size(size: usize) -> usize {
    if size == 0 {
        DEFAULT_SIZE
    } else {
        size
    }
}
