mod avg;
mod cardinality;
mod count;
mod minmax;
mod stats;
mod sum;
mod sum_squares;

pub use avg::AvgAggregation;
pub use cardinality::CardinalityAggregation;
pub use count::CountAggregation;
pub use minmax::MinMaxAggregation;
pub use stats::{SegmentStats, StatsAggregation};
pub use sum::SumAggregation;
pub use sum_squares::SumSquaresAggregation;

use crate::encoding::numeric;

/// Float carried by a visit to `own`; other fields and shifted or malformed
/// terms yield `None`.
pub(crate) fn numeric_value(own: &str, field: &str, term: &[u8]) -> Option<f64> {
    if field != own {
        return None;
    }
    numeric::full_precision_f64(term)
}
