//! Property tests: streaming metrics agree with their closed forms, and the
//! numeric term encoding preserves order.

use proptest::prelude::*;
use sift::aggregations::{
    AggregationBuilder, AvgAggregation, CountAggregation, MinMaxAggregation, StatsAggregation, SumAggregation,
};
use sift::encoding::numeric;

fn feed(agg: &mut impl AggregationBuilder, values: &[f64]) {
    for v in values {
        agg.start_doc();
        agg.update_visitor("v", &numeric::encode_f64(*v));
        agg.end_doc();
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
}

proptest! {
    #[test]
    fn prop_metrics_match_closed_form(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)) {
        let mut sum = SumAggregation::new("v");
        let mut avg = AvgAggregation::new("v");
        let mut min = MinMaxAggregation::min("v");
        let mut max = MinMaxAggregation::max("v");
        let mut count = CountAggregation::new("v");
        feed(&mut sum, &values);
        feed(&mut avg, &values);
        feed(&mut min, &values);
        feed(&mut max, &values);
        feed(&mut count, &values);

        let expected_sum: f64 = values.iter().sum();
        let expected_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let expected_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        prop_assert!(close(sum.result().value_f64().unwrap(), expected_sum));
        prop_assert!(close(avg.result().value_f64().unwrap(), expected_sum / values.len() as f64));
        prop_assert_eq!(min.result().value_f64().unwrap(), expected_min);
        prop_assert_eq!(max.result().value_f64().unwrap(), expected_max);
        prop_assert_eq!(count.result().value_f64().unwrap(), values.len() as f64);
    }

    #[test]
    fn prop_stats_variance_never_negative(values in prop::collection::vec(-1.0e3f64..1.0e3, 0..100)) {
        let mut stats = StatsAggregation::new("v");
        feed(&mut stats, &values);
        let result = stats.result();
        let s = result.stats().unwrap();
        prop_assert_eq!(s.count, values.len() as i64);
        prop_assert!(s.variance >= 0.0);
        prop_assert!(s.std_dev.is_finite());
    }

    #[test]
    fn prop_encoded_f64_sorts_like_value(a in -1.0e12f64..1.0e12, b in -1.0e12f64..1.0e12) {
        // -0.0 and 0.0 compare equal but encode differently
        prop_assume!(a != 0.0 && b != 0.0);
        let (ea, eb) = (numeric::encode_f64(a), numeric::encode_f64(b));
        prop_assert_eq!(a.partial_cmp(&b).unwrap(), ea.cmp(&eb));
        prop_assert_eq!(numeric::full_precision_f64(&ea), Some(a));
    }

    #[test]
    fn prop_shifted_terms_never_decode_at_full_precision(v in any::<i64>(), shift in 1u32..64) {
        let term = numeric::encode_i64(v, shift).unwrap();
        prop_assert_eq!(numeric::shift(&term), Some(shift));
        prop_assert_eq!(numeric::full_precision_i64(&term), None);
    }
}
