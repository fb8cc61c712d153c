use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::metric::numeric_value;
use crate::aggregations::types::{AggregationResult, AggregationValue, StatsResult};

/// Precomputed per-segment statistics for a numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub count: i64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: i64,
    sum: f64,
    sum_squares: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn observe(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_squares += v * v;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn fold_segment(&mut self, stats: &SegmentStats) {
        self.count += stats.count;
        self.sum += stats.sum;
        self.sum_squares += stats.sum_squares;
        if stats.count > 0 {
            self.min = Some(self.min.map_or(stats.min, |m| m.min(stats.min)));
            self.max = Some(self.max.map_or(stats.max, |m| m.max(stats.max)));
        }
    }

    fn finish(&self) -> StatsResult {
        let mut result = StatsResult {
            count: self.count,
            sum: self.sum,
            sum_squares: self.sum_squares,
            min: self.min.unwrap_or(0.0),
            max: self.max.unwrap_or(0.0),
            ..StatsResult::default()
        };
        if self.count > 0 {
            let n = self.count as f64;
            result.avg = self.sum / n;
            // cancellation can push this slightly below zero
            result.variance = (self.sum_squares / n - result.avg * result.avg).max(0.0);
            result.std_dev = result.variance.sqrt();
        }
        result
    }
}

/// Count, sum, min, max, sum of squares, mean, variance and standard
/// deviation in a single pass.
#[derive(Debug)]
pub struct StatsAggregation {
    field: String,
    acc: Accumulator,
    segment_stats: Option<Vec<SegmentStats>>,
}

impl StatsAggregation {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            acc: Accumulator::default(),
            segment_stats: None,
        }
    }

    /// Answer from precomputed segment statistics instead of visited values.
    /// Useful when every document of every segment matches.
    pub fn with_segment_stats(mut self, stats: Vec<SegmentStats>) -> Self {
        self.segment_stats = Some(stats);
        self
    }

    fn stats_result(&self) -> StatsResult {
        match &self.segment_stats {
            Some(segments) if !segments.is_empty() => {
                let mut acc = Accumulator::default();
                for segment in segments {
                    acc.fold_segment(segment);
                }
                acc.finish()
            }
            _ => self.acc.finish(),
        }
    }
}

impl AggregationBuilder for StatsAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Stats
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if let Some(v) = numeric_value(&self.field, field, term) {
            self.acc.observe(v);
        }
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        AggregationResult::metric(
            &self.field,
            AggregationKind::Stats,
            AggregationValue::Stats(self.stats_result()),
        )
    }

    /// Segment statistics describe one segment and are not carried over.
    fn clone_empty(&self) -> Self {
        Self::new(self.field.clone())
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.field.capacity()
            + self
                .segment_stats
                .as_ref()
                .map_or(0, |s| s.capacity() * std::mem::size_of::<SegmentStats>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::test_util::feed_f64;

    #[test]
    fn test_stats_aggregation() {
        let mut agg = StatsAggregation::new("value");
        feed_f64(&mut agg, "value", &[2.0, 4.0, 6.0, 8.0, 10.0]);

        let result = agg.result();
        let stats = result.stats().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.sum, 30.0);
        assert_eq!(stats.avg, 6.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.sum_squares, 220.0);
        assert!((stats.variance - 8.0).abs() < 1e-9);
        assert!((stats.std_dev - 8.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_stats_empty() {
        let result = StatsAggregation::new("value").result();
        assert_eq!(result.stats(), Some(&StatsResult::default()));
    }

    #[test]
    fn test_stats_variance_never_negative() {
        let mut agg = StatsAggregation::new("value");
        feed_f64(&mut agg, "value", &[0.1, 0.1, 0.1]);
        assert!(agg.result().stats().unwrap().variance >= 0.0);
    }

    #[test]
    fn test_stats_from_segment_stats() {
        let agg = StatsAggregation::new("value").with_segment_stats(vec![
            SegmentStats {
                count: 2,
                sum: 6.0,
                min: 2.0,
                max: 4.0,
                sum_squares: 20.0,
            },
            // empty segment: min/max must not leak in
            SegmentStats {
                count: 0,
                sum: 0.0,
                min: -100.0,
                max: 100.0,
                sum_squares: 0.0,
            },
            SegmentStats {
                count: 3,
                sum: 24.0,
                min: 6.0,
                max: 10.0,
                sum_squares: 200.0,
            },
        ]);

        let result = agg.result();
        let stats = result.stats().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.sum, 30.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 10.0);
        assert!((stats.variance - 8.0).abs() < 1e-9);

        assert!(agg.clone_empty().segment_stats.is_none());
    }
}
