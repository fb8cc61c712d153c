use std::collections::BTreeSet;

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{BucketArena, SubAggregations};
use crate::aggregations::types::{AggregationResult, Bucket};
use crate::encoding::numeric;

/// Fixed-width numeric buckets keyed by `floor(value / interval) * interval`.
#[derive(Debug)]
pub struct HistogramAggregation {
    field: String,
    interval: f64,
    min_doc_count: i64,
    buckets: BucketArena<i64>,
}

impl HistogramAggregation {
    /// A non-positive or non-finite interval falls back to 1.0.
    pub fn new(
        field: impl Into<String>,
        interval: f64,
        min_doc_count: i64,
        sub_aggregations: SubAggregations,
    ) -> Self {
        let interval = if interval > 0.0 && interval.is_finite() {
            interval
        } else {
            tracing::debug!("Invalid histogram interval {}, using 1.0", interval);
            1.0
        };
        Self {
            field: field.into(),
            interval,
            min_doc_count: min_doc_count.max(0),
            buckets: BucketArena::new(sub_aggregations),
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    fn bucket_index(&self, value: f64) -> Option<i64> {
        let idx = (value / self.interval).floor();
        // out of i64 range or NaN
        (idx.is_finite() && idx.abs() < 9.0e18).then_some(idx as i64)
    }
}

impl AggregationBuilder for HistogramAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Histogram
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            if let Some(idx) = numeric::full_precision_f64(term).and_then(|v| self.bucket_index(v)) {
                self.buckets.enter(idx);
            }
        }
        self.buckets.record(field, term);
    }

    fn end_doc(&mut self) {
        self.buckets.end_doc();
    }

    fn result(&self) -> AggregationResult {
        let mut slots: Vec<_> = self
            .buckets
            .slots()
            .iter()
            .filter(|slot| slot.count >= self.min_doc_count)
            .collect();
        slots.sort_by_key(|slot| slot.key);

        let buckets = slots
            .into_iter()
            .map(|slot| {
                let mut bucket = Bucket::new(slot.key as f64 * self.interval, slot.count);
                bucket.aggregations = slot.sub_results();
                bucket
            })
            .collect();

        AggregationResult::with_buckets(&self.field, AggregationKind::Histogram, buckets)
            .with_metadata("interval", self.interval)
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            interval: self.interval,
            min_doc_count: self.min_doc_count,
            buckets: self.buckets.clone_empty(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity() + self.buckets.size_in_bytes(|_| 0)
    }
}

impl BucketAggregation for HistogramAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}
