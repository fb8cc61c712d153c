use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{sub_results, BucketArena, SubAggregations};
use crate::aggregations::types::{AggregationResult, Bucket};
use crate::encoding::numeric;

/// Named half-open interval `[min, max)`; a missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub name: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn new(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value < max)
    }
}

/// Counts documents per configured numeric range. Ranges may overlap, and a
/// value lands in every range containing it.
#[derive(Debug)]
pub struct RangeAggregation {
    field: String,
    ranges: Vec<NumericRange>,
    buckets: BucketArena<usize>,
}

impl RangeAggregation {
    pub fn new(field: impl Into<String>, ranges: Vec<NumericRange>, sub_aggregations: SubAggregations) -> Self {
        Self {
            field: field.into(),
            ranges,
            buckets: BucketArena::new(sub_aggregations),
        }
    }

    pub fn ranges(&self) -> &[NumericRange] {
        &self.ranges
    }
}

impl AggregationBuilder for RangeAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Range
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            if let Some(value) = numeric::full_precision_f64(term) {
                for (idx, range) in self.ranges.iter().enumerate() {
                    if range.contains(value) {
                        self.buckets.enter(idx);
                    }
                }
            }
        }
        self.buckets.record(field, term);
    }

    fn end_doc(&mut self) {
        self.buckets.end_doc();
    }

    fn result(&self) -> AggregationResult {
        let mut order: Vec<usize> = (0..self.ranges.len()).collect();
        order.sort_by(|&a, &b| self.ranges[a].name.cmp(&self.ranges[b].name));

        let buckets = order
            .into_iter()
            .map(|idx| {
                let range = &self.ranges[idx];
                let mut bucket = match self.buckets.get(&idx) {
                    Some(slot) => {
                        let mut bucket = Bucket::new(range.name.as_str(), slot.count);
                        bucket.aggregations = slot.sub_results();
                        bucket
                    }
                    None => {
                        let mut bucket = Bucket::new(range.name.as_str(), 0);
                        bucket.aggregations = sub_results(self.buckets.template());
                        bucket
                    }
                };
                if let Some(min) = range.min {
                    bucket = bucket.with_metadata("min", min);
                }
                if let Some(max) = range.max {
                    bucket = bucket.with_metadata("max", max);
                }
                bucket
            })
            .collect();

        AggregationResult::with_buckets(&self.field, AggregationKind::Range, buckets)
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            ranges: self.ranges.clone(),
            buckets: self.buckets.clone_empty(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.field.capacity()
            + self
                .ranges
                .iter()
                .map(|r| std::mem::size_of::<NumericRange>() + r.name.capacity())
                .sum::<usize>()
            + self.buckets.size_in_bytes(|_| 0)
    }
}

impl BucketAggregation for RangeAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}
