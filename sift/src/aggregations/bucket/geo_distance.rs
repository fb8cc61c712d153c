use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{sub_results, BucketArena, SubAggregations};
use crate::aggregations::types::{AggregationResult, Bucket};
use crate::encoding::geo::{self, DistanceUnit, GeoPoint};

/// Named half-open distance band `[from, to)` in the aggregation's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceRange {
    pub name: String,
    #[serde(default)]
    pub from: Option<f64>,
    #[serde(default)]
    pub to: Option<f64>,
}

impl DistanceRange {
    pub fn new(name: impl Into<String>, from: Option<f64>, to: Option<f64>) -> Self {
        Self {
            name: name.into(),
            from,
            to,
        }
    }

    pub fn contains(&self, distance: f64) -> bool {
        self.from.map_or(true, |from| distance >= from) && self.to.map_or(true, |to| distance < to)
    }
}

/// Buckets documents by great-circle distance from a centre point.
#[derive(Debug)]
pub struct GeoDistanceAggregation {
    field: String,
    center: GeoPoint,
    unit: DistanceUnit,
    ranges: Vec<DistanceRange>,
    buckets: BucketArena<usize>,
}

impl GeoDistanceAggregation {
    pub fn new(
        field: impl Into<String>,
        center: GeoPoint,
        unit: DistanceUnit,
        ranges: Vec<DistanceRange>,
        sub_aggregations: SubAggregations,
    ) -> Self {
        Self {
            field: field.into(),
            center,
            unit,
            ranges,
            buckets: BucketArena::new(sub_aggregations),
        }
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn unit(&self) -> DistanceUnit {
        self.unit
    }

    fn by_from(a: &DistanceRange, b: &DistanceRange) -> Ordering {
        match (a.from, b.from) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.total_cmp(&y),
        }
        .then_with(|| a.name.cmp(&b.name))
    }
}

impl AggregationBuilder for GeoDistanceAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::GeoDistance
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            if let Some(point) = geo::decode_point(term) {
                let distance = self.unit.from_km(self.center.distance_km(&point));
                for (idx, range) in self.ranges.iter().enumerate() {
                    if range.contains(distance) {
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
        order.sort_by(|&a, &b| Self::by_from(&self.ranges[a], &self.ranges[b]));

        let buckets = order
            .into_iter()
            .map(|idx| {
                let range = &self.ranges[idx];
                let (count, aggregations) = match self.buckets.get(&idx) {
                    Some(slot) => (slot.count, slot.sub_results()),
                    None => (0, sub_results(self.buckets.template())),
                };
                let mut bucket = Bucket::new(range.name.as_str(), count)
                    .with_metadata("from", range.from)
                    .with_metadata("to", range.to);
                bucket.aggregations = aggregations;
                bucket
            })
            .collect();

        AggregationResult::with_buckets(&self.field, AggregationKind::GeoDistance, buckets)
            .with_metadata("center_lat", self.center.lat)
            .with_metadata("center_lon", self.center.lon)
            .with_metadata("unit", self.unit.as_str())
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            center: self.center,
            unit: self.unit,
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
                .map(|r| std::mem::size_of::<DistanceRange>() + r.name.capacity())
                .sum::<usize>()
            + self.buckets.size_in_bytes(|_| 0)
    }
}

impl BucketAggregation for GeoDistanceAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}
