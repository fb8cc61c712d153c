use std::collections::BTreeSet;

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{BucketArena, SubAggregations};
use crate::aggregations::bucket::normalize_size;
use crate::aggregations::types::{AggregationResult, Bucket};
use crate::encoding::geo::{self, MAX_GEOHASH_PRECISION};

pub const DEFAULT_GEOHASH_PRECISION: usize = 5;

/// Counts geo points per geohash cell and reports the busiest cells.
#[derive(Debug)]
pub struct GeohashGridAggregation {
    field: String,
    precision: usize,
    size: usize,
    buckets: BucketArena<String>,
}

impl GeohashGridAggregation {
    /// Precision outside `1..=12` falls back to 5; a `size` of zero to 10.
    pub fn new(field: impl Into<String>, precision: usize, size: usize, sub_aggregations: SubAggregations) -> Self {
        let precision = if (1..=MAX_GEOHASH_PRECISION).contains(&precision) {
            precision
        } else {
            tracing::debug!(
                "Invalid geohash precision {}, using {}",
                precision,
                DEFAULT_GEOHASH_PRECISION
            );
            DEFAULT_GEOHASH_PRECISION
        };
        Self {
            field: field.into(),
            precision,
            size: normalize_size(size),
            buckets: BucketArena::new(sub_aggregations),
        }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }
}

impl AggregationBuilder for GeohashGridAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::GeohashGrid
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            if let Some(point) = geo::decode_point(term) {
                let mut cell = geo::encode_geohash(point.lat, point.lon, MAX_GEOHASH_PRECISION);
                cell.truncate(self.precision);
                self.buckets.enter(cell);
            }
        }
        self.buckets.record(field, term);
    }

    fn end_doc(&mut self) {
        self.buckets.end_doc();
    }

    fn result(&self) -> AggregationResult {
        let mut slots: Vec<_> = self.buckets.slots().iter().collect();
        slots.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        slots.truncate(self.size);

        let buckets = slots
            .into_iter()
            .map(|slot| {
                let mut bucket = Bucket::new(slot.key.as_str(), slot.count);
                if let Some((lat, lon)) = geo::decode_geohash(&slot.key) {
                    bucket = bucket.with_metadata("lat", lat).with_metadata("lon", lon);
                }
                bucket.aggregations = slot.sub_results();
                bucket
            })
            .collect();

        AggregationResult::with_buckets(&self.field, AggregationKind::GeohashGrid, buckets)
            .with_metadata("precision", self.precision)
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            precision: self.precision,
            size: self.size,
            buckets: self.buckets.clone_empty(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity() + self.buckets.size_in_bytes(|key| key.capacity())
    }
}

impl BucketAggregation for GeohashGridAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}
