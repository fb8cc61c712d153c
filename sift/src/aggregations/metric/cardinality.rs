use std::sync::Arc;

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::sketch::{HyperLogLog, DEFAULT_PRECISION};
use crate::aggregations::types::{AggregationResult, AggregationValue, CardinalityResult};

/// Approximate distinct count of the raw terms of a field.
#[derive(Debug)]
pub struct CardinalityAggregation {
    field: String,
    sketch: HyperLogLog,
}

impl CardinalityAggregation {
    /// Precision outside `4..=18` falls back to 14.
    pub fn new(field: impl Into<String>, precision: u8) -> Self {
        let sketch = HyperLogLog::new(precision).unwrap_or_else(|_| {
            tracing::debug!(
                "Invalid cardinality precision {}, using {}",
                precision,
                DEFAULT_PRECISION
            );
            HyperLogLog::default()
        });
        Self {
            field: field.into(),
            sketch,
        }
    }

    pub fn precision(&self) -> u8 {
        self.sketch.precision()
    }
}

impl AggregationBuilder for CardinalityAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Cardinality
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            self.sketch.insert(term);
        }
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        let card = CardinalityResult {
            cardinality: self.sketch.estimate() as i64,
            sketch_bytes: self.sketch.to_bytes(),
            sketch: Some(Arc::new(self.sketch.clone())),
        };
        AggregationResult::metric(
            &self.field,
            AggregationKind::Cardinality,
            AggregationValue::Cardinality(card),
        )
    }

    fn clone_empty(&self) -> Self {
        Self::new(self.field.clone(), self.sketch.precision())
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity() + self.sketch.size_in_bytes()
    }
}
