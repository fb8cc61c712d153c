use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::metric::numeric_value;
use crate::aggregations::types::{AggregationResult, AggregationValue};

#[derive(Debug)]
pub struct AvgAggregation {
    field: String,
    sum: f64,
    count: i64,
}

impl AvgAggregation {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sum: 0.0,
            count: 0,
        }
    }
}

impl AggregationBuilder for AvgAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Avg
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if let Some(v) = numeric_value(&self.field, field, term) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        let avg = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        };
        AggregationResult::metric(&self.field, AggregationKind::Avg, AggregationValue::Float(avg))
    }

    fn clone_empty(&self) -> Self {
        Self::new(self.field.clone())
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity()
    }
}
