use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::metric::numeric_value;
use crate::aggregations::types::{AggregationResult, AggregationValue};

#[derive(Debug)]
pub struct SumAggregation {
    field: String,
    sum: f64,
}

impl SumAggregation {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sum: 0.0,
        }
    }
}

impl AggregationBuilder for SumAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Sum
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if let Some(v) = numeric_value(&self.field, field, term) {
            self.sum += v;
        }
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        AggregationResult::metric(&self.field, AggregationKind::Sum, AggregationValue::Float(self.sum))
    }

    fn clone_empty(&self) -> Self {
        Self::new(self.field.clone())
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity()
    }
}
