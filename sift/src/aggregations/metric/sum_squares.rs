use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::metric::numeric_value;
use crate::aggregations::types::{AggregationResult, AggregationValue};

#[derive(Debug)]
pub struct SumSquaresAggregation {
    field: String,
    sum_squares: f64,
}

impl SumSquaresAggregation {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sum_squares: 0.0,
        }
    }
}

impl AggregationBuilder for SumSquaresAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::SumSquares
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if let Some(v) = numeric_value(&self.field, field, term) {
            self.sum_squares += v * v;
        }
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        AggregationResult::metric(
            &self.field,
            AggregationKind::SumSquares,
            AggregationValue::Float(self.sum_squares),
        )
    }

    fn clone_empty(&self) -> Self {
        Self::new(self.field.clone())
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity()
    }
}
