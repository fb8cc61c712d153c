use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::metric::numeric_value;
use crate::aggregations::types::{AggregationResult, AggregationValue};

/// Number of decodable full-precision values seen for a field.
#[derive(Debug)]
pub struct CountAggregation {
    field: String,
    count: i64,
}

impl CountAggregation {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            count: 0,
        }
    }
}

impl AggregationBuilder for CountAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Count
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if numeric_value(&self.field, field, term).is_some() {
            self.count += 1;
        }
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        AggregationResult::metric(&self.field, AggregationKind::Count, AggregationValue::Integer(self.count))
    }

    fn clone_empty(&self) -> Self {
        Self::new(self.field.clone())
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity()
    }
}
