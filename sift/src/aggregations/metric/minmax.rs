use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::metric::numeric_value;
use crate::aggregations::types::{AggregationResult, AggregationValue};

/// Minimum or maximum of a numeric field. Reports 0 until a value is seen.
#[derive(Debug)]
pub struct MinMaxAggregation {
    field: String,
    is_min: bool,
    value: Option<f64>,
}

impl MinMaxAggregation {
    pub fn min(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            is_min: true,
            value: None,
        }
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            is_min: false,
            value: None,
        }
    }
}

impl AggregationBuilder for MinMaxAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        if self.is_min {
            AggregationKind::Min
        } else {
            AggregationKind::Max
        }
    }

    fn start_doc(&mut self) {}

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        let Some(v) = numeric_value(&self.field, field, term) else {
            return;
        };
        self.value = Some(match self.value {
            None => v,
            Some(acc) if self.is_min => acc.min(v),
            Some(acc) => acc.max(v),
        });
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        AggregationResult::metric(
            &self.field,
            self.kind(),
            AggregationValue::Float(self.value.unwrap_or(0.0)),
        )
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            is_min: self.is_min,
            value: None,
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity()
    }
}
