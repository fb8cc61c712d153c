use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::background::{BackgroundTermLookup, SignificantTermsStats};
use crate::aggregations::bucket::{
    DateHistogramAggregation, DateRangeAggregation, GeoDistanceAggregation, GeohashGridAggregation,
    HistogramAggregation, RangeAggregation, SignificantTermsAggregation, TermsAggregation,
};
use crate::aggregations::metric::{
    AvgAggregation, CardinalityAggregation, CountAggregation, MinMaxAggregation, StatsAggregation, SumAggregation,
    SumSquaresAggregation,
};
use crate::aggregations::types::AggregationResults;

/// Every aggregation the engine can run.
#[derive(Debug)]
pub enum Aggregation {
    Sum(SumAggregation),
    Avg(AvgAggregation),
    Min(MinMaxAggregation),
    Max(MinMaxAggregation),
    Count(CountAggregation),
    SumSquares(SumSquaresAggregation),
    Stats(StatsAggregation),
    Cardinality(CardinalityAggregation),
    Terms(TermsAggregation),
    Range(RangeAggregation),
    DateRange(DateRangeAggregation),
    Histogram(HistogramAggregation),
    DateHistogram(DateHistogramAggregation),
    GeohashGrid(GeohashGridAggregation),
    GeoDistance(GeoDistanceAggregation),
    SignificantTerms(SignificantTermsAggregation),
}

macro_rules! dispatch {
    ($self:expr, $agg:ident => $body:expr) => {
        match $self {
            Aggregation::Sum($agg) => $body,
            Aggregation::Avg($agg) => $body,
            Aggregation::Min($agg) => $body,
            Aggregation::Max($agg) => $body,
            Aggregation::Count($agg) => $body,
            Aggregation::SumSquares($agg) => $body,
            Aggregation::Stats($agg) => $body,
            Aggregation::Cardinality($agg) => $body,
            Aggregation::Terms($agg) => $body,
            Aggregation::Range($agg) => $body,
            Aggregation::DateRange($agg) => $body,
            Aggregation::Histogram($agg) => $body,
            Aggregation::DateHistogram($agg) => $body,
            Aggregation::GeohashGrid($agg) => $body,
            Aggregation::GeoDistance($agg) => $body,
            Aggregation::SignificantTerms($agg) => $body,
        }
    };
}

macro_rules! impl_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Aggregation {
                fn from(agg: $ty) -> Self {
                    Aggregation::$variant(agg)
                }
            }
        )*
    };
}

impl_from! {
    Sum => SumAggregation,
    Avg => AvgAggregation,
    Count => CountAggregation,
    SumSquares => SumSquaresAggregation,
    Stats => StatsAggregation,
    Cardinality => CardinalityAggregation,
    Terms => TermsAggregation,
    Range => RangeAggregation,
    DateRange => DateRangeAggregation,
    Histogram => HistogramAggregation,
    DateHistogram => DateHistogramAggregation,
    GeohashGrid => GeohashGridAggregation,
    GeoDistance => GeoDistanceAggregation,
    SignificantTerms => SignificantTermsAggregation,
}

impl From<MinMaxAggregation> for Aggregation {
    fn from(agg: MinMaxAggregation) -> Self {
        match agg.kind() {
            AggregationKind::Min => Aggregation::Min(agg),
            _ => Aggregation::Max(agg),
        }
    }
}

impl Aggregation {
    pub fn is_bucket(&self) -> bool {
        self.kind().is_bucket()
    }

    /// Fields read by nested sub-aggregations; empty for metrics.
    pub fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        match self {
            Aggregation::Terms(agg) => agg.sub_aggregation_fields(),
            Aggregation::Range(agg) => agg.sub_aggregation_fields(),
            Aggregation::DateRange(agg) => agg.sub_aggregation_fields(),
            Aggregation::Histogram(agg) => agg.sub_aggregation_fields(),
            Aggregation::DateHistogram(agg) => agg.sub_aggregation_fields(),
            Aggregation::GeohashGrid(agg) => agg.sub_aggregation_fields(),
            Aggregation::GeoDistance(agg) => agg.sub_aggregation_fields(),
            _ => BTreeSet::new(),
        }
    }
}

impl AggregationBuilder for Aggregation {
    fn field(&self) -> &str {
        dispatch!(self, agg => agg.field())
    }

    fn kind(&self) -> AggregationKind {
        dispatch!(self, agg => agg.kind())
    }

    fn start_doc(&mut self) {
        dispatch!(self, agg => agg.start_doc())
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        dispatch!(self, agg => agg.update_visitor(field, term))
    }

    fn end_doc(&mut self) {
        dispatch!(self, agg => agg.end_doc())
    }

    fn result(&self) -> crate::aggregations::types::AggregationResult {
        dispatch!(self, agg => agg.result())
    }

    fn clone_empty(&self) -> Self {
        match self {
            Aggregation::Sum(agg) => Aggregation::Sum(agg.clone_empty()),
            Aggregation::Avg(agg) => Aggregation::Avg(agg.clone_empty()),
            Aggregation::Min(agg) => Aggregation::Min(agg.clone_empty()),
            Aggregation::Max(agg) => Aggregation::Max(agg.clone_empty()),
            Aggregation::Count(agg) => Aggregation::Count(agg.clone_empty()),
            Aggregation::SumSquares(agg) => Aggregation::SumSquares(agg.clone_empty()),
            Aggregation::Stats(agg) => Aggregation::Stats(agg.clone_empty()),
            Aggregation::Cardinality(agg) => Aggregation::Cardinality(agg.clone_empty()),
            Aggregation::Terms(agg) => Aggregation::Terms(agg.clone_empty()),
            Aggregation::Range(agg) => Aggregation::Range(agg.clone_empty()),
            Aggregation::DateRange(agg) => Aggregation::DateRange(agg.clone_empty()),
            Aggregation::Histogram(agg) => Aggregation::Histogram(agg.clone_empty()),
            Aggregation::DateHistogram(agg) => Aggregation::DateHistogram(agg.clone_empty()),
            Aggregation::GeohashGrid(agg) => Aggregation::GeohashGrid(agg.clone_empty()),
            Aggregation::GeoDistance(agg) => Aggregation::GeoDistance(agg.clone_empty()),
            Aggregation::SignificantTerms(agg) => Aggregation::SignificantTerms(agg.clone_empty()),
        }
    }

    fn size_in_bytes(&self) -> usize {
        dispatch!(self, agg => agg.size_in_bytes())
    }
}

/// Named top-level aggregations driven together over one document stream.
///
/// Each aggregation is routed the visits for its own field and, for bucket
/// aggregations, for every field its sub-aggregations read.
#[derive(Debug, Default)]
pub struct AggregationsBuilder {
    names: Vec<String>,
    aggregations: Vec<Aggregation>,
    by_field: HashMap<String, Vec<usize>>,
    required_fields: Vec<String>,
}

impl AggregationsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, aggregation: impl Into<Aggregation>) -> Self {
        self.insert(name, aggregation);
        self
    }

    /// Add an aggregation; an existing aggregation with the same name is
    /// replaced.
    pub fn insert(&mut self, name: impl Into<String>, aggregation: impl Into<Aggregation>) {
        let name = name.into();
        let aggregation = aggregation.into();
        match self.names.iter().position(|n| *n == name) {
            Some(idx) => self.aggregations[idx] = aggregation,
            None => {
                self.names.push(name);
                self.aggregations.push(aggregation);
            }
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_field.clear();
        self.required_fields.clear();
        for (idx, agg) in self.aggregations.iter().enumerate() {
            let mut fields = vec![agg.field().to_string()];
            fields.extend(agg.sub_aggregation_fields());
            for field in fields {
                let routes = self.by_field.entry(field.clone()).or_default();
                if routes.contains(&idx) {
                    continue;
                }
                if routes.is_empty() {
                    self.required_fields.push(field);
                }
                routes.push(idx);
            }
        }
    }

    /// Fields the executor must visit, in first-registration order.
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn len(&self) -> usize {
        self.aggregations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregations.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Aggregation> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.aggregations[idx])
    }

    pub fn start_doc(&mut self) {
        for agg in &mut self.aggregations {
            agg.start_doc();
        }
    }

    pub fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if let Some(routes) = self.by_field.get(field) {
            for &idx in routes {
                self.aggregations[idx].update_visitor(field, term);
            }
        }
    }

    pub fn end_doc(&mut self) {
        for agg in &mut self.aggregations {
            agg.end_doc();
        }
    }

    pub fn results(&self) -> AggregationResults {
        self.names
            .iter()
            .zip(&self.aggregations)
            .map(|(name, agg)| (name.clone(), agg.result()))
            .collect()
    }

    /// Same aggregations, no accumulated state; one per segment or shard.
    pub fn clone_empty(&self) -> Self {
        let mut cloned = Self {
            names: self.names.clone(),
            aggregations: self.aggregations.iter().map(Aggregation::clone_empty).collect(),
            by_field: HashMap::new(),
            required_fields: Vec::new(),
        };
        cloned.reindex();
        cloned
    }

    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .names
                .iter()
                .zip(&self.aggregations)
                .map(|(name, agg)| name.capacity() + agg.size_in_bytes())
                .sum::<usize>()
    }

    /// Give top-level significant-terms aggregations on `stats.field` their
    /// precomputed background.
    pub fn set_background_stats(&mut self, stats: Arc<SignificantTermsStats>) {
        for agg in &mut self.aggregations {
            if let Aggregation::SignificantTerms(sig) = agg {
                if sig.field() == stats.field {
                    sig.set_background_stats(stats.clone());
                }
            }
        }
    }

    /// Give top-level significant-terms aggregations an index lookup.
    pub fn set_background_lookup(&mut self, lookup: Arc<dyn BackgroundTermLookup>) {
        for agg in &mut self.aggregations {
            if let Aggregation::SignificantTerms(sig) = agg {
                sig.set_lookup(lookup.clone());
            }
        }
    }
}
