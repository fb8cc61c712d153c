//! Declarative aggregation requests (JSON / YAML) and their conversion into
//! runnable builders.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::AggregationBuilder;
use crate::aggregations::background::{BackgroundTermLookup, SignificantTermsStats};
use crate::aggregations::bucket::{
    parse_fixed_interval, CalendarInterval, DateHistogramAggregation, DateInterval, DateRange,
    DateRangeAggregation, DistanceRange, GeoDistanceAggregation, GeohashGridAggregation, HistogramAggregation,
    NumericRange, RangeAggregation, SignificanceAlgorithm, SignificantTermsAggregation, SubAggregations,
    TermsAggregation,
};
use crate::aggregations::builder::{Aggregation, AggregationsBuilder};
use crate::aggregations::metric::{
    AvgAggregation, CardinalityAggregation, CountAggregation, MinMaxAggregation, SegmentStats, StatsAggregation,
    SumAggregation, SumSquaresAggregation,
};
use crate::config::AggregationDefaults;
use crate::encoding::{DistanceUnit, GeoPoint};
use crate::{Error, Result};

/// Named aggregation requests.
pub type AggregationsRequest = BTreeMap<String, AggregationRequest>;

/// One aggregation request, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationRequest {
    Sum {
        field: String,
    },
    Avg {
        field: String,
    },
    Min {
        field: String,
    },
    Max {
        field: String,
    },
    Count {
        field: String,
    },
    #[serde(rename = "sumsquares")]
    SumSquares {
        field: String,
    },
    Stats {
        field: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        segment_stats: Vec<SegmentStats>,
    },
    Cardinality {
        field: String,
        #[serde(default)]
        precision: Option<i64>,
    },
    Terms {
        field: String,
        #[serde(default)]
        size: Option<i64>,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        regex: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    Range {
        field: String,
        ranges: Vec<NumericRange>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    DateRange {
        field: String,
        ranges: Vec<DateRange>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    Histogram {
        field: String,
        interval: f64,
        #[serde(default)]
        min_doc_count: Option<i64>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    DateHistogram {
        field: String,
        #[serde(default)]
        calendar_interval: Option<String>,
        #[serde(default)]
        fixed_interval: Option<String>,
        #[serde(default)]
        min_doc_count: Option<i64>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    GeohashGrid {
        field: String,
        #[serde(default)]
        precision: Option<i64>,
        #[serde(default)]
        size: Option<i64>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    GeoDistance {
        field: String,
        origin: GeoPoint,
        #[serde(default)]
        unit: Option<String>,
        ranges: Vec<DistanceRange>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        aggregations: AggregationsRequest,
    },
    SignificantTerms {
        field: String,
        #[serde(default)]
        size: Option<i64>,
        #[serde(default)]
        min_doc_count: Option<i64>,
        #[serde(default)]
        algorithm: Option<String>,
    },
}

/// Background sources handed to significant-terms aggregations at build time,
/// including ones nested under bucket aggregations.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSources {
    stats: BTreeMap<String, Arc<SignificantTermsStats>>,
    lookup: Option<Arc<dyn BackgroundTermLookup>>,
}

impl BackgroundSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(mut self, stats: SignificantTermsStats) -> Self {
        self.stats.insert(stats.field.clone(), Arc::new(stats));
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn BackgroundTermLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    fn apply(&self, agg: SignificantTermsAggregation) -> SignificantTermsAggregation {
        let mut agg = agg;
        if let Some(stats) = self.stats.get(agg.field()) {
            agg.set_background_stats(stats.clone());
        }
        if let Some(lookup) = &self.lookup {
            agg.set_lookup(lookup.clone());
        }
        agg
    }
}

/// Positive sizes are taken as is; anything else uses the default.
fn size_or(size: Option<i64>, default: usize) -> usize {
    match size {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(default),
        _ => default,
    }
}

impl AggregationRequest {
    pub fn field(&self) -> &str {
        match self {
            AggregationRequest::Sum { field }
            | AggregationRequest::Avg { field }
            | AggregationRequest::Min { field }
            | AggregationRequest::Max { field }
            | AggregationRequest::Count { field }
            | AggregationRequest::SumSquares { field }
            | AggregationRequest::Stats { field, .. }
            | AggregationRequest::Cardinality { field, .. }
            | AggregationRequest::Terms { field, .. }
            | AggregationRequest::Range { field, .. }
            | AggregationRequest::DateRange { field, .. }
            | AggregationRequest::Histogram { field, .. }
            | AggregationRequest::DateHistogram { field, .. }
            | AggregationRequest::GeohashGrid { field, .. }
            | AggregationRequest::GeoDistance { field, .. }
            | AggregationRequest::SignificantTerms { field, .. } => field,
        }
    }

    pub fn build(&self, defaults: &AggregationDefaults) -> Result<Aggregation> {
        self.build_with_background(defaults, &BackgroundSources::default())
    }

    pub fn build_with_background(
        &self,
        defaults: &AggregationDefaults,
        background: &BackgroundSources,
    ) -> Result<Aggregation> {
        let subs = |requests: &AggregationsRequest| -> Result<SubAggregations> {
            requests
                .iter()
                .map(|(name, req)| Ok((name.clone(), req.build_with_background(defaults, background)?)))
                .collect()
        };

        let agg: Aggregation = match self {
            AggregationRequest::Sum { field } => SumAggregation::new(field).into(),
            AggregationRequest::Avg { field } => AvgAggregation::new(field).into(),
            AggregationRequest::Min { field } => MinMaxAggregation::min(field).into(),
            AggregationRequest::Max { field } => MinMaxAggregation::max(field).into(),
            AggregationRequest::Count { field } => CountAggregation::new(field).into(),
            AggregationRequest::SumSquares { field } => SumSquaresAggregation::new(field).into(),
            AggregationRequest::Stats { field, segment_stats } => {
                let agg = StatsAggregation::new(field);
                if segment_stats.is_empty() {
                    agg.into()
                } else {
                    agg.with_segment_stats(segment_stats.clone()).into()
                }
            }
            AggregationRequest::Cardinality { field, precision } => {
                let precision = match precision {
                    Some(p) => u8::try_from(*p).unwrap_or(0),
                    None => defaults.cardinality_precision,
                };
                CardinalityAggregation::new(field, precision).into()
            }
            AggregationRequest::Terms {
                field,
                size,
                prefix,
                regex,
                aggregations,
            } => {
                let mut agg = TermsAggregation::new(field, size_or(*size, defaults.terms_size), subs(aggregations)?);
                if let Some(prefix) = prefix {
                    agg = agg.with_prefix(prefix.as_bytes());
                }
                if let Some(pattern) = regex {
                    let re = Regex::new(pattern)
                        .map_err(|e| Error::InvalidRequest(format!("invalid regex '{}': {}", pattern, e)))?;
                    agg = agg.with_regex(re);
                }
                agg.into()
            }
            AggregationRequest::Range {
                field,
                ranges,
                aggregations,
            } => RangeAggregation::new(field, ranges.clone(), subs(aggregations)?).into(),
            AggregationRequest::DateRange {
                field,
                ranges,
                aggregations,
            } => DateRangeAggregation::new(field, ranges.clone(), subs(aggregations)?).into(),
            AggregationRequest::Histogram {
                field,
                interval,
                min_doc_count,
                aggregations,
            } => HistogramAggregation::new(
                field,
                *interval,
                min_doc_count.unwrap_or(defaults.histogram_min_doc_count),
                subs(aggregations)?,
            )
            .into(),
            AggregationRequest::DateHistogram {
                field,
                calendar_interval,
                fixed_interval,
                min_doc_count,
                aggregations,
            } => {
                let interval = match (calendar_interval, fixed_interval) {
                    (Some(_), Some(_)) => {
                        return Err(Error::InvalidRequest(format!(
                            "date_histogram on '{}' sets both calendar_interval and fixed_interval",
                            field
                        )))
                    }
                    (Some(calendar), None) => CalendarInterval::parse(calendar)
                        .map(DateInterval::Calendar)
                        .ok_or_else(|| Error::InvalidRequest(format!("unknown calendar interval '{}'", calendar)))?,
                    (None, Some(fixed)) => DateInterval::Fixed(parse_fixed_interval(fixed)?),
                    (None, None) => DateInterval::default(),
                };
                DateHistogramAggregation::new(
                    field,
                    interval,
                    min_doc_count.unwrap_or(defaults.histogram_min_doc_count),
                    subs(aggregations)?,
                )
                .into()
            }
            AggregationRequest::GeohashGrid {
                field,
                precision,
                size,
                aggregations,
            } => {
                let precision = match precision {
                    Some(p) => usize::try_from(*p).unwrap_or(0),
                    None => defaults.geohash_precision,
                };
                GeohashGridAggregation::new(
                    field,
                    precision,
                    size_or(*size, defaults.geohash_size),
                    subs(aggregations)?,
                )
                .into()
            }
            AggregationRequest::GeoDistance {
                field,
                origin,
                unit,
                ranges,
                aggregations,
            } => {
                let unit_name = unit.as_deref().unwrap_or(&defaults.distance_unit);
                let unit = DistanceUnit::parse(unit_name).unwrap_or_else(|| {
                    tracing::debug!("Unknown distance unit '{}', using km", unit_name);
                    DistanceUnit::default()
                });
                GeoDistanceAggregation::new(field, *origin, unit, ranges.clone(), subs(aggregations)?).into()
            }
            AggregationRequest::SignificantTerms {
                field,
                size,
                min_doc_count,
                algorithm,
            } => {
                let name = algorithm.as_deref().unwrap_or(&defaults.significance_algorithm);
                let algorithm = SignificanceAlgorithm::parse(name)
                    .ok_or_else(|| Error::InvalidRequest(format!("unknown significance algorithm '{}'", name)))?;
                let agg = SignificantTermsAggregation::new(
                    field,
                    size_or(*size, defaults.significant_terms_size),
                    min_doc_count.unwrap_or(0),
                    algorithm,
                );
                background.apply(agg).into()
            }
        };
        Ok(agg)
    }
}

/// Parse named requests from JSON.
pub fn parse_json_requests(s: &str) -> Result<AggregationsRequest> {
    Ok(serde_json::from_str(s)?)
}

/// Parse named requests from YAML.
pub fn parse_yaml_requests(s: &str) -> Result<AggregationsRequest> {
    Ok(serde_yaml::from_str(s)?)
}

/// Build every named request into one driver.
pub fn build_all(requests: &AggregationsRequest, defaults: &AggregationDefaults) -> Result<AggregationsBuilder> {
    build_all_with_background(requests, defaults, &BackgroundSources::default())
}

pub fn build_all_with_background(
    requests: &AggregationsRequest,
    defaults: &AggregationDefaults,
    background: &BackgroundSources,
) -> Result<AggregationsBuilder> {
    defaults.validate().map_err(|e| Error::Config(e.to_string()))?;
    let mut builder = AggregationsBuilder::new();
    for (name, request) in requests {
        builder.insert(name.clone(), request.build_with_background(defaults, background)?);
    }
    tracing::trace!(
        "Built {} aggregations over fields {:?}",
        builder.len(),
        builder.required_fields()
    );
    Ok(builder)
}
