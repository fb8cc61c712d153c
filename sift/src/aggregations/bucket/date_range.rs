use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{sub_results, BucketArena, SubAggregations};
use crate::aggregations::types::{AggregationResult, Bucket};
use crate::encoding::numeric;

/// Named half-open time range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub name: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(name: impl Into<String>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts < end)
    }
}

fn rfc3339_or_null(ts: Option<DateTime<Utc>>) -> serde_json::Value {
    ts.map_or(serde_json::Value::Null, |t| {
        serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    })
}

/// Range aggregation over a date-time field.
#[derive(Debug)]
pub struct DateRangeAggregation {
    field: String,
    ranges: Vec<DateRange>,
    buckets: BucketArena<usize>,
}

impl DateRangeAggregation {
    pub fn new(field: impl Into<String>, ranges: Vec<DateRange>, sub_aggregations: SubAggregations) -> Self {
        Self {
            field: field.into(),
            ranges,
            buckets: BucketArena::new(sub_aggregations),
        }
    }
}

impl AggregationBuilder for DateRangeAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::DateRange
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            if let Some(nanos) = numeric::full_precision_i64(term) {
                let ts = DateTime::from_timestamp_nanos(nanos);
                for (idx, range) in self.ranges.iter().enumerate() {
                    if range.contains(ts) {
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
        order.sort_by(|&a, &b| self.ranges[a].name.cmp(&self.ranges[b].name));

        let buckets = order
            .into_iter()
            .map(|idx| {
                let range = &self.ranges[idx];
                let (count, aggregations) = match self.buckets.get(&idx) {
                    Some(slot) => (slot.count, slot.sub_results()),
                    None => (0, sub_results(self.buckets.template())),
                };
                let mut bucket = Bucket::new(range.name.as_str(), count)
                    .with_metadata("start", rfc3339_or_null(range.start))
                    .with_metadata("end", rfc3339_or_null(range.end));
                bucket.aggregations = aggregations;
                bucket
            })
            .collect();

        AggregationResult::with_buckets(&self.field, AggregationKind::DateRange, buckets)
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
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
                .map(|r| std::mem::size_of::<DateRange>() + r.name.capacity())
                .sum::<usize>()
            + self.buckets.size_in_bytes(|_| 0)
    }
}

impl BucketAggregation for DateRangeAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::test_util::feed_timestamps;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_date_range_aggregation() {
        let ranges = vec![
            DateRange::new("2023", Some(date(2023, 1, 15)), Some(date(2024, 1, 15))),
            DateRange::new("2024", Some(date(2024, 1, 15)), None),
        ];
        let mut agg = DateRangeAggregation::new("timestamp", ranges, SubAggregations::new());
        feed_timestamps(
            &mut agg,
            "timestamp",
            &[date(2023, 1, 15), date(2023, 6, 15), date(2024, 1, 15), date(2024, 6, 15)],
        );

        let result = agg.result();
        assert_eq!(result.kind, AggregationKind::DateRange);
        assert_eq!(result.buckets.len(), 2);
        assert_eq!(result.bucket("2023").unwrap().doc_count, 2);
        let y2024 = result.bucket("2024").unwrap();
        assert_eq!(y2024.doc_count, 2);
        assert_eq!(y2024.metadata["start"], "2024-01-15T00:00:00Z");
        assert_eq!(y2024.metadata["end"], serde_json::Value::Null);
    }

    #[test]
    fn test_date_range_unbounded_boundary() {
        let mid = date(2023, 6, 15);
        let ranges = vec![
            DateRange::new("before_mid_2023", None, Some(mid)),
            DateRange::new("after_mid_2023", Some(mid), None),
        ];
        let mut agg = DateRangeAggregation::new("timestamp", ranges, SubAggregations::new());
        feed_timestamps(
            &mut agg,
            "timestamp",
            &[date(2022, 1, 1), date(2023, 3, 1), mid, date(2024, 1, 1)],
        );

        let result = agg.result();
        assert_eq!(result.buckets[0].key.to_string(), "after_mid_2023");
        assert_eq!(result.bucket("before_mid_2023").unwrap().doc_count, 2);
        assert_eq!(result.bucket("after_mid_2023").unwrap().doc_count, 2);
    }
}
