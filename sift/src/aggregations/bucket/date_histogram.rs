use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{BucketArena, SubAggregations};
use crate::aggregations::types::{AggregationResult, Bucket};
use crate::encoding::numeric;
use crate::{Error, Result};

const NANOS_PER_MINUTE: i64 = 60_000_000_000;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// Calendar-aware bucket widths, truncated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarInterval {
    Minute,
    Hour,
    Day,
    /// Weeks start on Monday.
    Week,
    Month,
    Quarter,
    Year,
}

impl CalendarInterval {
    /// Accepts the short codes `1m 1h 1d 1w 1M 1q 1y` and the unit names.
    pub fn parse(s: &str) -> Option<Self> {
        let interval = match s {
            "1m" => CalendarInterval::Minute,
            "1h" => CalendarInterval::Hour,
            "1d" => CalendarInterval::Day,
            "1w" => CalendarInterval::Week,
            "1M" => CalendarInterval::Month,
            "1q" => CalendarInterval::Quarter,
            "1y" => CalendarInterval::Year,
            other => match other.to_lowercase().as_str() {
                "minute" => CalendarInterval::Minute,
                "hour" => CalendarInterval::Hour,
                "day" => CalendarInterval::Day,
                "week" => CalendarInterval::Week,
                "month" => CalendarInterval::Month,
                "quarter" => CalendarInterval::Quarter,
                "year" => CalendarInterval::Year,
                _ => return None,
            },
        };
        Some(interval)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarInterval::Minute => "1m",
            CalendarInterval::Hour => "1h",
            CalendarInterval::Day => "1d",
            CalendarInterval::Week => "1w",
            CalendarInterval::Month => "1M",
            CalendarInterval::Quarter => "1q",
            CalendarInterval::Year => "1y",
        }
    }

    /// Start of the interval containing `nanos`, or `None` when the start
    /// is not representable as i64 nanoseconds.
    pub fn floor_nanos(&self, nanos: i64) -> Option<i64> {
        match self {
            CalendarInterval::Minute => floor_fixed(nanos, NANOS_PER_MINUTE),
            CalendarInterval::Hour => floor_fixed(nanos, NANOS_PER_HOUR),
            CalendarInterval::Day => floor_fixed(nanos, NANOS_PER_DAY),
            CalendarInterval::Week => {
                let days = nanos.div_euclid(NANOS_PER_DAY);
                // 1970-01-01 was a Thursday
                let since_monday = (days + 3).rem_euclid(7);
                (days - since_monday).checked_mul(NANOS_PER_DAY)
            }
            CalendarInterval::Month | CalendarInterval::Quarter | CalendarInterval::Year => {
                let date = DateTime::from_timestamp_nanos(nanos).date_naive();
                let month = match self {
                    CalendarInterval::Month => date.month(),
                    CalendarInterval::Quarter => (date.month0() / 3) * 3 + 1,
                    _ => 1,
                };
                NaiveDate::from_ymd_opt(date.year(), month, 1)?
                    .and_hms_opt(0, 0, 0)?
                    .and_utc()
                    .timestamp_nanos_opt()
            }
        }
    }
}

fn floor_fixed(nanos: i64, width: i64) -> Option<i64> {
    nanos.checked_sub(nanos.rem_euclid(width))
}

/// Bucket width for a date histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInterval {
    Calendar(CalendarInterval),
    Fixed(Duration),
}

impl Default for DateInterval {
    fn default() -> Self {
        DateInterval::Calendar(CalendarInterval::Day)
    }
}

/// Parse a fixed interval such as `500ms`, `90s`, `15m`, `1h` or `2d`.
pub fn parse_fixed_interval(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::InvalidRequest(format!("fixed interval '{}' has no unit", s)))?;
    let (amount, unit) = s.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("invalid fixed interval '{}'", s)))?;
    let nanos_per_unit: u64 = match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        "d" => 86_400_000_000_000,
        _ => {
            return Err(Error::InvalidRequest(format!(
                "unknown unit '{}' in fixed interval '{}'",
                unit, s
            )))
        }
    };
    let nanos = amount
        .checked_mul(nanos_per_unit)
        .ok_or_else(|| Error::InvalidRequest(format!("fixed interval '{}' overflows", s)))?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a duration with the largest unit that divides it exactly.
pub fn format_fixed_interval(interval: Duration) -> String {
    let nanos = interval.as_nanos();
    for (unit, width) in [
        ("d", 86_400_000_000_000u128),
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
    ] {
        if nanos > 0 && nanos % width == 0 {
            return format!("{}{}", nanos / width, unit);
        }
    }
    format!("{}ns", nanos)
}

/// Time buckets over a date-time field. Keys render as RFC 3339 strings and
/// each bucket keeps its raw nanosecond timestamp in metadata.
#[derive(Debug)]
pub struct DateHistogramAggregation {
    field: String,
    interval: DateInterval,
    min_doc_count: i64,
    buckets: BucketArena<i64>,
}

impl DateHistogramAggregation {
    /// A zero (or beyond-i64) fixed interval falls back to calendar days.
    pub fn new(
        field: impl Into<String>,
        interval: DateInterval,
        min_doc_count: i64,
        sub_aggregations: SubAggregations,
    ) -> Self {
        let interval = match interval {
            DateInterval::Fixed(d) if d.is_zero() || d.as_nanos() > i64::MAX as u128 => {
                tracing::debug!("Invalid fixed interval {:?}, using calendar day", d);
                DateInterval::default()
            }
            other => other,
        };
        Self {
            field: field.into(),
            interval,
            min_doc_count: min_doc_count.max(0),
            buckets: BucketArena::new(sub_aggregations),
        }
    }

    pub fn interval(&self) -> DateInterval {
        self.interval
    }

    fn bucket_key(&self, nanos: i64) -> Option<i64> {
        match self.interval {
            DateInterval::Calendar(calendar) => calendar.floor_nanos(nanos),
            DateInterval::Fixed(d) => floor_fixed(nanos, d.as_nanos() as i64),
        }
    }
}

impl AggregationBuilder for DateHistogramAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::DateHistogram
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field {
            if let Some(key) = numeric::full_precision_i64(term).and_then(|n| self.bucket_key(n)) {
                self.buckets.enter(key);
            }
        }
        self.buckets.record(field, term);
    }

    fn end_doc(&mut self) {
        self.buckets.end_doc();
    }

    fn result(&self) -> AggregationResult {
        let mut slots: Vec<_> = self
            .buckets
            .slots()
            .iter()
            .filter(|slot| slot.count >= self.min_doc_count)
            .collect();
        slots.sort_by_key(|slot| slot.key);

        let buckets = slots
            .into_iter()
            .map(|slot| {
                let key = DateTime::from_timestamp_nanos(slot.key).to_rfc3339_opts(SecondsFormat::AutoSi, true);
                let mut bucket = Bucket::new(key, slot.count).with_metadata("timestamp", slot.key);
                bucket.aggregations = slot.sub_results();
                bucket
            })
            .collect();

        let result = AggregationResult::with_buckets(&self.field, AggregationKind::DateHistogram, buckets);
        match self.interval {
            DateInterval::Fixed(d) => result.with_metadata("interval", format_fixed_interval(d)),
            DateInterval::Calendar(c) => result.with_metadata("calendar_interval", c.as_str()),
        }
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            interval: self.interval,
            min_doc_count: self.min_doc_count,
            buckets: self.buckets.clone_empty(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.field.capacity() + self.buckets.size_in_bytes(|_| 0)
    }
}

impl BucketAggregation for DateHistogramAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::metric::CountAggregation;
    use crate::aggregations::test_util::feed_timestamps;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 17).unwrap()
    }

    fn floored(interval: CalendarInterval, dt: DateTime<Utc>) -> String {
        let nanos = interval.floor_nanos(dt.timestamp_nanos_opt().unwrap()).unwrap();
        DateTime::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    #[test]
    fn test_calendar_interval_parse() {
        assert_eq!(CalendarInterval::parse("1M"), Some(CalendarInterval::Month));
        assert_eq!(CalendarInterval::parse("1m"), Some(CalendarInterval::Minute));
        assert_eq!(CalendarInterval::parse("Week"), Some(CalendarInterval::Week));
        assert_eq!(CalendarInterval::parse("fortnight"), None);
    }

    #[test]
    fn test_calendar_floor() {
        // Wednesday
        let dt = at(2024, 5, 15, 14, 35);
        assert_eq!(floored(CalendarInterval::Minute, dt), "2024-05-15T14:35:00Z");
        assert_eq!(floored(CalendarInterval::Hour, dt), "2024-05-15T14:00:00Z");
        assert_eq!(floored(CalendarInterval::Day, dt), "2024-05-15T00:00:00Z");
        assert_eq!(floored(CalendarInterval::Week, dt), "2024-05-13T00:00:00Z");
        assert_eq!(floored(CalendarInterval::Month, dt), "2024-05-01T00:00:00Z");
        assert_eq!(floored(CalendarInterval::Quarter, dt), "2024-04-01T00:00:00Z");
        assert_eq!(floored(CalendarInterval::Year, dt), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_week_floor_before_epoch() {
        // Sunday 1969-12-28 belongs to the week starting Monday 1969-12-22
        assert_eq!(floored(CalendarInterval::Week, at(1969, 12, 28, 3, 0)), "1969-12-22T00:00:00Z");
    }

    #[test]
    fn test_fixed_interval_parse_and_format() {
        assert_eq!(parse_fixed_interval("90m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_fixed_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_fixed_interval("2d").unwrap(), Duration::from_secs(172_800));
        assert!(parse_fixed_interval("10").is_err());
        assert!(parse_fixed_interval("1fortnight").is_err());
        assert_eq!(format_fixed_interval(Duration::from_secs(5400)), "90m");
        assert_eq!(format_fixed_interval(Duration::from_secs(3600)), "1h");
    }

    #[test]
    fn test_date_histogram_calendar_days() {
        let mut agg = DateHistogramAggregation::new(
            "timestamp",
            DateInterval::Calendar(CalendarInterval::Day),
            0,
            SubAggregations::new(),
        );
        feed_timestamps(
            &mut agg,
            "timestamp",
            &[at(2024, 1, 15, 2, 0), at(2024, 1, 15, 10, 0), at(2024, 1, 16, 3, 0), at(2024, 1, 14, 23, 59)],
        );

        let result = agg.result();
        assert_eq!(result.kind, AggregationKind::DateHistogram);
        let keys: Vec<String> = result.buckets.iter().map(|b| b.key.to_string()).collect();
        assert_eq!(
            keys,
            vec!["2024-01-14T00:00:00Z", "2024-01-15T00:00:00Z", "2024-01-16T00:00:00Z"]
        );
        let jan15 = result.bucket("2024-01-15T00:00:00Z").unwrap();
        assert_eq!(jan15.doc_count, 2);
        assert_eq!(jan15.metadata["timestamp"], 1_705_276_800_000_000_000i64);
        assert_eq!(result.metadata["calendar_interval"], "1d");
    }

    #[test]
    fn test_date_histogram_fixed_interval() {
        let mut subs = SubAggregations::new();
        subs.insert("events".to_string(), CountAggregation::new("timestamp").into());
        let mut agg = DateHistogramAggregation::new(
            "timestamp",
            DateInterval::Fixed(Duration::from_secs(6 * 3600)),
            0,
            subs,
        );
        feed_timestamps(
            &mut agg,
            "timestamp",
            &[at(2024, 1, 15, 1, 0), at(2024, 1, 15, 5, 0), at(2024, 1, 15, 7, 0)],
        );

        let result = agg.result();
        assert_eq!(result.buckets.len(), 2);
        let first = result.bucket("2024-01-15T00:00:00Z").unwrap();
        assert_eq!(first.doc_count, 2);
        assert_eq!(first.sub("events").unwrap().value_f64(), Some(2.0));
        assert_eq!(result.metadata["interval"], "6h");
    }

    #[test]
    fn test_date_histogram_zero_fixed_interval_uses_day() {
        let agg = DateHistogramAggregation::new("ts", DateInterval::Fixed(Duration::ZERO), 0, SubAggregations::new());
        assert_eq!(agg.interval(), DateInterval::Calendar(CalendarInterval::Day));
    }

    #[test]
    fn test_date_histogram_min_doc_count() {
        let mut agg = DateHistogramAggregation::new(
            "ts",
            DateInterval::Calendar(CalendarInterval::Month),
            2,
            SubAggregations::new(),
        );
        feed_timestamps(&mut agg, "ts", &[at(2024, 1, 3, 0, 0), at(2024, 1, 9, 0, 0), at(2024, 2, 1, 0, 0)]);
        let result = agg.result();
        assert_eq!(result.buckets.len(), 1);
        assert_eq!(result.buckets[0].key.to_string(), "2024-01-01T00:00:00Z");
    }
}
