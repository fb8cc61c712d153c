use std::collections::BTreeSet;

use regex::bytes::Regex;

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind, BucketAggregation};
use crate::aggregations::bucket::arena::{BucketArena, SubAggregations};
use crate::aggregations::bucket::normalize_size;
use crate::aggregations::types::{AggregationResult, Bucket};

/// Top-N most frequent terms of a field.
#[derive(Debug)]
pub struct TermsAggregation {
    field: String,
    size: usize,
    prefix: Option<Vec<u8>>,
    regex: Option<Regex>,
    buckets: BucketArena<Vec<u8>>,
}

impl TermsAggregation {
    /// A `size` of zero falls back to 10.
    pub fn new(field: impl Into<String>, size: usize, sub_aggregations: SubAggregations) -> Self {
        Self {
            field: field.into(),
            size: normalize_size(size),
            prefix: None,
            regex: None,
            buckets: BucketArena::new(sub_aggregations),
        }
    }

    /// Only count terms starting with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Only count terms matching `regex`.
    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn accepts(&self, term: &[u8]) -> bool {
        if let Some(prefix) = &self.prefix {
            if !term.starts_with(prefix) {
                return false;
            }
        }
        self.regex.as_ref().map_or(true, |re| re.is_match(term))
    }
}

impl AggregationBuilder for TermsAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::Terms
    }

    fn start_doc(&mut self) {
        self.buckets.start_doc();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field == self.field && self.accepts(term) {
            self.buckets.enter(term.to_vec());
        }
        self.buckets.record(field, term);
    }

    fn end_doc(&mut self) {
        self.buckets.end_doc();
    }

    fn result(&self) -> AggregationResult {
        let mut slots: Vec<_> = self.buckets.slots().iter().collect();
        slots.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        slots.truncate(self.size);

        let buckets = slots
            .into_iter()
            .map(|slot| {
                let mut bucket = Bucket::new(String::from_utf8_lossy(&slot.key).into_owned(), slot.count);
                bucket.aggregations = slot.sub_results();
                bucket
            })
            .collect();

        AggregationResult::with_buckets(&self.field, AggregationKind::Terms, buckets)
    }

    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            size: self.size,
            prefix: self.prefix.clone(),
            regex: self.regex.clone(),
            buckets: self.buckets.clone_empty(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.field.capacity()
            + self.prefix.as_ref().map_or(0, |p| p.capacity())
            + self.buckets.size_in_bytes(|key| key.capacity())
    }
}

impl BucketAggregation for TermsAggregation {
    fn sub_aggregation_fields(&self) -> BTreeSet<String> {
        self.buckets.sub_fields().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::metric::{AvgAggregation, SumAggregation};
    use crate::aggregations::test_util::feed_terms;
    use crate::encoding::numeric;

    #[test]
    fn test_terms_counts_and_order() {
        let mut agg = TermsAggregation::new("category", 10, SubAggregations::new());
        feed_terms(&mut agg, "category", &["books", "music", "books", "art", "music", "books"]);

        let result = agg.result();
        assert_eq!(result.kind, AggregationKind::Terms);
        let keys: Vec<String> = result.buckets.iter().map(|b| b.key.to_string()).collect();
        assert_eq!(keys, vec!["books", "music", "art"]);
        assert_eq!(result.buckets[0].doc_count, 3);
        assert!(result.buckets[0].aggregations.is_empty());
    }

    #[test]
    fn test_terms_ties_broken_by_key() {
        let mut agg = TermsAggregation::new("tag", 2, SubAggregations::new());
        feed_terms(&mut agg, "tag", &["zeta", "alpha", "mid"]);

        let keys: Vec<String> = agg.result().buckets.iter().map(|b| b.key.to_string()).collect();
        assert_eq!(keys, vec!["alpha", "mid"]);
    }

    #[test]
    fn test_terms_zero_size_defaults() {
        assert_eq!(TermsAggregation::new("tag", 0, SubAggregations::new()).size(), 10);
    }

    #[test]
    fn test_terms_prefix_and_regex_filters() {
        let mut agg = TermsAggregation::new("tag", 10, SubAggregations::new())
            .with_prefix("db-")
            .with_regex(Regex::new("^db-[a-z]+$").unwrap());
        feed_terms(&mut agg, "tag", &["db-postgres", "db-2", "web-nginx", "db-redis"]);

        let result = agg.result();
        assert_eq!(result.buckets.len(), 2);
        assert!(result.bucket("db-postgres").is_some());
        assert!(result.bucket("db-redis").is_some());
    }

    #[test]
    fn test_terms_with_sub_aggregations() {
        let mut subs = SubAggregations::new();
        subs.insert("total".to_string(), SumAggregation::new("price").into());
        subs.insert("average".to_string(), AvgAggregation::new("price").into());
        let mut agg = TermsAggregation::new("category", 10, subs);

        for (category, price) in [("books", 10.0), ("music", 4.0), ("books", 20.0)] {
            agg.start_doc();
            agg.update_visitor("category", category.as_bytes());
            agg.update_visitor("price", &numeric::encode_f64(price));
            agg.end_doc();
        }

        let result = agg.result();
        let books = result.bucket("books").unwrap();
        assert_eq!(books.doc_count, 2);
        assert_eq!(books.sub("total").unwrap().value_f64(), Some(30.0));
        assert_eq!(books.sub("average").unwrap().value_f64(), Some(15.0));
        let music = result.bucket("music").unwrap();
        assert_eq!(music.sub("total").unwrap().value_f64(), Some(4.0));

        let fields = agg.sub_aggregation_fields();
        assert!(fields.contains("price"));
    }

    #[test]
    fn test_terms_multi_valued_field() {
        let mut agg = TermsAggregation::new("tag", 10, SubAggregations::new());
        agg.start_doc();
        agg.update_visitor("tag", b"rust");
        agg.update_visitor("tag", b"go");
        agg.update_visitor("tag", b"rust");
        agg.end_doc();

        let result = agg.result();
        assert_eq!(result.bucket("rust").unwrap().doc_count, 1);
        assert_eq!(result.bucket("go").unwrap().doc_count, 1);
    }

    #[test]
    fn test_terms_clone_is_empty() {
        let mut agg = TermsAggregation::new("tag", 3, SubAggregations::new()).with_prefix("a");
        feed_terms(&mut agg, "tag", &["abc"]);
        let cloned = agg.clone_empty();
        assert!(cloned.result().buckets.is_empty());
        assert_eq!(cloned.size(), 3);
    }

    #[test]
    fn test_terms_non_utf8_keys_stay_distinct() {
        let mut agg = TermsAggregation::new("tag", 10, SubAggregations::new());
        for term in [b"\xff\x01", b"\xfe\x01"] {
            agg.start_doc();
            agg.update_visitor("tag", term);
            agg.end_doc();
        }

        let result = agg.result();
        assert_eq!(result.buckets.len(), 2);
        assert!(result.buckets.iter().all(|b| b.doc_count == 1));
    }
}
