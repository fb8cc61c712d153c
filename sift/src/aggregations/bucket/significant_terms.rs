use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregations::agg_trait::{AggregationBuilder, AggregationKind};
use crate::aggregations::background::{BackgroundTermLookup, SignificantTermsStats};
use crate::aggregations::bucket::normalize_size;
use crate::aggregations::types::{AggregationResult, Bucket};

/// Scoring function comparing foreground and background term rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceAlgorithm {
    #[default]
    Jlh,
    MutualInformation,
    ChiSquared,
    Percentage,
}

impl SignificanceAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jlh" => Some(SignificanceAlgorithm::Jlh),
            "mutual_information" => Some(SignificanceAlgorithm::MutualInformation),
            "chi_squared" => Some(SignificanceAlgorithm::ChiSquared),
            "percentage" => Some(SignificanceAlgorithm::Percentage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignificanceAlgorithm::Jlh => "jlh",
            SignificanceAlgorithm::MutualInformation => "mutual_information",
            SignificanceAlgorithm::ChiSquared => "chi_squared",
            SignificanceAlgorithm::Percentage => "percentage",
        }
    }

    /// Score a term seen in `fg_count` of `fg_total` result documents and in
    /// `bg_count` of `bg_total` corpus documents. Never NaN or infinite.
    pub fn score(&self, fg_count: i64, fg_total: i64, bg_count: i64, bg_total: i64) -> f64 {
        let score = match self {
            SignificanceAlgorithm::Jlh => jlh(fg_count, fg_total, bg_count, bg_total),
            SignificanceAlgorithm::MutualInformation => mutual_information(fg_count, fg_total, bg_count, bg_total),
            SignificanceAlgorithm::ChiSquared => chi_squared(fg_count, fg_total, bg_count, bg_total),
            SignificanceAlgorithm::Percentage => percentage(fg_count, fg_total, bg_count, bg_total),
        };
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }
}

fn jlh(fg_count: i64, fg_total: i64, bg_count: i64, bg_total: i64) -> f64 {
    if fg_total == 0 || bg_total == 0 || bg_count == 0 {
        return 0.0;
    }
    let fg_rate = fg_count as f64 / fg_total as f64;
    let bg_rate = bg_count as f64 / bg_total as f64;
    if fg_rate <= bg_rate {
        return 0.0;
    }
    fg_rate * (fg_rate / bg_rate).log2()
}

fn mutual_information(fg_count: i64, fg_total: i64, bg_count: i64, bg_total: i64) -> f64 {
    if bg_total == 0 {
        return 0.0;
    }
    // stale background statistics can undercount
    let bg_count = bg_count.max(fg_count);

    let n = bg_total as f64;
    let n11 = fg_count as f64;
    let n10 = (bg_count - fg_count) as f64;
    let n01 = (fg_total - fg_count) as f64;
    let n00 = n - n11 - n10 - n01;

    if n11 <= 0.0 || n10 < 0.0 || n01 < 0.0 || n00 < 0.0 {
        return 0.0;
    }
    if n10 == 0.0 || n01 == 0.0 {
        return fg_count as f64 / fg_total as f64;
    }
    (n11 / n) * ((n * n11) / ((n11 + n10) * (n11 + n01))).log2()
}

fn chi_squared(fg_count: i64, fg_total: i64, bg_count: i64, bg_total: i64) -> f64 {
    if fg_total == 0 || bg_total == 0 {
        return 0.0;
    }
    let expected = fg_total as f64 * bg_count as f64 / bg_total as f64;
    if expected == 0.0 {
        return 0.0;
    }
    (fg_count as f64 - expected).powi(2) / expected
}

fn percentage(fg_count: i64, fg_total: i64, bg_count: i64, bg_total: i64) -> f64 {
    if fg_total == 0 || bg_total == 0 || bg_count == 0 {
        return 0.0;
    }
    let fg_rate = fg_count as f64 / fg_total as f64;
    let bg_rate = bg_count as f64 / bg_total as f64;
    fg_rate / bg_rate - 1.0
}

struct ScoredTerm<'a> {
    term: &'a [u8],
    score: f64,
    fg_count: i64,
    bg_count: i64,
}

/// Terms unusually frequent in the matching documents compared to the whole
/// corpus.
///
/// Background frequencies come from precomputed [`SignificantTermsStats`]
/// when set, otherwise from a [`BackgroundTermLookup`] queried at result
/// time for the observed terms only. With neither, the result has no
/// buckets.
#[derive(Debug)]
pub struct SignificantTermsAggregation {
    field: String,
    size: usize,
    min_doc_count: i64,
    algorithm: SignificanceAlgorithm,
    background_stats: Option<Arc<SignificantTermsStats>>,
    lookup: Option<Arc<dyn BackgroundTermLookup>>,
    fg_terms: HashMap<Vec<u8>, i64>,
    fg_doc_count: i64,
    doc_terms: HashSet<Vec<u8>>,
}

impl SignificantTermsAggregation {
    /// A `size` of zero falls back to 10, a negative `min_doc_count` to 0.
    pub fn new(field: impl Into<String>, size: usize, min_doc_count: i64, algorithm: SignificanceAlgorithm) -> Self {
        Self {
            field: field.into(),
            size: normalize_size(size),
            min_doc_count: min_doc_count.max(0),
            algorithm,
            background_stats: None,
            lookup: None,
            fg_terms: HashMap::new(),
            fg_doc_count: 0,
            doc_terms: HashSet::new(),
        }
    }

    pub fn with_background_stats(mut self, stats: Arc<SignificantTermsStats>) -> Self {
        self.set_background_stats(stats);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn BackgroundTermLookup>) -> Self {
        self.set_lookup(lookup);
        self
    }

    pub fn set_background_stats(&mut self, stats: Arc<SignificantTermsStats>) {
        self.background_stats = Some(stats);
    }

    pub fn set_lookup(&mut self, lookup: Arc<dyn BackgroundTermLookup>) {
        self.lookup = Some(lookup);
    }

    pub fn algorithm(&self) -> SignificanceAlgorithm {
        self.algorithm
    }

    /// Background corpus size and per-term document frequencies.
    fn background(&self) -> Option<(i64, HashMap<&[u8], i64>)> {
        if let Some(stats) = &self.background_stats {
            let freqs = self
                .fg_terms
                .keys()
                .filter_map(|term| {
                    let text = std::str::from_utf8(term).ok()?;
                    stats.term_doc_freqs.get(text).map(|&f| (term.as_slice(), f))
                })
                .collect();
            return Some((stats.total_docs, freqs));
        }

        let lookup = self.lookup.as_ref()?;
        let total = lookup.doc_count().unwrap_or_else(|e| {
            tracing::debug!("Background doc count for {} failed: {}", self.field, e);
            0
        }) as i64;
        let mut freqs = HashMap::with_capacity(self.fg_terms.len());
        for term in self.fg_terms.keys() {
            match lookup.doc_frequency(&self.field, term) {
                Ok(freq) => {
                    freqs.insert(term.as_slice(), freq as i64);
                }
                Err(e) => {
                    tracing::debug!(
                        "Background lookup for {}:{} failed: {}",
                        self.field,
                        String::from_utf8_lossy(term),
                        e
                    );
                }
            }
        }
        Some((total, freqs))
    }
}

impl AggregationBuilder for SignificantTermsAggregation {
    fn field(&self) -> &str {
        &self.field
    }

    fn kind(&self) -> AggregationKind {
        AggregationKind::SignificantTerms
    }

    fn start_doc(&mut self) {
        self.fg_doc_count += 1;
        self.doc_terms.clear();
    }

    fn update_visitor(&mut self, field: &str, term: &[u8]) {
        if field != self.field {
            return;
        }
        if self.doc_terms.contains(term) {
            return;
        }
        *self.fg_terms.entry(term.to_vec()).or_insert(0) += 1;
        self.doc_terms.insert(term.to_vec());
    }

    fn end_doc(&mut self) {}

    fn result(&self) -> AggregationResult {
        let Some((mut bg_total, bg_freqs)) = self.background() else {
            return AggregationResult::with_buckets(&self.field, AggregationKind::SignificantTerms, Vec::new());
        };
        if bg_total == 0 {
            bg_total = self.fg_doc_count;
        }

        let mut scored: Vec<ScoredTerm<'_>> = self
            .fg_terms
            .iter()
            .filter(|&(_, &fg_count)| fg_count >= self.min_doc_count)
            .map(|(term, &fg_count)| {
                let bg_count = match bg_freqs.get(term.as_slice()) {
                    Some(&freq) if freq > 0 => freq,
                    _ => fg_count,
                };
                ScoredTerm {
                    term: term.as_slice(),
                    score: self.algorithm.score(fg_count, self.fg_doc_count, bg_count, bg_total),
                    fg_count,
                    bg_count,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.fg_count.cmp(&a.fg_count))
                .then_with(|| a.term.cmp(b.term))
        });
        scored.truncate(self.size);

        let buckets: Vec<Bucket> = scored
            .iter()
            .map(|st| {
                Bucket::new(String::from_utf8_lossy(st.term).into_owned(), st.fg_count)
                    .with_metadata("score", st.score)
                    .with_metadata("bg_count", st.bg_count)
            })
            .collect();

        tracing::trace!(
            "significant_terms on {}: {} of {} terms kept",
            self.field,
            buckets.len(),
            self.fg_terms.len()
        );

        let significant = buckets.len();
        AggregationResult::with_buckets(&self.field, AggregationKind::SignificantTerms, buckets)
            .with_metadata("algorithm", self.algorithm.as_str())
            .with_metadata("fg_doc_count", self.fg_doc_count)
            .with_metadata("bg_doc_count", bg_total)
            .with_metadata("unique_terms", self.fg_terms.len())
            .with_metadata("significant_terms", significant)
    }

    /// Keeps the background source, drops the foreground counts.
    fn clone_empty(&self) -> Self {
        Self {
            field: self.field.clone(),
            size: self.size,
            min_doc_count: self.min_doc_count,
            algorithm: self.algorithm,
            background_stats: self.background_stats.clone(),
            lookup: self.lookup.clone(),
            fg_terms: HashMap::new(),
            fg_doc_count: 0,
            doc_terms: HashSet::new(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.field.capacity()
            + self
                .fg_terms
                .keys()
                .map(|t| t.capacity() + std::mem::size_of::<(Vec<u8>, i64)>())
                .sum::<usize>()
            + self.doc_terms.iter().map(|t| t.capacity()).sum::<usize>()
    }
}
