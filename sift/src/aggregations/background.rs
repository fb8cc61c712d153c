//! Whole-corpus term statistics compared against query results by the
//! significant-terms aggregation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Read-only access to the index statistics significant terms needs.
pub trait BackgroundTermLookup: fmt::Debug + Send + Sync {
    /// Number of documents in the index.
    fn doc_count(&self) -> Result<u64>;

    /// Number of documents whose `field` contains `term`.
    fn doc_frequency(&self, field: &str, term: &[u8]) -> Result<u64>;

    /// Every term of `field` with its document frequency.
    fn field_dictionary(&self, field: &str) -> Result<Vec<(String, u64)>>;
}

/// Precomputed background statistics for one field, typically gathered in a
/// pre-search phase across all shards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignificantTermsStats {
    pub field: String,
    pub total_docs: i64,
    #[serde(default)]
    pub term_doc_freqs: BTreeMap<String, i64>,
}

impl SignificantTermsStats {
    /// Fold statistics gathered on another shard into these.
    pub fn merge(&mut self, other: &SignificantTermsStats) {
        self.total_docs += other.total_docs;
        for (term, freq) in &other.term_doc_freqs {
            *self.term_doc_freqs.entry(term.clone()).or_insert(0) += freq;
        }
    }
}

/// Gather background statistics for `field`.
///
/// With no `terms` the whole field dictionary is enumerated. Otherwise only
/// the listed terms are looked up, and terms whose lookup fails are left out.
pub fn collect_background_term_stats(
    reader: &dyn BackgroundTermLookup,
    field: &str,
    terms: &[String],
) -> Result<SignificantTermsStats> {
    let total_docs = reader.doc_count()? as i64;
    let mut term_doc_freqs = BTreeMap::new();

    if terms.is_empty() {
        for (term, freq) in reader.field_dictionary(field)? {
            term_doc_freqs.insert(term, freq as i64);
        }
    } else {
        for term in terms {
            match reader.doc_frequency(field, term.as_bytes()) {
                Ok(freq) => {
                    term_doc_freqs.insert(term.clone(), freq as i64);
                }
                Err(e) => {
                    tracing::debug!("Background lookup for {}:{} failed: {}", field, term, e);
                }
            }
        }
    }

    Ok(SignificantTermsStats {
        field: field.to_string(),
        total_docs,
        term_doc_freqs,
    })
}

/// Background statistics held in memory, keyed by field.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTermStats {
    doc_count: u64,
    fields: HashMap<String, BTreeMap<String, u64>>,
}

impl InMemoryTermStats {
    pub fn new(doc_count: u64) -> Self {
        Self {
            doc_count,
            fields: HashMap::new(),
        }
    }

    pub fn with_term(mut self, field: &str, term: &str, doc_freq: u64) -> Self {
        self.set_term(field, term, doc_freq);
        self
    }

    pub fn set_term(&mut self, field: &str, term: &str, doc_freq: u64) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .insert(term.to_string(), doc_freq);
    }

    pub fn set_doc_count(&mut self, doc_count: u64) {
        self.doc_count = doc_count;
    }

    /// Record one document; each distinct term of each field counts once.
    pub fn add_document<'a>(&mut self, terms: impl IntoIterator<Item = (&'a str, &'a str)>) {
        self.doc_count += 1;
        let mut seen = std::collections::HashSet::new();
        for (field, term) in terms {
            if seen.insert((field, term)) {
                *self
                    .fields
                    .entry(field.to_string())
                    .or_default()
                    .entry(term.to_string())
                    .or_insert(0) += 1;
            }
        }
    }
}

impl From<&SignificantTermsStats> for InMemoryTermStats {
    fn from(stats: &SignificantTermsStats) -> Self {
        let mut lookup = InMemoryTermStats::new(stats.total_docs.max(0) as u64);
        for (term, freq) in &stats.term_doc_freqs {
            lookup.set_term(&stats.field, term, (*freq).max(0) as u64);
        }
        lookup
    }
}

impl BackgroundTermLookup for InMemoryTermStats {
    fn doc_count(&self) -> Result<u64> {
        Ok(self.doc_count)
    }

    fn doc_frequency(&self, field: &str, term: &[u8]) -> Result<u64> {
        let term = std::str::from_utf8(term).map_err(|e| Error::Lookup(e.to_string()))?;
        Ok(self
            .fields
            .get(field)
            .and_then(|terms| terms.get(term))
            .copied()
            .unwrap_or(0))
    }

    fn field_dictionary(&self, field: &str) -> Result<Vec<(String, u64)>> {
        let terms = self
            .fields
            .get(field)
            .ok_or_else(|| Error::Lookup(format!("unknown field '{}'", field)))?;
        Ok(terms.iter().map(|(t, f)| (t.clone(), *f)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingLookup;

    impl BackgroundTermLookup for FailingLookup {
        fn doc_count(&self) -> Result<u64> {
            Ok(100)
        }

        fn doc_frequency(&self, _field: &str, term: &[u8]) -> Result<u64> {
            if term == b"broken" {
                Err(Error::Lookup("posting list unavailable".to_string()))
            } else {
                Ok(7)
            }
        }

        fn field_dictionary(&self, _field: &str) -> Result<Vec<(String, u64)>> {
            Err(Error::Lookup("dictionary unavailable".to_string()))
        }
    }

    fn corpus() -> InMemoryTermStats {
        InMemoryTermStats::new(1000)
            .with_term("tags", "nosql", 50)
            .with_term("tags", "database", 200)
            .with_term("title", "rust", 3)
    }

    #[test]
    fn test_collect_whole_dictionary() {
        let stats = collect_background_term_stats(&corpus(), "tags", &[]).unwrap();
        assert_eq!(stats.field, "tags");
        assert_eq!(stats.total_docs, 1000);
        assert_eq!(stats.term_doc_freqs.len(), 2);
        assert_eq!(stats.term_doc_freqs["nosql"], 50);
    }

    #[test]
    fn test_collect_specific_terms() {
        let terms = vec!["nosql".to_string(), "missing".to_string()];
        let stats = collect_background_term_stats(&corpus(), "tags", &terms).unwrap();
        assert_eq!(stats.term_doc_freqs["nosql"], 50);
        assert_eq!(stats.term_doc_freqs["missing"], 0);
    }

    #[test]
    fn test_failed_term_lookups_are_skipped() {
        let terms = vec!["ok".to_string(), "broken".to_string()];
        let stats = collect_background_term_stats(&FailingLookup, "tags", &terms).unwrap();
        assert_eq!(stats.term_doc_freqs.len(), 1);
        assert_eq!(stats.term_doc_freqs["ok"], 7);

        assert!(collect_background_term_stats(&FailingLookup, "tags", &[]).is_err());
    }

    #[test]
    fn test_add_document_counts_distinct_terms() {
        let mut stats = InMemoryTermStats::default();
        stats.add_document([("tags", "a"), ("tags", "a"), ("tags", "b")]);
        stats.add_document([("tags", "a")]);
        assert_eq!(stats.doc_count().unwrap(), 2);
        assert_eq!(stats.doc_frequency("tags", b"a").unwrap(), 2);
        assert_eq!(stats.doc_frequency("tags", b"b").unwrap(), 1);
    }

    #[test]
    fn test_merge_shard_stats() {
        let mut a = collect_background_term_stats(&corpus(), "tags", &[]).unwrap();
        let b = SignificantTermsStats {
            field: "tags".to_string(),
            total_docs: 500,
            term_doc_freqs: BTreeMap::from([("nosql".to_string(), 10), ("graph".to_string(), 4)]),
        };
        a.merge(&b);
        assert_eq!(a.total_docs, 1500);
        assert_eq!(a.term_doc_freqs["nosql"], 60);
        assert_eq!(a.term_doc_freqs["graph"], 4);
    }
}
