use anyhow::{bail, Result};
use sift::aggregations::{collect_background_term_stats, InMemoryTermStats, SignificantTermsStats};
use std::path::Path;

use super::run::for_each_doc;
use super::schema::{FieldType, Schema};

/// Document frequencies of every term of a keyword field over the whole
/// corpus, for significant-terms requests run later.
pub fn run_background(schema_path: &Path, docs_path: &Path, field: &str) -> Result<SignificantTermsStats> {
    let schema = Schema::load(schema_path)?;
    if schema.field_type(field) != Some(FieldType::Keyword) {
        bail!("Field '{}' must be a keyword field in {:?}", field, schema_path);
    }

    let mut corpus = InMemoryTermStats::new(0);
    let docs = for_each_doc(docs_path, |doc| {
        let terms = schema.keywords(doc, field);
        corpus.add_document(terms.iter().map(|t| (field, t.as_str())));
    })?;

    let stats = match collect_background_term_stats(&corpus, field, &[]) {
        Ok(stats) => stats,
        // no document carried the field
        Err(_) => SignificantTermsStats {
            field: field.to_string(),
            total_docs: docs as i64,
            ..Default::default()
        },
    };
    tracing::info!(
        "Background for '{}': {} documents, {} terms",
        field,
        stats.total_docs,
        stats.term_doc_freqs.len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_background_counts_documents_per_term() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("schema.yaml"), "fields:\n  tag: keyword\n  price: f64\n").unwrap();
        fs::write(
            dir.path().join("docs.jsonl"),
            concat!(
                "{\"tag\": [\"rust\", \"rust\", \"db\"]}\n",
                "{\"tag\": \"rust\"}\n",
                "{\"price\": 1.0}\n",
            ),
        )
        .unwrap();

        let stats = run_background(&dir.path().join("schema.yaml"), &dir.path().join("docs.jsonl"), "tag").unwrap();
        assert_eq!(stats.total_docs, 3);
        assert_eq!(stats.term_doc_freqs["rust"], 2);
        assert_eq!(stats.term_doc_freqs["db"], 1);

        let err = run_background(&dir.path().join("schema.yaml"), &dir.path().join("docs.jsonl"), "price");
        assert!(err.is_err());
    }
}
