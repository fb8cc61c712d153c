use anyhow::{bail, Context, Result};
use serde_json::Value;
use sift::aggregations::{
    build_all_with_background, parse_json_requests, parse_yaml_requests, AggregationResults, AggregationsRequest,
    BackgroundSources, SignificantTermsStats,
};
use sift::config::AggregationDefaults;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::schema::Schema;

/// Load an aggregation request from JSON or YAML, chosen by extension.
pub fn load_request(path: &Path) -> Result<AggregationsRequest> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read request {:?}", path))?;
    let request = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_yaml_requests(&content),
        _ => parse_json_requests(&content),
    };
    request.with_context(|| format!("Invalid request {:?}", path))
}

/// Load precomputed background statistics: one object or a list of them.
pub fn load_background(path: &Path) -> Result<Vec<SignificantTermsStats>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read background stats {:?}", path))?;
    let value: Value = serde_json::from_str(&content)?;
    let stats = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(stats)
}

/// Visit each JSON line of `docs_path` in order.
pub fn for_each_doc(docs_path: &Path, mut f: impl FnMut(&Value)) -> Result<usize> {
    let file = File::open(docs_path).with_context(|| format!("Failed to open documents {:?}", docs_path))?;
    let mut seen = 0;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(doc) => {
                f(&doc);
                seen += 1;
            }
            Err(e) => tracing::warn!("Skipping line {} of {:?}: {}", line_no + 1, docs_path, e),
        }
    }
    Ok(seen)
}

/// Run every requested aggregation over the documents.
pub fn run_aggregations(
    request_path: &Path,
    schema_path: &Path,
    docs_path: &Path,
    background_path: Option<&Path>,
    defaults: &AggregationDefaults,
) -> Result<AggregationResults> {
    let request = load_request(request_path)?;
    if request.is_empty() {
        bail!("Request {:?} contains no aggregations", request_path);
    }
    let schema = Schema::load(schema_path)?;

    let mut background = BackgroundSources::new();
    if let Some(path) = background_path {
        for stats in load_background(path)? {
            background = background.with_stats(stats);
        }
    }

    let mut builder = build_all_with_background(&request, defaults, &background)?;
    let fields = builder.required_fields().to_vec();
    for field in &fields {
        if schema.field_type(field).is_none() {
            tracing::warn!("Field '{}' is not in the schema; it will never be visited", field);
        }
    }

    let docs = for_each_doc(docs_path, |doc| {
        builder.start_doc();
        for (field, term) in schema.visits(doc, &fields) {
            builder.update_visitor(&field, &term);
        }
        builder.end_doc();
    })?;

    tracing::info!(
        "Aggregated {} documents ({} aggregations, ~{} bytes of state)",
        docs,
        builder.len(),
        builder.size_in_bytes()
    );
    Ok(builder.results())
}
