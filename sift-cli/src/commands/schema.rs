//! Document schema for the CLI: maps JSON document fields to the term
//! encodings the aggregation engine reads.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift::encoding::{geo, numeric, GeoPoint};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Keyword,
    F64,
    I64,
    /// RFC 3339 strings or epoch milliseconds
    Date,
    /// `{"lat": .., "lon": ..}`, `[lon, lat]` or `"lat,lon"`
    GeoPoint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

impl Schema {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read schema {:?}", path))?;
        serde_yaml::from_str(&content).with_context(|| format!("Invalid schema {:?}", path))
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    /// Encoded `(field, term)` visits of `doc` for the requested fields.
    /// Values that do not fit the field type are skipped.
    pub fn visits(&self, doc: &Value, fields: &[String]) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        for field in fields {
            let (Some(field_type), Some(value)) = (self.field_type(field), doc.get(field)) else {
                continue;
            };
            for term in encode_value(field_type, value) {
                out.push((field.clone(), term));
            }
        }
        out
    }

    /// Keyword terms of `field` in `doc`.
    pub fn keywords(&self, doc: &Value, field: &str) -> Vec<String> {
        match (self.field_type(field), doc.get(field)) {
            (Some(FieldType::Keyword), Some(value)) => single_values(value, FieldType::Keyword)
                .into_iter()
                .filter_map(keyword)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Arrays are multi-valued, except a bare `[lon, lat]` pair for geo points.
fn single_values(value: &Value, field_type: FieldType) -> Vec<&Value> {
    match value {
        Value::Array(items) if field_type == FieldType::GeoPoint && items.iter().all(Value::is_number) => {
            vec![value]
        }
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

pub fn encode_value(field_type: FieldType, value: &Value) -> Vec<Vec<u8>> {
    single_values(value, field_type)
        .into_iter()
        .filter_map(|v| match field_type {
            FieldType::Keyword => keyword(v).map(String::into_bytes),
            FieldType::F64 => v.as_f64().map(numeric::encode_f64),
            FieldType::I64 => v.as_i64().map(numeric::encode_full_i64),
            FieldType::Date => timestamp_nanos(v).map(numeric::encode_timestamp_nanos),
            FieldType::GeoPoint => geo_point(v).map(geo::encode_point),
        })
        .collect()
}

fn keyword(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn timestamp_nanos(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|dt| dt.with_timezone(&Utc).timestamp_nanos_opt()),
        Value::Number(n) => n.as_i64().and_then(|millis| millis.checked_mul(1_000_000)),
        _ => None,
    }
}

fn geo_point(value: &Value) -> Option<GeoPoint> {
    match value {
        Value::Object(map) => Some(GeoPoint::new(map.get("lon")?.as_f64()?, map.get("lat")?.as_f64()?)),
        Value::Array(pair) if pair.len() == 2 => Some(GeoPoint::new(pair[0].as_f64()?, pair[1].as_f64()?)),
        Value::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            Some(GeoPoint::new(lon.trim().parse().ok()?, lat.trim().parse().ok()?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        serde_yaml::from_str(
            r#"
fields:
  category: keyword
  price: f64
  stock: i64
  created: date
  location: geo_point
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_schema_from_yaml() {
        let schema = schema();
        assert_eq!(schema.field_type("price"), Some(FieldType::F64));
        assert_eq!(schema.field_type("location"), Some(FieldType::GeoPoint));
        assert_eq!(schema.field_type("missing"), None);
    }

    #[test]
    fn test_visits_encode_each_type() {
        let doc = json!({
            "category": ["books", "sale"],
            "price": 12.5,
            "stock": 3,
            "created": "2024-01-15T00:00:00Z",
            "location": {"lat": 59.91, "lon": 10.75},
            "ignored": "x"
        });
        let fields: Vec<String> = ["category", "price", "stock", "created", "location", "ignored"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let visits = schema().visits(&doc, &fields);

        assert_eq!(visits.len(), 6);
        assert_eq!(visits[0], ("category".to_string(), b"books".to_vec()));
        assert_eq!(visits[1], ("category".to_string(), b"sale".to_vec()));
        assert_eq!(numeric::full_precision_f64(&visits[2].1), Some(12.5));
        assert_eq!(numeric::full_precision_i64(&visits[3].1), Some(3));
        assert_eq!(
            numeric::full_precision_i64(&visits[4].1),
            Some(1_705_276_800 * 1_000_000_000)
        );
        let point = geo::decode_point(&visits[5].1).unwrap();
        assert!((point.lat - 59.91).abs() < 1e-6);
        assert!((point.lon - 10.75).abs() < 1e-6);
    }

    #[test]
    fn test_geo_point_forms() {
        for value in [json!([10.75, 59.91]), json!("59.91,10.75"), json!({"lon": 10.75, "lat": 59.91})] {
            let terms = encode_value(FieldType::GeoPoint, &value);
            assert_eq!(terms.len(), 1, "{}", value);
            let point = geo::decode_point(&terms[0]).unwrap();
            assert!((point.lon - 10.75).abs() < 1e-6);
        }
        let many = encode_value(FieldType::GeoPoint, &json!([[1.0, 2.0], {"lon": 3.0, "lat": 4.0}]));
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn test_mismatched_values_skipped() {
        assert!(encode_value(FieldType::F64, &json!("twelve")).is_empty());
        assert!(encode_value(FieldType::Date, &json!("yesterday")).is_empty());
        assert!(encode_value(FieldType::I64, &json!(1.5)).is_empty());
        assert_eq!(encode_value(FieldType::Date, &json!(1000)).len(), 1);
    }

    #[test]
    fn test_keywords() {
        let doc = json!({"category": ["a", "b"], "price": 1.0});
        assert_eq!(schema().keywords(&doc, "category"), vec!["a", "b"]);
        assert!(schema().keywords(&doc, "price").is_empty());
    }
}
