//! Tests for config module

use sift::aggregations::{build_all, Aggregation, AggregationsRequest};
use sift::config::{expand_tilde, Config};
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.aggregations.terms_size, 10);
    assert_eq!(config.aggregations.cardinality_precision, 14);
    assert_eq!(config.aggregations.geohash_precision, 5);
    assert_eq!(config.aggregations.significance_algorithm, "jlh");
    assert_eq!(config.aggregations.distance_unit, "km");
    assert_eq!(config.aggregations.histogram_min_doc_count, 0);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "pretty");
}

#[test]
fn test_expand_tilde() {
    let home = dirs::home_dir().unwrap();

    // ~/foo -> /home/user/foo
    let expanded = expand_tilde(&PathBuf::from("~/foo")).unwrap();
    assert_eq!(expanded, home.join("foo"));

    let expanded = expand_tilde(&PathBuf::from("~")).unwrap();
    assert_eq!(expanded, home);

    let expanded = expand_tilde(&PathBuf::from("/absolute/path")).unwrap();
    assert_eq!(expanded, PathBuf::from("/absolute/path"));

    let expanded = expand_tilde(&PathBuf::from("relative/path")).unwrap();
    assert_eq!(expanded, PathBuf::from("relative/path"));
}

#[test]
fn test_log_file_tilde_expanded() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, "[logging]\nfile = \"~/sift-logs/sift.log\"\n").unwrap();

    let config = Config::load_or_create(&config_path).unwrap();
    let home = dirs::home_dir().unwrap();
    assert_eq!(config.logging.file, Some(home.join("sift-logs/sift.log")));
}

#[test]
fn test_save_and_load() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");

    let mut config = Config::default();
    config.aggregations.terms_size = 25;
    config.aggregations.significance_algorithm = "chi_squared".to_string();
    config.logging.level = "debug".to_string();
    config.logging.format = "json".to_string();

    config.save(&config_path).unwrap();

    let loaded = Config::load_or_create(&config_path).unwrap();
    assert_eq!(loaded.aggregations.terms_size, 25);
    assert_eq!(loaded.aggregations.significance_algorithm, "chi_squared");
    assert_eq!(loaded.logging.level, "debug");
    assert_eq!(loaded.logging.format, "json");
}

#[test]
fn test_load_or_create_writes_default() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("nested/config.toml");

    let config = Config::load_or_create(&config_path).unwrap();
    assert_eq!(config.aggregations.geohash_size, 10);
    assert!(config_path.exists());
}

#[test]
fn test_partial_config_uses_defaults() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[aggregations]
terms_size = 3
distance_unit = "mi"
"#,
    )
    .unwrap();

    let config = Config::load_or_create(&config_path).unwrap();
    assert_eq!(config.aggregations.terms_size, 3);
    assert_eq!(config.aggregations.distance_unit, "mi");
    assert_eq!(config.aggregations.cardinality_precision, 14);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_defaults_rejected() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, "[aggregations]\nsignificance_algorithm = \"magic\"\n").unwrap();

    assert!(Config::load_or_create(&config_path).is_err());
}

#[test]
fn test_config_defaults_drive_requests() {
    let mut config = Config::default();
    config.aggregations.terms_size = 2;
    config.aggregations.cardinality_precision = 10;

    let requests: AggregationsRequest = serde_json::from_str(
        r#"{"tags": {"type": "terms", "field": "tag"}, "users": {"type": "cardinality", "field": "user"}}"#,
    )
    .unwrap();
    let builder = build_all(&requests, &config.aggregations).unwrap();

    match builder.get("tags").unwrap() {
        Aggregation::Terms(agg) => assert_eq!(agg.size(), 2),
        other => panic!("unexpected {:?}", other),
    }
    match builder.get("users").unwrap() {
        Aggregation::Cardinality(agg) => assert_eq!(agg.precision(), 10),
        other => panic!("unexpected {:?}", other),
    }
}
