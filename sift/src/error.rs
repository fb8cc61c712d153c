use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid aggregation request: {0}")]
    InvalidRequest(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Sketch error: {0}")]
    Sketch(String),

    #[error("Background lookup error: {0}")]
    Lookup(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
