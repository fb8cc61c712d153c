pub mod aggregations;
pub mod config;
pub mod encoding;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
