//! Term encodings the aggregation engine decodes on the per-document path.

pub mod geo;
pub mod numeric;

pub use geo::{DistanceUnit, GeoPoint};
