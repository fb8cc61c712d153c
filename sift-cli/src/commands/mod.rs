pub mod background;
pub mod run;
pub mod schema;

pub use background::run_background;
pub use run::run_aggregations;
pub use schema::Schema;
