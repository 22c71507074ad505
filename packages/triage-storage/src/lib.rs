pub mod cache;
pub mod db;
pub mod memory;
pub mod migrate;
pub mod pg;
pub mod record;
pub mod schema;
pub mod store;

mod error;

pub use cache::{MetricsCache, MigrationReport};
pub use error::Error;
pub use store::{BoxFuture, MetricsStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
