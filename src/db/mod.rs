mod repository;
mod schema;

pub use repository::{RefreshOutcome, Repository};
