//! Request extractors.

mod query;
pub use query::{base_name, query_pairs, ApiQuery};
