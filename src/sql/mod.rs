//! Safe SQL building: identifiers from config only, values as parameters.

mod builder;
mod dialect;
pub mod params;
mod query;
pub mod search;
pub use builder::*;
pub use dialect::Dialect;
pub use params::*;
pub use query::{Clause, Direction, SelectQuery};
pub use search::{
    CompiledSearch, ScoredExpression, SearchColumns, SearchCompiler, SearchJoin, SearchRequest, SearchSpec,
    SearchTarget, Tier, RELEVANCE_ALIAS,
};
