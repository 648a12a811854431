//! Configuration-driven JSON:API controllers over SQL tables, with relevance-ranked search.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{fill_columns, load_from_dir, load_from_env, resolve, ApiConfig, FullConfig, ResolvedModel, ResolvedResource};
pub use error::{ApiError, AppError, ConfigError};
pub use response::{Document, Page, Transformer};
pub use routes::{app, common_routes, resource_routes};
pub use service::CrudService;
pub use sql::{Dialect, SearchCompiler, SearchRequest, SearchSpec};
pub use state::AppState;
pub use store::DbPool;
