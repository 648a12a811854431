//! Routers: common endpoints and resource CRUD.

mod common;
mod resource;
pub use common::common_routes;
pub use resource::resource_routes;

use crate::middleware::jsonapi_errors;
use crate::state::AppState;
use axum::{middleware::from_fn_with_state, Router};

/// Common and resource routes together. Error documents from any of them pick up the configured
/// content type and `jsonapi` member.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(resource_routes(state.clone()))
        .layer(from_fn_with_state(state, jsonapi_errors))
}
