//! Resource CRUD routes. Handlers resolve the resource by path segment, so one pair of
//! parameterized routes serves every configured resource.

use crate::handlers::resource::{destroy, index, show, store, update};
use crate::middleware::jsonapi_gate;
use crate::state::AppState;
use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Resource routes mounted under the configured prefix.
pub fn resource_routes(state: AppState) -> Router {
    let prefix = state.config.prefix.trim_end_matches('/').to_string();
    let routes = Router::new()
        .route("/:path_segment", get(index).post(store))
        .route(
            "/:path_segment/:id",
            get(show).patch(update).put(update).delete(destroy),
        )
        .layer(from_fn_with_state(state.clone(), jsonapi_gate))
        .layer(RequestBodyLimitLayer::new(state.config.body_limit))
        .with_state(state);
    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    }
}
