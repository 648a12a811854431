//! Request gate for resource routes: allowed query parameters always, JSON:API media types in strict mode.
//! Also re-renders error documents with the configured media type and `jsonapi` member.

use crate::config::ApiConfig;
use crate::error::{ApiError, AppError, RenderedErrors};
use crate::extractors::{base_name, query_pairs};
use crate::response::Document;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn jsonapi_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match check(&state.config, &req) {
        Ok(()) => next.run(req).await,
        Err(e) => AppError::Api(e).into_response(),
    }
}

pub async fn jsonapi_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    match res.extensions_mut().remove::<RenderedErrors>() {
        Some(errors) => Document::new(res.status(), errors.document(&state.config), &state.config).into_response(),
        None => res,
    }
}

fn check(api: &ApiConfig, req: &Request) -> Result<(), ApiError> {
    let pairs = query_pairs(req.uri())?;
    check_allowed_get(api, &pairs)?;
    if api.strict {
        check_content_type(api, req.method(), req.headers())?;
        check_accept(api, req.headers())?;
    }
    Ok(())
}

/// Query parameter names, up to any `[...]`, must be listed in `allowed_get`.
pub fn check_allowed_get(api: &ApiConfig, pairs: &[(String, String)]) -> Result<(), ApiError> {
    let mut rejected: Vec<&str> = Vec::new();
    for (key, _) in pairs {
        let name = base_name(key);
        if !api.allowed_get.iter().any(|a| a == name) && !rejected.contains(&name) {
            rejected.push(name);
        }
    }
    if rejected.is_empty() {
        return Ok(());
    }
    Err(rejected
        .into_iter()
        .fold(ApiError::new("invalid_get"), |err, name| err.with_detail([name])))
}

fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or_default().trim()
}

/// Writes must declare the configured content type, without media type parameters.
pub fn check_content_type(api: &ApiConfig, method: &Method, headers: &HeaderMap) -> Result<(), ApiError> {
    if !matches!(*method, Method::POST | Method::PATCH | Method::PUT) {
        return Ok(());
    }
    let given = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match given {
        Some(v) if v.trim().eq_ignore_ascii_case(&api.content_type) => Ok(()),
        _ => Err(ApiError::new("unsupported_media_type").with_detail([api.content_type.as_str()])),
    }
}

/// An Accept header, when sent, must allow the configured type or a wildcard.
pub fn check_accept(api: &ApiConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    let ok = accept.split(',').map(media_type).any(|m| {
        m == "*/*" || m == "application/*" || m.eq_ignore_ascii_case(&api.accept)
    });
    if ok {
        Ok(())
    } else {
        Err(ApiError::new("not_acceptable").with_detail([api.accept.as_str()]))
    }
}
