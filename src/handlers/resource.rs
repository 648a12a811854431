//! Resource handlers: index, store, show, update, destroy.

use crate::config::{Operation, PkType, ResolvedResource};
use crate::error::{ApiError, AppError};
use crate::extractors::ApiQuery;
use crate::response::{Document, Transformer};
use crate::service::CrudService;
use crate::sql::BindValue;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Map, Value};

fn resource_for<'a>(state: &'a AppState, path_segment: &str, op: Operation) -> Result<&'a ResolvedResource, AppError> {
    let resource = state
        .model
        .resource_by_path(path_segment)
        .ok_or_else(|| AppError::not_found("resource", path_segment))?;
    if !resource.allows(op) {
        return Err(ApiError::new("operation_not_allowed")
            .with_detail([op.as_str(), resource.name.as_str()])
            .into());
    }
    Ok(resource)
}

pub fn parse_id(id_str: &str, pk_type: PkType) -> Result<BindValue, ApiError> {
    let invalid = || ApiError::new("invalid_id").with_detail([id_str]);
    Ok(match pk_type {
        PkType::Uuid => BindValue::Uuid(uuid::Uuid::parse_str(id_str).map_err(|_| invalid())?),
        PkType::BigInt | PkType::Int => BindValue::I64(id_str.parse().map_err(|_| invalid())?),
        PkType::Text => BindValue::String(id_str.to_string()),
    })
}

/// Attributes from a JSON:API document (`data.attributes`), or a flat attribute object.
pub fn body_attributes(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    let bad = |msg: String| ApiError::new("bad_body").with_detail([msg]);
    let value: Value = serde_json::from_slice(body).map_err(|e| bad(format!("request body is not valid JSON: {}", e)))?;
    let Value::Object(mut obj) = value else {
        return Err(bad("request body must be a JSON object".into()));
    };
    match obj.remove("data") {
        None => Ok(obj),
        Some(Value::Object(mut data)) => match data.remove("attributes") {
            None => Ok(Map::new()),
            Some(Value::Object(attrs)) => Ok(attrs),
            Some(_) => Err(bad("data.attributes must be an object".into())),
        },
        Some(_) => Err(bad("data must be a resource object".into())),
    }
}

fn link_path(state: &AppState, resource: &ResolvedResource) -> String {
    format!("{}/{}", state.config.prefix.trim_end_matches('/'), resource.path_segment)
}

pub async fn index(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    query: ApiQuery,
) -> Result<Document, AppError> {
    let resource = resource_for(&state, &path_segment, Operation::Index)?;
    let specs = CrudService::include_specs(resource, &query.include)?;
    let page = CrudService::index(&state.pool, resource, &query.list_query(&state.config)).await?;
    let includes = CrudService::load_includes(&state.pool, &state.model, &specs, &page.rows).await?;
    tracing::debug!(resource = %resource.name, total = page.total, page = page.current_page, "index");
    let t = Transformer::new(&state.config, &state.model, &query.fields);
    let body = t.page(resource, &page, &includes, &link_path(&state, resource));
    Ok(Document::new(StatusCode::OK, body, &state.config))
}

pub async fn store(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    query: ApiQuery,
    body: Bytes,
) -> Result<Document, AppError> {
    let resource = resource_for(&state, &path_segment, Operation::Store)?;
    let attrs = body_attributes(&body)?;
    let row = CrudService::store(&state.pool, resource, &attrs).await?;
    tracing::info!(resource = %resource.name, "stored");
    let t = Transformer::new(&state.config, &state.model, &query.fields);
    Ok(Document::new(StatusCode::CREATED, t.one(resource, &row, &[]), &state.config))
}

pub async fn show(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    query: ApiQuery,
) -> Result<Document, AppError> {
    let resource = resource_for(&state, &path_segment, Operation::Show)?;
    let id = parse_id(&id_str, resource.pk_type)?;
    let specs = CrudService::include_specs(resource, &query.include)?;
    let row = CrudService::show(&state.pool, resource, &id)
        .await?
        .ok_or_else(|| AppError::not_found(&resource.name, &id_str))?;
    let includes = CrudService::load_includes(&state.pool, &state.model, &specs, std::slice::from_ref(&row)).await?;
    let t = Transformer::new(&state.config, &state.model, &query.fields);
    Ok(Document::new(StatusCode::OK, t.one(resource, &row, &includes), &state.config))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    query: ApiQuery,
    body: Bytes,
) -> Result<Document, AppError> {
    let resource = resource_for(&state, &path_segment, Operation::Update)?;
    let id = parse_id(&id_str, resource.pk_type)?;
    let attrs = body_attributes(&body)?;
    let row = CrudService::update(&state.pool, resource, &id, &attrs)
        .await?
        .ok_or_else(|| AppError::not_found(&resource.name, &id_str))?;
    tracing::info!(resource = %resource.name, id = %id_str, "updated");
    let t = Transformer::new(&state.config, &state.model, &query.fields);
    Ok(Document::new(StatusCode::OK, t.one(resource, &row, &[]), &state.config))
}

pub async fn destroy(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    query: ApiQuery,
) -> Result<Document, AppError> {
    let resource = resource_for(&state, &path_segment, Operation::Destroy)?;
    let id = parse_id(&id_str, resource.pk_type)?;
    let row = CrudService::destroy(&state.pool, resource, &id)
        .await?
        .ok_or_else(|| AppError::not_found(&resource.name, &id_str))?;
    tracing::info!(resource = %resource.name, id = %id_str, "destroyed");
    let t = Transformer::new(&state.config, &state.model, &query.fields);
    Ok(Document::new(StatusCode::OK, t.one(resource, &row, &[]), &state.config))
}
