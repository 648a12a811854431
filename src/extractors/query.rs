//! JSON:API query parameters: `include`, `fields[type]`, `page[number]`, `page[limit]`, `limit`,
//! `sort`, `search`, `filter[column]`.

use crate::config::ApiConfig;
use crate::error::{ApiError, AppError};
use crate::service::{ListQuery, SortField};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{request::Parts, Uri},
};
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct ApiQuery {
    pub include: Vec<String>,
    pub fields: HashMap<String, Vec<String>>,
    pub page_number: Option<u64>,
    pub page_limit: Option<u64>,
    pub sort: Vec<SortField>,
    pub search: Option<String>,
    pub filters: Vec<(String, String)>,
}

/// Name before any `[...]` suffix: `page[number]` → `page`.
pub fn base_name(key: &str) -> &str {
    key.split('[').next().unwrap_or(key)
}

/// Inner name of `outer[inner]`, when `key` has that shape.
fn bracketed<'a>(key: &'a str, outer: &str) -> Option<&'a str> {
    key.strip_prefix(outer)?.strip_prefix('[')?.strip_suffix(']')
}

fn comma_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn positive(key: &str, v: &str) -> Result<u64, ApiError> {
    match v.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ApiError::new("invalid_page").with_detail([key])),
    }
}

impl ApiQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut q = ApiQuery::default();
        for (key, value) in pairs {
            match key.as_str() {
                "include" => q.include.extend(comma_list(value)),
                "sort" => q.sort.extend(value.split(',').filter_map(SortField::parse)),
                "search" => q.search = Some(value.clone()),
                "page[number]" => q.page_number = Some(positive(key, value)?),
                "page[limit]" | "page[size]" | "limit" => q.page_limit = Some(positive(key, value)?),
                _ => {
                    if let Some(kind) = bracketed(key, "fields") {
                        q.fields.insert(kind.to_string(), comma_list(value));
                    } else if let Some(column) = bracketed(key, "filter") {
                        q.filters.push((column.to_string(), value.clone()));
                    }
                }
            }
        }
        Ok(q)
    }

    /// Pagination and filtering for index, page size clamped to the configured maximum.
    pub fn list_query(&self, api: &ApiConfig) -> ListQuery {
        ListQuery {
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            search: self.search.clone(),
            page: self.page_number.unwrap_or(1),
            per_page: self.page_limit.unwrap_or(api.default_page_size).min(api.max_page_size),
        }
    }
}

/// Decoded query-string pairs, in request order.
pub fn query_pairs(uri: &Uri) -> Result<Vec<(String, String)>, ApiError> {
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .map_err(|e| ApiError::new("bad_body").with_detail([e.body_text()]))
}

#[async_trait]
impl<S> FromRequestParts<S> for ApiQuery
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pairs = query_pairs(&parts.uri)?;
        Ok(ApiQuery::from_pairs(&pairs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Direction;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_every_parameter() {
        let q = ApiQuery::from_pairs(&pairs(&[
            ("include", "author, comments"),
            ("fields[post]", "title,body"),
            ("page[number]", "3"),
            ("page[limit]", "25"),
            ("sort", "-created_at,title"),
            ("search", "rust book"),
            ("filter[status]", "live"),
        ]))
        .unwrap();
        assert_eq!(q.include, vec!["author", "comments"]);
        assert_eq!(q.fields["post"], vec!["title", "body"]);
        assert_eq!(q.page_number, Some(3));
        assert_eq!(q.page_limit, Some(25));
        assert_eq!(q.sort[0].direction, Direction::Desc);
        assert_eq!(q.sort[1].column, "title");
        assert_eq!(q.search.as_deref(), Some("rust book"));
        assert_eq!(q.filters, vec![("status".to_string(), "live".to_string())]);
    }

    #[test]
    fn page_size_is_clamped() {
        let api = ApiConfig::default();
        let q = ApiQuery::from_pairs(&pairs(&[("limit", "500")])).unwrap();
        let list = q.list_query(&api);
        assert_eq!(list.per_page, api.max_page_size);
        assert_eq!(list.page, 1);
        let list = ApiQuery::default().list_query(&api);
        assert_eq!(list.per_page, api.default_page_size);
    }

    #[test]
    fn bad_page_numbers_are_rejected() {
        let err = ApiQuery::from_pairs(&pairs(&[("page[number]", "0")])).unwrap_err();
        assert_eq!(err.code(), "invalid_page");
        assert_eq!(
            err.errors()[0].source.as_ref().and_then(|s| s.parameter.as_deref()),
            Some("page[number]")
        );
        assert!(ApiQuery::from_pairs(&pairs(&[("page[limit]", "ten")])).is_err());
    }

    #[test]
    fn base_names() {
        assert_eq!(base_name("page[number]"), "page");
        assert_eq!(base_name("sort"), "sort");
        assert_eq!(bracketed("filter[a]", "filter"), Some("a"));
        assert_eq!(bracketed("filters[a]", "filter"), None);
    }
}
