//! Generic CRUD execution for configured resources: index with filters, sort, search and
//! pagination; store, show, update, destroy; batch loading of includes.

use crate::config::{IncludeSpec, ResolvedModel, ResolvedResource};
use crate::error::{ApiError, AppError};
use crate::response::{key_string, LoadedInclude, Page};
use crate::service::RequestValidator;
use crate::sql::{
    delete, filter_eq, insert, select_by_column_in, select_by_id, select_list, update, BindValue, Direction,
    QueryBuf, SearchCompiler, SearchRequest, SearchSpec, RELEVANCE_ALIAS,
};
use crate::store::DbPool;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One `sort` entry; `-column` sorts descending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortField {
    pub column: String,
    pub direction: Direction,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<SortField> {
        let raw = raw.trim();
        let (column, direction) = match raw.strip_prefix('-') {
            Some(rest) => (rest, Direction::Desc),
            None => (raw.strip_prefix('+').unwrap_or(raw), Direction::Asc),
        };
        (!column.is_empty()).then(|| SortField {
            column: column.to_string(),
            direction,
        })
    }
}

/// What index needs from the request.
#[derive(Clone, Debug)]
pub struct ListQuery {
    pub filters: Vec<(String, String)>,
    pub sort: Vec<SortField>,
    pub search: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            filters: Vec::new(),
            sort: Vec::new(),
            search: None,
            page: 1,
            per_page: 10,
        }
    }
}

pub struct CrudService;

impl CrudService {
    /// One page of rows. Filters are exact matches on known columns; unknown sort or filter
    /// columns are rejected. Search applies only to searchable resources.
    pub async fn index(pool: &DbPool, resource: &ResolvedResource, list: &ListQuery) -> Result<Page, AppError> {
        let d = pool.dialect();
        let table = resource.qualified_table();
        let mut q = select_list(d, resource);

        for (column, value) in &list.filters {
            if !resource.has_column(column) {
                return Err(ApiError::new("invalid_filter").with_detail([column.as_str()]).into());
            }
            filter_eq(&mut q, &format!("{}.{}", table, column), value);
        }

        let search = list
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && resource.is_searchable());

        for field in &list.sort {
            if field.column == RELEVANCE_ALIAS && search.is_some() {
                q.order_by_raw(RELEVANCE_ALIAS, field.direction);
            } else if resource.has_column(&field.column) {
                q.order_by(&format!("{}.{}", table, field.column), field.direction);
            } else {
                return Err(ApiError::new("invalid_sort").with_detail([field.column.as_str()]).into());
            }
        }

        if let Some(text) = search {
            if let Some(columns) = resource.search_columns()? {
                let spec = SearchSpec::new(columns.clone(), &SearchRequest::new(text));
                q = SearchCompiler::new(d).apply(&q, &resource.search_target(&columns), &spec);
            }
        }
        if !q.has_orders() {
            q.order_by(&format!("{}.{}", table, resource.primary_key), Direction::Asc);
        }

        let count = QueryBuf::from(&q.count_query());
        let total = pool
            .fetch_optional(&count.sql, &count.params)
            .await?
            .and_then(|row| row.get("aggregate").and_then(Value::as_u64))
            .unwrap_or(0);

        let per_page = list.per_page.max(1);
        let page = list.page.max(1);
        q.limit(per_page).offset((page - 1) * per_page);
        let rows = Self::query_many(pool, &QueryBuf::from(&q)).await?;
        Ok(Page {
            rows,
            total,
            per_page,
            current_page: page,
        })
    }

    /// Fetch one row by primary key.
    pub async fn show(pool: &DbPool, resource: &ResolvedResource, id: &BindValue) -> Result<Option<Value>, AppError> {
        let q = select_by_id(pool.dialect(), resource, id.clone());
        Ok(pool.fetch_optional(&q.sql, &q.params).await?)
    }

    /// Validate with the create rules, insert, and return the stored row.
    pub async fn store(pool: &DbPool, resource: &ResolvedResource, attrs: &Map<String, Value>) -> Result<Value, AppError> {
        Self::reject_unknown(resource, attrs)?;
        RequestValidator::validate(attrs, &resource.rules.create)?;
        let d = pool.dialect();
        let q = insert(d, resource, attrs);
        if d.supports_returning() {
            return pool
                .fetch_optional(&q.sql, &q.params)
                .await?
                .ok_or(AppError::Db(sqlx::Error::RowNotFound));
        }
        let done = pool.execute(&q.sql, &q.params).await?;
        let id = match attrs.get(&resource.primary_key).filter(|v| !v.is_null()) {
            Some(v) => BindValue::from_json(v),
            None => BindValue::I64(done.last_insert_id.ok_or(AppError::Db(sqlx::Error::RowNotFound))?),
        };
        Self::show(pool, resource, &id)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Validate present fields with the update rules, update, and re-read. `None` when the row is missing.
    pub async fn update(
        pool: &DbPool,
        resource: &ResolvedResource,
        id: &BindValue,
        attrs: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        Self::reject_unknown(resource, attrs)?;
        RequestValidator::validate_partial(attrs, &resource.rules.update)?;
        if Self::show(pool, resource, id).await?.is_none() {
            return Ok(None);
        }
        if let Some(q) = update(pool.dialect(), resource, id.clone(), attrs) {
            pool.execute(&q.sql, &q.params).await?;
        }
        Self::show(pool, resource, id).await
    }

    /// Delete one row by id. Returns the deleted row, or `None` when it was missing.
    pub async fn destroy(pool: &DbPool, resource: &ResolvedResource, id: &BindValue) -> Result<Option<Value>, AppError> {
        let Some(row) = Self::show(pool, resource, id).await? else {
            return Ok(None);
        };
        let q = delete(pool.dialect(), resource, id.clone());
        pool.execute(&q.sql, &q.params).await?;
        Ok(Some(row))
    }

    /// Resolve requested include names; unknown names are rejected together.
    pub fn include_specs(resource: &ResolvedResource, names: &[String]) -> Result<Vec<IncludeSpec>, ApiError> {
        let mut unknown = Vec::new();
        let mut specs = Vec::new();
        for name in names {
            match resource.include(name) {
                Some(spec) => specs.push(spec.clone()),
                None => unknown.push(name.as_str()),
            }
        }
        if unknown.is_empty() {
            return Ok(specs);
        }
        Err(unknown
            .into_iter()
            .fold(ApiError::new("invalid_include"), |err, name| err.with_detail([name])))
    }

    /// Batch-load related rows for `rows`: one `WHERE <foreign_key> IN (...)` per include.
    pub async fn load_includes(
        pool: &DbPool,
        model: &ResolvedModel,
        specs: &[IncludeSpec],
        rows: &[Value],
    ) -> Result<Vec<LoadedInclude>, AppError> {
        let mut out = Vec::with_capacity(specs.len());
        for spec in specs {
            let related = model
                .resource_by_name(&spec.related)
                .ok_or_else(|| ApiError::new("server_error").with_detail([format!("unknown resource {}", spec.related)]))?;
            let mut seen = HashSet::new();
            let keys: Vec<BindValue> = rows
                .iter()
                .filter_map(|r| r.get(&spec.local_key))
                .filter(|v| key_string(v).is_some_and(|k| seen.insert(k)))
                .map(BindValue::from_json)
                .collect();
            let related_rows = if keys.is_empty() {
                Vec::new()
            } else {
                let q = select_by_column_in(pool.dialect(), related, &spec.foreign_key, keys);
                Self::query_many(pool, &q).await?
            };
            tracing::debug!(include = %spec.name, rows = related_rows.len(), "loaded include");
            out.push(LoadedInclude {
                spec: spec.clone(),
                rows: related_rows,
            });
        }
        Ok(out)
    }

    fn reject_unknown(resource: &ResolvedResource, attrs: &Map<String, Value>) -> Result<(), ApiError> {
        let mut unknown: Vec<&str> = attrs
            .keys()
            .map(String::as_str)
            .filter(|k| !resource.has_column(k))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();
        Err(unknown
            .into_iter()
            .fold(ApiError::new("unknown_attribute"), |err, k| err.with_detail([k])))
    }

    async fn query_many(pool: &DbPool, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        Ok(pool.fetch_all(&q.sql, &q.params).await?)
    }
}
