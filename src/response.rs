//! JSON:API document envelopes: resource objects, single and paginated documents, relationships and `included`.

use crate::config::{ApiConfig, IncludeKind, IncludeSpec, ResolvedModel, ResolvedResource};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

/// Top-level `jsonapi` member: protocol version plus the API's own version.
pub fn jsonapi_member(api: &ApiConfig) -> Value {
    json!({ "version": api.json_version, "self": api.version })
}

/// One page of rows plus what the paginator needs.
#[derive(Clone, Debug)]
pub struct Page {
    pub rows: Vec<Value>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

impl Page {
    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }
}

/// Related rows fetched for one requested include.
#[derive(Clone, Debug)]
pub struct LoadedInclude {
    pub spec: IncludeSpec,
    pub rows: Vec<Value>,
}

/// Stringified key used for `id` and for matching related rows.
pub fn key_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub struct Transformer<'a> {
    api: &'a ApiConfig,
    model: &'a ResolvedModel,
    fields: &'a HashMap<String, Vec<String>>,
}

impl<'a> Transformer<'a> {
    pub fn new(api: &'a ApiConfig, model: &'a ResolvedModel, fields: &'a HashMap<String, Vec<String>>) -> Self {
        Transformer { api, model, fields }
    }

    /// `{type, id, attributes}`. Primary key and hidden columns are left out of attributes,
    /// and a sparse fieldset for the type narrows them further.
    pub fn resource(&self, resource: &ResolvedResource, row: &Value) -> Value {
        let sparse = self.fields.get(&resource.name);
        let mut attributes = Map::new();
        if let Some(obj) = row.as_object() {
            for (k, v) in obj {
                if *k == resource.primary_key || resource.hidden.contains(k) {
                    continue;
                }
                if sparse.is_some_and(|f| !f.iter().any(|name| name == k)) {
                    continue;
                }
                attributes.insert(k.clone(), v.clone());
            }
        }
        let id = row.get(&resource.primary_key).and_then(key_string);
        json!({
            "type": resource.name,
            "id": id,
            "attributes": attributes,
        })
    }

    pub fn jsonapi(&self) -> Value {
        jsonapi_member(self.api)
    }

    /// Document for one row.
    pub fn one(&self, resource: &ResolvedResource, row: &Value, includes: &[LoadedInclude]) -> Value {
        let mut data = self.resource(resource, row);
        let mut doc = Map::new();
        if !includes.is_empty() {
            self.attach_relationships(&mut data, row, includes);
            doc.insert("included".into(), Value::Array(self.included(includes)));
        }
        doc.insert("data".into(), data);
        doc.insert("jsonapi".into(), self.jsonapi());
        Value::Object(doc)
    }

    /// Document for a page of rows, with pagination `meta` and `links` rooted at `path`.
    pub fn page(&self, resource: &ResolvedResource, page: &Page, includes: &[LoadedInclude], path: &str) -> Value {
        let data: Vec<Value> = page
            .rows
            .iter()
            .map(|row| {
                let mut obj = self.resource(resource, row);
                if !includes.is_empty() {
                    self.attach_relationships(&mut obj, row, includes);
                }
                obj
            })
            .collect();
        let mut doc = Map::new();
        doc.insert("data".into(), Value::Array(data));
        if !includes.is_empty() {
            doc.insert("included".into(), Value::Array(self.included(includes)));
        }
        doc.insert("meta".into(), pagination_meta(page));
        doc.insert("links".into(), pagination_links(&self.link_root(path), page));
        doc.insert("jsonapi".into(), self.jsonapi());
        Value::Object(doc)
    }

    fn link_root(&self, path: &str) -> String {
        match &self.api.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }

    fn attach_relationships(&self, obj: &mut Value, row: &Value, includes: &[LoadedInclude]) {
        let mut relationships = Map::new();
        for inc in includes {
            let Some(related) = self.model.resource_by_name(&inc.spec.related) else {
                continue;
            };
            let local = row.get(&inc.spec.local_key).and_then(key_string);
            let matches = inc.rows.iter().filter(|r| {
                local.is_some() && r.get(&inc.spec.foreign_key).and_then(key_string) == local
            });
            let identifier = |r: &Value| {
                json!({ "type": related.name, "id": r.get(&related.primary_key).and_then(key_string) })
            };
            let data = match inc.spec.kind {
                IncludeKind::ToOne => matches.map(identifier).next().unwrap_or(Value::Null),
                IncludeKind::ToMany => Value::Array(matches.map(identifier).collect()),
            };
            relationships.insert(inc.spec.name.clone(), json!({ "data": data }));
        }
        if let Some(o) = obj.as_object_mut() {
            o.insert("relationships".into(), Value::Object(relationships));
        }
    }

    /// Related resource objects, each (type, id) once.
    fn included(&self, includes: &[LoadedInclude]) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for inc in includes {
            let Some(related) = self.model.resource_by_name(&inc.spec.related) else {
                continue;
            };
            for r in &inc.rows {
                let id = r.get(&related.primary_key).and_then(key_string);
                if seen.insert((related.name.clone(), id)) {
                    out.push(self.resource(related, r));
                }
            }
        }
        out
    }
}

pub fn pagination_meta(page: &Page) -> Value {
    json!({
        "total": page.total,
        "total_pages": page.last_page(),
        "current_page": page.current_page,
        "per_page": page.per_page,
        "has_more_pages": page.has_more_pages(),
        "has_pages": page.last_page() > 1,
    })
}

pub fn pagination_links(root: &str, page: &Page) -> Value {
    let url = |n: u64| format!("{}?page[number]={}&page[limit]={}", root, n, page.per_page);
    let last = page.last_page();
    json!({
        "self": url(page.current_page),
        "first": url(1),
        "last": url(last),
        "next": (page.current_page < last).then(|| url(page.current_page + 1)),
        "prev": (page.current_page > 1).then(|| url(page.current_page - 1)),
    })
}

/// A JSON:API document with the configured content type.
pub struct Document {
    pub status: StatusCode,
    pub body: Value,
    pub content_type: String,
}

impl Document {
    pub fn new(status: StatusCode, body: Value, api: &ApiConfig) -> Self {
        Document {
            status,
            body,
            content_type: api.content_type.clone(),
        }
    }
}

impl IntoResponse for Document {
    fn into_response(self) -> Response {
        let mut res = (self.status, Json(self.body)).into_response();
        if let Ok(v) = HeaderValue::from_str(&self.content_type) {
            res.headers_mut().insert(header::CONTENT_TYPE, v);
        }
        res
    }
}
