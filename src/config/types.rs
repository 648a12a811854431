//! Raw config types matching `jsonapi.json` and `resources.json`.

use crate::sql::{SearchColumns, SearchJoin};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// API-wide settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enforce JSON:API content negotiation on requests.
    pub strict: bool,
    /// API version reported as `jsonapi.self`.
    pub version: String,
    /// JSON:API version reported as `jsonapi.version`.
    pub json_version: String,
    /// Mount point for resource routes.
    pub prefix: String,
    pub accept: String,
    pub content_type: String,
    /// Query parameter names (before any `[...]`) a request may carry.
    pub allowed_get: Vec<String>,
    pub default_page_size: u64,
    pub max_page_size: u64,
    /// Prepended to every configured table name.
    pub table_prefix: String,
    /// Absolute base for pagination links, e.g. `https://api.example.com`. Relative links when unset.
    pub base_url: Option<String>,
    /// Request body cap in bytes.
    pub body_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            strict: false,
            version: "v1".into(),
            json_version: "1.0".into(),
            prefix: "/api".into(),
            accept: JSONAPI_MEDIA_TYPE.into(),
            content_type: JSONAPI_MEDIA_TYPE.into(),
            allowed_get: ["include", "fields", "page", "limit", "sort", "search", "filter"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_page_size: 10,
            max_page_size: 100,
            table_prefix: String::new(),
            base_url: None,
            body_limit: 1024 * 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PkType {
    #[default]
    Int,
    BigInt,
    Uuid,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Index,
    Store,
    Show,
    Update,
    Destroy,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Index,
        Operation::Store,
        Operation::Show,
        Operation::Update,
        Operation::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::Store => "store",
            Operation::Show => "show",
            Operation::Update => "update",
            Operation::Destroy => "destroy",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Validation rules per write action.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub create: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub update: HashMap<String, ValidationRule>,
}

/// Search settings; `columns` falls back to every resource column at weight 1.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchableConfig {
    #[serde(default)]
    pub columns: Option<SearchColumns>,
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub joins: Vec<SearchJoin>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    /// We hold the foreign key (`local_key` on our side points at `foreign_key` on theirs).
    ToOne,
    /// They hold the foreign key pointing at our `local_key`.
    ToMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncludeConfig {
    /// Name of the related resource.
    pub resource: String,
    pub kind: IncludeKind,
    pub local_key: String,
    pub foreign_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// JSON:API `type`.
    pub name: String,
    /// URL segment; defaults to `name`.
    #[serde(default)]
    pub path_segment: Option<String>,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub pk_type: PkType,
    /// Column listing; introspected from the database when empty.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Columns never rendered (password hashes, secrets).
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default)]
    pub searchable: Option<SearchableConfig>,
    #[serde(default)]
    pub includes: HashMap<String, IncludeConfig>,
}

fn default_primary_key() -> String {
    "id".into()
}

fn default_operations() -> Vec<Operation> {
    Operation::ALL.to_vec()
}

/// All config in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub api: ApiConfig,
    pub resources: Vec<ResourceConfig>,
}
