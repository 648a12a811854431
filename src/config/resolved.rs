//! Resolved resource model: config validated and flattened for runtime use.

use crate::config::{IncludeKind, Operation, PkType, RuleSet};
use crate::error::ConfigError;
use crate::sql::{SearchColumns, SearchJoin, SearchTarget};
use std::collections::{HashMap, HashSet};

/// An include available through `?include=name`.
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    pub name: String,
    pub kind: IncludeKind,
    /// Name (JSON:API type) of the related resource.
    pub related: String,
    pub local_key: String,
    pub foreign_key: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedSearch {
    /// Explicit weights; `None` means every column at weight 1.
    pub columns: Option<SearchColumns>,
    pub group_by: Option<Vec<String>>,
    pub joins: Vec<SearchJoin>,
}

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub name: String,
    pub path_segment: String,
    pub table: String,
    pub table_prefix: String,
    pub primary_key: String,
    pub pk_type: PkType,
    pub columns: Vec<String>,
    pub hidden: HashSet<String>,
    pub operations: HashSet<Operation>,
    pub rules: RuleSet,
    pub search: Option<ResolvedSearch>,
    pub includes: Vec<IncludeSpec>,
}

impl ResolvedResource {
    /// Physical table name, prefix applied.
    pub fn qualified_table(&self) -> String {
        format!("{}{}", self.table_prefix, self.table)
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn is_searchable(&self) -> bool {
        self.search.is_some()
    }

    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }

    /// Configured weights, or every visible column at weight 1.
    pub fn search_columns(&self) -> Result<Option<SearchColumns>, ConfigError> {
        let Some(search) = &self.search else {
            return Ok(None);
        };
        match &search.columns {
            Some(columns) => Ok(Some(columns.clone())),
            None => {
                let visible = self.columns.iter().filter(|c| !self.hidden.contains(*c)).cloned();
                SearchColumns::uniform(visible).map(Some)
            }
        }
    }

    pub fn search_target<'a>(&'a self, columns: &'a SearchColumns) -> SearchTarget<'a> {
        let (group_by, joins) = match &self.search {
            Some(s) => (s.group_by.as_deref(), s.joins.as_slice()),
            None => (None, &[][..]),
        };
        SearchTarget {
            table: &self.table,
            table_prefix: &self.table_prefix,
            primary_key: &self.primary_key,
            columns,
            group_by,
            joins,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub resources: Vec<ResolvedResource>,
    pub resource_by_path: HashMap<String, ResolvedResource>,
}

impl ResolvedModel {
    pub fn resource_by_path(&self, path: &str) -> Option<&ResolvedResource> {
        self.resource_by_path.get(path)
    }

    pub fn resource_by_name(&self, name: &str) -> Option<&ResolvedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Rebuild the path index after resources were modified in place.
    pub fn reindex(&mut self) {
        self.resource_by_path = self
            .resources
            .iter()
            .map(|r| (r.path_segment.clone(), r.clone()))
            .collect();
    }
}
