//! Load config from JSON files and env, resolve it, and fill column listings from the database.

use crate::config::resolved::{IncludeSpec, ResolvedModel, ResolvedResource, ResolvedSearch};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::store::{list_columns, DbPool};
use std::path::Path;

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let mut resources = Vec::with_capacity(config.resources.len());
    for r in &config.resources {
        let mut includes: Vec<IncludeSpec> = r
            .includes
            .iter()
            .map(|(name, inc)| IncludeSpec {
                name: name.clone(),
                kind: inc.kind,
                related: inc.resource.clone(),
                local_key: inc.local_key.clone(),
                foreign_key: inc.foreign_key.clone(),
            })
            .collect();
        includes.sort_by(|a, b| a.name.cmp(&b.name));

        resources.push(ResolvedResource {
            name: r.name.clone(),
            path_segment: r.path_segment.clone().unwrap_or_else(|| r.name.clone()),
            table: r.table.clone(),
            table_prefix: config.api.table_prefix.clone(),
            primary_key: r.primary_key.clone(),
            pk_type: r.pk_type,
            columns: r.columns.clone(),
            hidden: r.hidden.iter().cloned().collect(),
            operations: r.operations.iter().copied().collect(),
            rules: r.rules.clone(),
            search: r.searchable.as_ref().map(|s| ResolvedSearch {
                columns: s.columns.clone(),
                group_by: s.group_by.clone(),
                joins: s.joins.clone(),
            }),
            includes,
        });
    }

    let mut model = ResolvedModel {
        resources,
        resource_by_path: Default::default(),
    };
    model.reindex();
    Ok(model)
}

/// Introspect column listings for resources configured without one.
pub async fn fill_columns(model: &mut ResolvedModel, pool: &DbPool) -> Result<(), ConfigError> {
    for r in model.resources.iter_mut().filter(|r| r.columns.is_empty()) {
        let table = r.qualified_table();
        let columns = list_columns(pool, &table)
            .await
            .map_err(|e| ConfigError::Load(format!("columns of {}: {}", table, e)))?;
        if columns.is_empty() {
            return Err(ConfigError::MissingReference { kind: "table", id: table });
        }
        if !columns.contains(&r.primary_key) {
            return Err(ConfigError::InvalidPrimaryKey {
                resource: r.name.clone(),
                column: r.primary_key.clone(),
            });
        }
        tracing::info!(resource = %r.name, table = %table, count = columns.len(), "introspected columns");
        r.columns = columns;
    }
    model.reindex();
    Ok(())
}

/// Read `jsonapi.json` (optional) and `resources.json` from `dir`.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let api_path = dir.join("jsonapi.json");
    let api: ApiConfig = match tokio::fs::read_to_string(&api_path).await {
        Ok(s) => serde_json::from_str(&s).map_err(|e| ConfigError::Load(format!("{}: {}", api_path.display(), e)))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %api_path.display(), "no api config, using defaults");
            ApiConfig::default()
        }
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", api_path.display(), e))),
    };

    let resources_path = dir.join("resources.json");
    let raw = tokio::fs::read_to_string(&resources_path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", resources_path.display(), e)))?;
    let resources: Vec<ResourceConfig> =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", resources_path.display(), e)))?;

    Ok(FullConfig { api, resources })
}

/// Load from `CONFIG_PATH` (default `config`). `TABLE_PREFIX`, when set, overrides the file value.
pub async fn load_from_env() -> Result<FullConfig, ConfigError> {
    let dir = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".into());
    let mut config = load_from_dir(&dir).await?;
    if let Ok(prefix) = std::env::var("TABLE_PREFIX") {
        config.api.table_prefix = prefix;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_paths_prefix_and_search() {
        let mut api = ApiConfig::default();
        api.table_prefix = "app_".into();
        let resources: Vec<ResourceConfig> = serde_json::from_value(json!([
            {
                "name": "post",
                "path_segment": "posts",
                "table": "posts",
                "columns": ["id", "title", "body", "secret"],
                "hidden": ["secret"],
                "operations": ["index", "show"],
                "searchable": {}
            }
        ]))
        .unwrap();
        let model = resolve(&FullConfig { api, resources }).unwrap();
        let post = model.resource_by_path("posts").unwrap();
        assert_eq!(post.qualified_table(), "app_posts");
        assert!(post.allows(Operation::Index));
        assert!(!post.allows(Operation::Destroy));

        let cols = post.search_columns().unwrap().unwrap();
        assert_eq!(cols.total_weight(), 3.0);
        assert!(cols.iter().all(|(c, _)| c != "secret"));
        let target = post.search_target(&cols);
        assert_eq!(target.qualified_table(), "app_posts");
        assert_eq!(target.primary_key, "id");
    }

    #[tokio::test]
    async fn loads_from_dir_with_default_api() {
        let dir = std::env::temp_dir().join(format!("jsonapi-config-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("resources.json"), r#"[{"name": "user", "table": "users"}]"#)
            .await
            .unwrap();
        let config = load_from_dir(&dir).await.unwrap();
        assert_eq!(config.api.version, "v1");
        assert_eq!(config.resources[0].primary_key, "id");
        assert_eq!(config.resources[0].operations.len(), 5);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
