//! Config validation: referential integrity and resource consistency.

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let api = &config.api;
    if api.default_page_size == 0 || api.max_page_size == 0 {
        return Err(ConfigError::Validation("page sizes must be positive".into()));
    }
    if api.default_page_size > api.max_page_size {
        return Err(ConfigError::Validation(format!(
            "default_page_size {} exceeds max_page_size {}",
            api.default_page_size, api.max_page_size
        )));
    }

    let names: HashSet<&str> = config.resources.iter().map(|r| r.name.as_str()).collect();
    if names.len() != config.resources.len() {
        return Err(ConfigError::Validation("resource names must be unique".into()));
    }

    let mut path_segments = HashSet::new();
    for r in &config.resources {
        let path = r.path_segment.as_deref().unwrap_or(&r.name);
        if !path_segments.insert(path) {
            return Err(ConfigError::DuplicatePathSegment(path.to_string()));
        }
        if r.table.is_empty() {
            return Err(ConfigError::Validation(format!("resource {} has no table", r.name)));
        }

        // Column checks only apply when the listing is given; otherwise it is introspected later.
        if !r.columns.is_empty() {
            let columns: HashSet<&str> = r.columns.iter().map(String::as_str).collect();
            if !columns.contains(r.primary_key.as_str()) {
                return Err(ConfigError::InvalidPrimaryKey {
                    resource: r.name.clone(),
                    column: r.primary_key.clone(),
                });
            }
            for rules in [&r.rules.create, &r.rules.update] {
                if let Some(col) = rules.keys().find(|c| !columns.contains(c.as_str())) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", r.name, col),
                    });
                }
            }
        }

        for (name, include) in &r.includes {
            if !names.contains(include.resource.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "resource",
                    id: format!("{} (include {} of {})", include.resource, name, r.name),
                });
            }
        }

        if let Some(search) = &r.searchable {
            for join in &search.joins {
                if join.column.is_some() != join.value.is_some() {
                    return Err(ConfigError::Validation(format!(
                        "search join {} of {} needs both column and value",
                        join.table, r.name
                    )));
                }
            }
        }
    }
    Ok(())
}
