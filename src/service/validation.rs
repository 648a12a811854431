//! Request validation from config rules. Every failing field is reported, not just the first.

use crate::config::ValidationRule;
use crate::error::ApiError;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-column rules. All required fields must be present.
    pub fn validate(body: &Map<String, Value>, rules: &HashMap<String, ValidationRule>) -> Result<(), ApiError> {
        let mut failures = Vec::new();
        for (col, rule) in sorted(rules) {
            let val = body.get(col);
            if rule.required == Some(true) && val.map_or(true, Value::is_null) {
                failures.push((col.to_string(), format!("{} is required", col)));
                continue;
            }
            if let Some(v) = val {
                if let Err(msg) = validate_field(col, v, rule) {
                    failures.push((col.to_string(), msg));
                }
            }
        }
        into_result(failures)
    }

    /// Validate only the fields present in body (for PATCH). Required is not enforced for missing fields.
    pub fn validate_partial(body: &Map<String, Value>, rules: &HashMap<String, ValidationRule>) -> Result<(), ApiError> {
        let mut failures = Vec::new();
        for (col, rule) in sorted(rules) {
            let Some(v) = body.get(col) else { continue };
            if rule.required == Some(true) && v.is_null() {
                failures.push((col.to_string(), format!("{} is required", col)));
                continue;
            }
            if let Err(msg) = validate_field(col, v, rule) {
                failures.push((col.to_string(), msg));
            }
        }
        into_result(failures)
    }
}

fn sorted(rules: &HashMap<String, ValidationRule>) -> Vec<(&str, &ValidationRule)> {
    let mut out: Vec<_> = rules.iter().map(|(k, v)| (k.as_str(), v)).collect();
    out.sort_by(|a, b| a.0.cmp(b.0));
    out
}

fn into_result(failures: Vec<(String, String)>) -> Result<(), ApiError> {
    if failures.is_empty() {
        return Ok(());
    }
    Err(failures
        .into_iter()
        .fold(ApiError::new("invalid_attribute"), |err, (col, msg)| err.with_detail([col, msg])))
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), String> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let (Some(max), Some(s)) = (rule.max_length, v.as_str()) {
        if s.chars().count() > max as usize {
            return Err(format!("{} must be at most {} characters", col, max));
        }
    }
    if let (Some(min), Some(s)) = (rule.min_length, v.as_str()) {
        if s.chars().count() < min as usize {
            return Err(format!("{} must be at least {} characters", col, min));
        }
    }
    if let Some(pattern) = &rule.pattern {
        let re = Regex::new(pattern).map_err(|_| format!("invalid pattern for {}", col))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(format!("{} does not match required pattern", col));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(format!(
                "{} must be one of: {}",
                col,
                allowed.iter().take(5).map(Value::to_string).collect::<Vec<_>>().join(", ")
            ));
        }
    }
    if let (Some(min), Some(n)) = (rule.minimum, v.as_f64()) {
        if n < min {
            return Err(format!("{} must be at least {}", col, min));
        }
    }
    if let (Some(max), Some(n)) = (rule.maximum, v.as_f64()) {
        if n > max {
            return Err(format!("{} must be at most {}", col, max));
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), String> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .is_some_and(|(user, host)| !user.is_empty() && host.contains('.') && !host.ends_with('.'));
            if !valid {
                return Err(format!("{} must be a valid email", col));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(format!("{} must be a valid UUID", col));
            }
        }
        "date" => {
            if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() {
                return Err(format!("{} must be a date (YYYY-MM-DD)", col));
            }
        }
        _ => {}
    }
    Ok(())
}
