//! Typed errors and their JSON:API rendering.
//!
//! [`ApiError`] is a named template from a fixed catalog (title, detail and source, with `%s` / `%1$s`
//! placeholders) plus the details it is rendered with. One error object is produced per detail.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use crate::config::ApiConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: resource {resource} column {column}")]
    InvalidPrimaryKey { resource: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("invalid search weight {weight} for column {column}")]
    InvalidSearchWeight { column: String, weight: f64 },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// `source` member of a JSON:API error object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// A JSON:API error object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Pointer,
    Parameter,
}

#[derive(Clone, Copy, Debug)]
pub struct ErrorTemplate {
    pub code: &'static str,
    pub status: StatusCode,
    pub title: &'static str,
    pub detail: &'static str,
    pub source: Option<(SourceKind, &'static str)>,
}

impl ErrorTemplate {
    /// Look up a template; unknown codes fall back to `server_error`.
    pub fn lookup(code: &str) -> ErrorTemplate {
        use SourceKind::*;
        let (code, status, title, detail, source) = match code {
            "invalid_attribute" => (
                "invalid_attribute",
                StatusCode::FORBIDDEN,
                "Invalid Attribute",
                "%2$s",
                Some((Pointer, "/data/attributes/%1$s")),
            ),
            "unknown_attribute" => (
                "unknown_attribute",
                StatusCode::BAD_REQUEST,
                "Unknown Attribute",
                "%s is not an attribute of this resource",
                Some((Pointer, "/data/attributes/%s")),
            ),
            "invalid_get" => (
                "invalid_get",
                StatusCode::BAD_REQUEST,
                "Invalid Query Parameter",
                "The query parameter %s is not allowed",
                Some((Parameter, "%s")),
            ),
            "invalid_sort" => (
                "invalid_sort",
                StatusCode::BAD_REQUEST,
                "Invalid Sort",
                "Cannot sort by %s",
                Some((Parameter, "sort")),
            ),
            "invalid_filter" => (
                "invalid_filter",
                StatusCode::BAD_REQUEST,
                "Invalid Filter",
                "Cannot filter by %s",
                Some((Parameter, "filter[%s]")),
            ),
            "invalid_include" => (
                "invalid_include",
                StatusCode::BAD_REQUEST,
                "Invalid Include",
                "%s is not an includable relationship",
                Some((Parameter, "include")),
            ),
            "invalid_page" => (
                "invalid_page",
                StatusCode::BAD_REQUEST,
                "Invalid Page",
                "%s must be a positive integer",
                Some((Parameter, "%s")),
            ),
            "invalid_id" => ("invalid_id", StatusCode::BAD_REQUEST, "Invalid Id", "%s is not a valid identifier", None),
            "bad_body" => ("bad_body", StatusCode::BAD_REQUEST, "Malformed Body", "%s", Some((Pointer, "/data"))),
            "not_found" => ("not_found", StatusCode::NOT_FOUND, "Resource Not Found", "No %s found with id %s", None),
            "operation_not_allowed" => (
                "operation_not_allowed",
                StatusCode::METHOD_NOT_ALLOWED,
                "Operation Not Allowed",
                "%s is not allowed on %s",
                None,
            ),
            "not_acceptable" => (
                "not_acceptable",
                StatusCode::NOT_ACCEPTABLE,
                "Not Acceptable",
                "The Accept header must allow %s",
                None,
            ),
            "unsupported_media_type" => (
                "unsupported_media_type",
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Unsupported Media Type",
                "The Content-Type header must be %s",
                None,
            ),
            "conflict" => ("conflict", StatusCode::CONFLICT, "Conflict", "%s", None),
            _ => {
                return ErrorTemplate {
                    code: "server_error",
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    title: "Server Error",
                    detail: "%s",
                    source: None,
                }
            }
        };
        ErrorTemplate {
            code,
            status,
            title,
            detail,
            source,
        }
    }

    fn render(&self, status: StatusCode, args: &[String]) -> ErrorObject {
        let source = self.source.map(|(kind, template)| {
            let value = Some(format_args_template(template, args));
            match kind {
                SourceKind::Pointer => ErrorSource {
                    pointer: value,
                    parameter: None,
                },
                SourceKind::Parameter => ErrorSource {
                    pointer: None,
                    parameter: value,
                },
            }
        });
        ErrorObject {
            status: Some(status.as_u16().to_string()),
            code: Some(self.code.to_string()),
            title: self.title.to_string(),
            detail: format_args_template(self.detail, args),
            source,
        }
    }
}

/// Substitute `%s` (sequential) and `%N$s` (positional, 1-based) with `args`. Missing args render empty; `%%` is a literal `%`.
pub fn format_args_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s') => {
                chars.next();
                out.push_str(args.get(next).map(String::as_str).unwrap_or(""));
                next += 1;
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                if chars.peek() == Some(&'$') {
                    chars.next();
                    if chars.peek() == Some(&'s') {
                        chars.next();
                        let idx = digits.parse::<usize>().unwrap_or(0);
                        let arg = idx.checked_sub(1).and_then(|i| args.get(i));
                        out.push_str(arg.map(String::as_str).unwrap_or(""));
                        continue;
                    }
                    out.push('%');
                    out.push_str(&digits);
                    out.push('$');
                } else {
                    out.push('%');
                    out.push_str(&digits);
                }
            }
            _ => out.push('%'),
        }
    }
    out
}

/// What an [`ApiError`] is rendered from.
#[derive(Clone, Debug, Default)]
pub enum ErrorDetails {
    /// Render the template once with no arguments.
    #[default]
    None,
    /// Already-built error objects, passed through untouched.
    Rendered(Vec<ErrorObject>),
    /// One argument list per error object.
    Args(Vec<Vec<String>>),
}

#[derive(Debug, Clone)]
pub struct ApiError {
    template: ErrorTemplate,
    status: StatusCode,
    details: ErrorDetails,
}

impl ApiError {
    pub fn new(code: &str) -> Self {
        let template = ErrorTemplate::lookup(code);
        ApiError {
            status: template.status,
            template,
            details: ErrorDetails::None,
        }
    }

    /// Override the template's status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Append one argument list (one more error object).
    pub fn with_detail<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        match &mut self.details {
            ErrorDetails::Args(list) => list.push(args),
            _ => self.details = ErrorDetails::Args(vec![args]),
        }
        self
    }

    pub fn code(&self) -> &'static str {
        self.template.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Render the error objects.
    pub fn errors(&self) -> Vec<ErrorObject> {
        match &self.details {
            ErrorDetails::Rendered(errors) => errors.clone(),
            ErrorDetails::Args(list) if !list.is_empty() => {
                list.iter().map(|args| self.template.render(self.status, args)).collect()
            }
            _ => vec![self.template.render(self.status, &[])],
        }
    }

    fn summary(&self) -> String {
        self.errors()
            .iter()
            .map(|e| e.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.template.code, self.summary())
    }
}

impl std::error::Error for ApiError {}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl AppError {
    pub fn not_found(resource: &str, id: &str) -> Self {
        AppError::Api(ApiError::new("not_found").with_detail([resource, id]))
    }

    fn to_api_error(&self) -> ApiError {
        match self {
            AppError::Api(e) => e.clone(),
            AppError::Config(e) => ApiError::new("server_error").with_detail([e.to_string()]),
            AppError::Db(sqlx::Error::RowNotFound) => ApiError::new("not_found").with_detail(["resource", ""]),
            AppError::Db(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                ApiError::new("conflict").with_detail([e.message().to_string()])
            }
            AppError::Db(_) => ApiError::new("server_error").with_detail(["database error"]),
        }
    }
}

/// Error objects attached to an error response, so a layer holding the [`ApiConfig`] can re-render
/// the document with the configured content type and `jsonapi` member.
#[derive(Clone, Debug)]
pub struct RenderedErrors(pub Vec<ErrorObject>);

impl RenderedErrors {
    pub fn document(&self, api: &ApiConfig) -> serde_json::Value {
        serde_json::json!({
            "errors": self.0,
            "jsonapi": crate::response::jsonapi_member(api),
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let api = self.to_api_error();
        let status = api.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let errors = RenderedErrors(api.errors());
        let defaults = ApiConfig::default();
        let mut res = (
            status,
            [(header::CONTENT_TYPE, defaults.content_type.clone())],
            Json(errors.document(&defaults)),
        )
            .into_response();
        res.extensions_mut().insert(errors);
        res
    }
}
