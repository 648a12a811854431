//! Convert serde_json::Value to values that sqlx can bind on any of the supported drivers.

use serde_json::Value;

/// A value bound to a query placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    /// Bound natively on Postgres, as text elsewhere.
    Uuid(uuid::Uuid),
    Json(Value),
}

impl BindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else {
                    BindValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => BindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Json(v.clone()),
        }
    }

    /// Text form, used for JSON payloads and uuids on drivers without native support.
    pub fn as_text(&self) -> Option<String> {
        match self {
            BindValue::Null => None,
            BindValue::Bool(b) => Some(b.to_string()),
            BindValue::I64(n) => Some(n.to_string()),
            BindValue::F64(n) => Some(n.to_string()),
            BindValue::String(s) => Some(s.clone()),
            BindValue::Uuid(u) => Some(u.to_string()),
            BindValue::Json(v) => Some(v.to_string()),
        }
    }
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::String(s.to_string())
    }
}

impl From<String> for BindValue {
    fn from(s: String) -> Self {
        BindValue::String(s)
    }
}

impl From<i64> for BindValue {
    fn from(n: i64) -> Self {
        BindValue::I64(n)
    }
}

impl From<&Value> for BindValue {
    fn from(v: &Value) -> Self {
        BindValue::from_json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_convert() {
        assert_eq!(BindValue::from_json(&json!(null)), BindValue::Null);
        assert_eq!(BindValue::from_json(&json!(7)), BindValue::I64(7));
        assert_eq!(BindValue::from_json(&json!(1.5)), BindValue::F64(1.5));
        assert_eq!(BindValue::from_json(&json!("cat")), BindValue::String("cat".into()));
        assert_eq!(
            BindValue::from_json(&json!({"a": 1})).as_text().as_deref(),
            Some("{\"a\":1}")
        );
    }
}
