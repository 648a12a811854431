//! Database access: one pool per supported driver, query execution with [`BindValue`] parameters,
//! row-to-JSON decoding, and schema introspection.

use crate::sql::{BindValue, Dialect};
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};

#[derive(Clone, Debug)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Result of a statement without rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct Executed {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Bind every parameter in order. Uuids are native on Postgres only; JSON goes through as text elsewhere.
macro_rules! bind_params {
    (@scalar $q:ident, $p:expr) => {
        match $p {
            BindValue::Null => $q.bind(None::<String>),
            BindValue::Bool(b) => $q.bind(*b),
            BindValue::I64(n) => $q.bind(*n),
            BindValue::F64(n) => $q.bind(*n),
            BindValue::String(s) => $q.bind(s.clone()),
            BindValue::Uuid(u) => $q.bind(u.to_string()),
            BindValue::Json(v) => $q.bind(v.to_string()),
        }
    };
    ($query:expr, $params:expr, native_uuid) => {{
        let mut q = $query;
        for p in $params {
            q = match p {
                BindValue::Uuid(u) => q.bind(*u),
                BindValue::Json(v) => q.bind(v.clone()),
                other => bind_params!(@scalar q, other),
            };
        }
        q
    }};
    ($query:expr, $params:expr) => {{
        let mut q = $query;
        for p in $params {
            q = match p {
                BindValue::Uuid(_) | BindValue::Json(_) => q.bind(p.as_text()),
                other => bind_params!(@scalar q, other),
            };
        }
        q
    }};
}

/// Try each type in order; the first non-null decode wins.
macro_rules! decode_cell {
    ($row:expr, $idx:expr; $($ty:ty => $conv:expr),+ $(,)?) => {{
        $(
            if let Ok(Some(v)) = $row.try_get::<Option<$ty>, _>($idx) {
                return ($conv)(v);
            }
        )+
        Value::Null
    }};
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// NUMERIC/DECIMAL as a JSON number: integral values as integers, the rest as floats.
fn decimal(d: rust_decimal::Decimal) -> Value {
    let text = d.normalize().to_string();
    match serde_json::from_str::<serde_json::Number>(&text) {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(text),
    }
}

fn pg_cell(row: &PgRow, idx: usize) -> Value {
    decode_cell!(row, idx;
        i16 => |n: i16| Value::from(n),
        i32 => |n: i32| Value::from(n),
        i64 => |n: i64| Value::from(n),
        f32 => |n: f32| number(n as f64),
        f64 => number,
        rust_decimal::Decimal => decimal,
        bool => Value::Bool,
        uuid::Uuid => |u: uuid::Uuid| Value::String(u.to_string()),
        chrono::DateTime<chrono::Utc> => |d: chrono::DateTime<chrono::Utc>| Value::String(d.to_rfc3339()),
        chrono::NaiveDateTime => |d: chrono::NaiveDateTime| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string()),
        chrono::NaiveDate => |d: chrono::NaiveDate| Value::String(d.format("%Y-%m-%d").to_string()),
        String => Value::String,
        Value => |v: Value| v,
    )
}

fn mysql_cell(row: &MySqlRow, idx: usize) -> Value {
    decode_cell!(row, idx;
        i64 => |n: i64| Value::from(n),
        u64 => |n: u64| Value::from(n),
        f64 => number,
        f32 => |n: f32| number(n as f64),
        rust_decimal::Decimal => decimal,
        chrono::NaiveDateTime => |d: chrono::NaiveDateTime| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string()),
        chrono::NaiveDate => |d: chrono::NaiveDate| Value::String(d.format("%Y-%m-%d").to_string()),
        String => Value::String,
        Value => |v: Value| v,
    )
}

fn sqlite_cell(row: &SqliteRow, idx: usize) -> Value {
    decode_cell!(row, idx;
        i64 => |n: i64| Value::from(n),
        f64 => number,
        String => Value::String,
    )
}

fn row_to_json<R: Row>(row: &R, cell: fn(&R, usize) -> Value) -> Value {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        map.insert(col.name().to_string(), cell(row, col.ordinal()));
    }
    Value::Object(map)
}

impl DbPool {
    /// Connect with the driver chosen by the URL scheme.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        Ok(match Dialect::from_url(url) {
            Dialect::Postgres => DbPool::Postgres(
                PgPoolOptions::new().max_connections(max_connections).connect(url).await?,
            ),
            Dialect::MySql => DbPool::MySql(
                MySqlPoolOptions::new().max_connections(max_connections).connect(url).await?,
            ),
            Dialect::Other => DbPool::Sqlite(
                SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?,
            ),
        })
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::Postgres(_) => Dialect::Postgres,
            DbPool::MySql(_) => Dialect::MySql,
            DbPool::Sqlite(_) => Dialect::Other,
        }
    }

    pub async fn fetch_all(&self, sql: &str, params: &[BindValue]) -> Result<Vec<Value>, sqlx::Error> {
        let sql = self.dialect().bind_markers(sql);
        tracing::debug!(sql = %sql, params = ?params, "query");
        Ok(match self {
            DbPool::Postgres(pool) => bind_params!(sqlx::query(&sql), params, native_uuid)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|r| row_to_json(r, pg_cell))
                .collect(),
            DbPool::MySql(pool) => bind_params!(sqlx::query(&sql), params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|r| row_to_json(r, mysql_cell))
                .collect(),
            DbPool::Sqlite(pool) => bind_params!(sqlx::query(&sql), params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|r| row_to_json(r, sqlite_cell))
                .collect(),
        })
    }

    pub async fn fetch_optional(&self, sql: &str, params: &[BindValue]) -> Result<Option<Value>, sqlx::Error> {
        let sql = self.dialect().bind_markers(sql);
        tracing::debug!(sql = %sql, params = ?params, "query");
        Ok(match self {
            DbPool::Postgres(pool) => bind_params!(sqlx::query(&sql), params, native_uuid)
                .fetch_optional(pool)
                .await?
                .map(|r| row_to_json(&r, pg_cell)),
            DbPool::MySql(pool) => bind_params!(sqlx::query(&sql), params)
                .fetch_optional(pool)
                .await?
                .map(|r| row_to_json(&r, mysql_cell)),
            DbPool::Sqlite(pool) => bind_params!(sqlx::query(&sql), params)
                .fetch_optional(pool)
                .await?
                .map(|r| row_to_json(&r, sqlite_cell)),
        })
    }

    pub async fn execute(&self, sql: &str, params: &[BindValue]) -> Result<Executed, sqlx::Error> {
        let sql = self.dialect().bind_markers(sql);
        tracing::debug!(sql = %sql, params = ?params, "execute");
        Ok(match self {
            DbPool::Postgres(pool) => {
                let r = bind_params!(sqlx::query(&sql), params, native_uuid).execute(pool).await?;
                Executed {
                    rows_affected: r.rows_affected(),
                    last_insert_id: None,
                }
            }
            DbPool::MySql(pool) => {
                let r = bind_params!(sqlx::query(&sql), params).execute(pool).await?;
                Executed {
                    rows_affected: r.rows_affected(),
                    last_insert_id: i64::try_from(r.last_insert_id()).ok().filter(|id| *id > 0),
                }
            }
            DbPool::Sqlite(pool) => {
                let r = bind_params!(sqlx::query(&sql), params).execute(pool).await?;
                Executed {
                    rows_affected: r.rows_affected(),
                    last_insert_id: Some(r.last_insert_rowid()),
                }
            }
        })
    }

    /// Round-trip to the database for readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.fetch_optional("SELECT 1", &[]).await.map(|_| ())
    }
}

/// Ordered column names of `table`; empty when the table does not exist.
pub async fn list_columns(pool: &DbPool, table: &str) -> Result<Vec<String>, sqlx::Error> {
    let sql = match pool.dialect() {
        Dialect::MySql => {
            "SELECT column_name AS name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
        }
        Dialect::Postgres => {
            "SELECT column_name::text AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = ? ORDER BY ordinal_position"
        }
        Dialect::Other => "SELECT name FROM pragma_table_info(?) ORDER BY cid",
    };
    let rows = pool.fetch_all(sql, &[BindValue::from(table)]).await?;
    Ok(rows
        .into_iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
        .collect())
}
