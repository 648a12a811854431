//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a resolved resource.
//! Identifiers come from config only; every value is a binding.

use crate::config::ResolvedResource;
use crate::sql::{BindValue, Dialect, SelectQuery};
use serde_json::{Map, Value};

/// Rendered statement with `?` markers and its bindings in order.
#[derive(Clone, Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new(sql: String) -> Self {
        QueryBuf { sql, params: Vec::new() }
    }

    fn push_param(&mut self, v: BindValue) {
        self.params.push(v);
    }
}

impl From<&SelectQuery> for QueryBuf {
    fn from(q: &SelectQuery) -> Self {
        QueryBuf {
            sql: q.to_sql(),
            params: q.bindings(),
        }
    }
}

/// `SELECT * FROM <table>`: the query index filters, sorts and searches on.
pub fn select_list(d: Dialect, resource: &ResolvedResource) -> SelectQuery {
    SelectQuery::table(d, &resource.qualified_table())
}

/// Exact match against a query-string value. Postgres compares the column as text, since the
/// value's type is unknown; the other drivers coerce on their own.
pub fn filter_eq(q: &mut SelectQuery, column: &str, value: &str) {
    let d = q.dialect();
    match d {
        Dialect::Postgres => {
            q.where_raw(format!("{} = ?", d.column_as_text(column)), vec![BindValue::from(value)]);
        }
        _ => {
            q.where_eq(column, BindValue::from(value));
        }
    }
}

/// SELECT by primary key.
pub fn select_by_id(d: Dialect, resource: &ResolvedResource, id: BindValue) -> QueryBuf {
    let mut q = select_list(d, resource);
    q.where_eq(&resource.primary_key, id);
    QueryBuf::from(&q)
}

/// Rows whose `column` is one of `values`, ordered by primary key. Used to batch-load includes.
pub fn select_by_column_in(d: Dialect, resource: &ResolvedResource, column: &str, values: Vec<BindValue>) -> QueryBuf {
    let mut q = select_list(d, resource);
    q.where_in(column, values);
    q.order_by(&resource.primary_key, crate::sql::Direction::Asc);
    QueryBuf::from(&q)
}

/// INSERT the given attributes, in column order. Appends `RETURNING *` where the dialect supports it.
pub fn insert(d: Dialect, resource: &ResolvedResource, attrs: &Map<String, Value>) -> QueryBuf {
    let table = d.quote_identifier(&resource.qualified_table());
    let mut cols = Vec::new();
    let mut params = Vec::new();
    for c in resource.columns.iter().filter(|c| attrs.contains_key(c.as_str())) {
        cols.push(d.quote_identifier(c));
        params.push(BindValue::from_json(&attrs[c.as_str()]));
    }
    let mut q = if cols.is_empty() {
        match d {
            Dialect::MySql => QueryBuf::new(format!("INSERT INTO {} () VALUES ()", table)),
            _ => QueryBuf::new(format!("INSERT INTO {} DEFAULT VALUES", table)),
        }
    } else {
        let marks = vec!["?"; cols.len()].join(", ");
        QueryBuf::new(format!("INSERT INTO {} ({}) VALUES ({})", table, cols.join(", "), marks))
    };
    for p in params {
        q.push_param(p);
    }
    if d.supports_returning() {
        q.sql.push_str(" RETURNING *");
    }
    q
}

/// UPDATE by id: SET only known, non-key columns present in `attrs`. `None` when there is nothing to set.
pub fn update(d: Dialect, resource: &ResolvedResource, id: BindValue, attrs: &Map<String, Value>) -> Option<QueryBuf> {
    let mut sets = Vec::new();
    let mut params = Vec::new();
    for c in resource.columns.iter().filter(|c| **c != resource.primary_key) {
        if let Some(v) = attrs.get(c.as_str()) {
            sets.push(format!("{} = ?", d.quote_identifier(c)));
            params.push(BindValue::from_json(v));
        }
    }
    if sets.is_empty() {
        return None;
    }
    let mut q = QueryBuf::new(format!(
        "UPDATE {} SET {} WHERE {} = ?",
        d.quote_identifier(&resource.qualified_table()),
        sets.join(", "),
        d.quote_identifier(&resource.primary_key)
    ));
    for p in params {
        q.push_param(p);
    }
    q.push_param(id);
    Some(q)
}

/// DELETE by id.
pub fn delete(d: Dialect, resource: &ResolvedResource, id: BindValue) -> QueryBuf {
    let mut q = QueryBuf::new(format!(
        "DELETE FROM {} WHERE {} = ?",
        d.quote_identifier(&resource.qualified_table()),
        d.quote_identifier(&resource.primary_key)
    ));
    q.push_param(id);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Operation, PkType, RuleSet};
    use serde_json::json;

    fn users() -> ResolvedResource {
        ResolvedResource {
            name: "user".into(),
            path_segment: "users".into(),
            table: "users".into(),
            table_prefix: "app_".into(),
            primary_key: "id".into(),
            pk_type: PkType::Int,
            columns: vec!["id".into(), "name".into(), "email".into()],
            hidden: Default::default(),
            operations: Operation::ALL.into_iter().collect(),
            rules: RuleSet::default(),
            search: None,
            includes: Vec::new(),
        }
    }

    fn attrs(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn insert_follows_column_order_and_returning() {
        let body = attrs(json!({"email": "a@b.c", "name": "Ann"}));
        let q = insert(Dialect::Postgres, &users(), &body);
        assert_eq!(
            q.sql,
            "INSERT INTO \"app_users\" (\"name\", \"email\") VALUES (?, ?) RETURNING *"
        );
        assert_eq!(q.params, vec![BindValue::from("Ann"), BindValue::from("a@b.c")]);

        let q = insert(Dialect::MySql, &users(), &body);
        assert_eq!(q.sql, "INSERT INTO `app_users` (`name`, `email`) VALUES (?, ?)");
    }

    #[test]
    fn insert_without_attributes_uses_defaults() {
        let q = insert(Dialect::Other, &users(), &Map::new());
        assert_eq!(q.sql, "INSERT INTO \"app_users\" DEFAULT VALUES RETURNING *");
        assert!(q.params.is_empty());
    }

    #[test]
    fn update_skips_key_and_unknown_columns() {
        let body = attrs(json!({"id": 9, "name": "Bo", "nope": 1}));
        let q = update(Dialect::MySql, &users(), BindValue::I64(4), &body).unwrap();
        assert_eq!(q.sql, "UPDATE `app_users` SET `name` = ? WHERE `id` = ?");
        assert_eq!(q.params, vec![BindValue::from("Bo"), BindValue::I64(4)]);
        assert!(update(Dialect::MySql, &users(), BindValue::I64(4), &attrs(json!({"id": 1}))).is_none());
    }

    #[test]
    fn select_and_delete_by_id() {
        let q = select_by_id(Dialect::Postgres, &users(), BindValue::I64(2));
        assert_eq!(q.sql, "SELECT * FROM \"app_users\" WHERE \"id\" = ?");
        let q = delete(Dialect::Postgres, &users(), BindValue::I64(2));
        assert_eq!(q.sql, "DELETE FROM \"app_users\" WHERE \"id\" = ?");
        assert_eq!(q.params, vec![BindValue::I64(2)]);
    }

    #[test]
    fn filters_compare_as_text_on_postgres() {
        let mut q = select_list(Dialect::Postgres, &users());
        filter_eq(&mut q, "app_users.name", "Ann");
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM \"app_users\" WHERE CAST(\"app_users\".\"name\" AS TEXT) = ?"
        );
        let mut q = select_list(Dialect::MySql, &users());
        filter_eq(&mut q, "app_users.name", "Ann");
        assert_eq!(q.to_sql(), "SELECT * FROM `app_users` WHERE `app_users`.`name` = ?");
        assert_eq!(q.bindings(), vec![BindValue::from("Ann")]);
    }

    #[test]
    fn column_in_orders_by_key() {
        let q = select_by_column_in(
            Dialect::Other,
            &users(),
            "email",
            vec![BindValue::from("a"), BindValue::from("b")],
        );
        assert_eq!(
            q.sql,
            "SELECT * FROM \"app_users\" WHERE \"email\" IN (?, ?) ORDER BY \"id\" ASC"
        );
        assert_eq!(q.params.len(), 2);
    }
}
