//! Dialect-aware SELECT builder. Identifiers are quoted on the way in, values always go through bindings.
//! SQL is rendered with `?` markers; see [`Dialect::bind_markers`] for the per-driver rewrite.

use crate::sql::{BindValue, Dialect};
use std::collections::BTreeMap;

/// Clause a binding belongs to. Bindings are flattened in this order, matching where each clause is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Clause {
    Select,
    From,
    Join,
    Where,
    Having,
    Order,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
enum Source {
    Table(String),
    Derived { sql: String, alias: String },
}

#[derive(Clone, Debug)]
pub struct SelectQuery {
    dialect: Dialect,
    source: Source,
    columns: Vec<String>,
    joins: Vec<String>,
    wheres: Vec<String>,
    groups: Vec<String>,
    havings: Vec<String>,
    orders: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    bindings: BTreeMap<Clause, Vec<BindValue>>,
}

impl SelectQuery {
    /// `SELECT * FROM <table>`.
    pub fn table(dialect: Dialect, table: &str) -> Self {
        SelectQuery {
            dialect,
            source: Source::Table(table.to_string()),
            columns: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            groups: Vec::new(),
            havings: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            bindings: BTreeMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Table name or derived-table alias this query reads from.
    pub fn source_name(&self) -> &str {
        match &self.source {
            Source::Table(t) => t,
            Source::Derived { alias, .. } => alias,
        }
    }

    /// Replace the projection with the given (possibly qualified) columns.
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.columns = columns.iter().map(|c| self.dialect.quote_column(c)).collect();
        self
    }

    /// Append a raw expression to the projection.
    pub fn add_select(&mut self, expr: impl Into<String>) -> &mut Self {
        self.columns.push(expr.into());
        self
    }

    pub fn left_join(&mut self, table: &str, first: &str, second: &str) -> &mut Self {
        let d = self.dialect;
        self.joins.push(format!(
            "LEFT JOIN {} ON {} = {}",
            d.quote_identifier(table),
            d.quote_column(first),
            d.quote_column(second)
        ));
        self
    }

    /// LEFT JOIN with an extra `AND <column> = ?` condition.
    pub fn left_join_where(
        &mut self,
        table: &str,
        first: &str,
        second: &str,
        column: &str,
        value: BindValue,
    ) -> &mut Self {
        let d = self.dialect;
        self.joins.push(format!(
            "LEFT JOIN {} ON {} = {} AND {} = ?",
            d.quote_identifier(table),
            d.quote_column(first),
            d.quote_column(second),
            d.quote_column(column)
        ));
        self.add_binding(value, Clause::Join)
    }

    pub fn where_eq(&mut self, column: &str, value: BindValue) -> &mut Self {
        self.wheres.push(format!("{} = ?", self.dialect.quote_column(column)));
        self.add_binding(value, Clause::Where)
    }

    /// `<column> IN (?, ?, ...)`; an empty list matches nothing.
    pub fn where_in(&mut self, column: &str, values: Vec<BindValue>) -> &mut Self {
        if values.is_empty() {
            self.wheres.push("1 = 0".to_string());
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.wheres.push(format!("{} IN ({})", self.dialect.quote_column(column), marks));
        for v in values {
            self.add_binding(v, Clause::Where);
        }
        self
    }

    pub fn where_raw(&mut self, sql: impl Into<String>, bindings: Vec<BindValue>) -> &mut Self {
        self.wheres.push(sql.into());
        for v in bindings {
            self.add_binding(v, Clause::Where);
        }
        self
    }

    /// Add a GROUP BY column; duplicates are ignored.
    pub fn group_by(&mut self, column: &str) -> &mut Self {
        let quoted = self.dialect.quote_column(column);
        if !self.groups.contains(&quoted) {
            self.groups.push(quoted);
        }
        self
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn having_raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.havings.push(sql.into());
        self
    }

    pub fn order_by(&mut self, column: &str, direction: Direction) -> &mut Self {
        self.orders
            .push(format!("{} {}", self.dialect.quote_column(column), direction.as_sql()));
        self
    }

    /// ORDER BY on an unquoted name, e.g. a SELECT-list alias.
    pub fn order_by_raw(&mut self, expr: &str, direction: Direction) -> &mut Self {
        self.orders.push(format!("{} {}", expr, direction.as_sql()));
        self
    }

    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    pub fn clear_limits(&mut self) -> &mut Self {
        self.limit = None;
        self.offset = None;
        self
    }

    pub fn add_binding(&mut self, value: BindValue, clause: Clause) -> &mut Self {
        self.bindings.entry(clause).or_default().push(value);
        self
    }

    /// Append every binding of `other`, clause by clause.
    pub fn merge_bindings(&mut self, other: &SelectQuery) -> &mut Self {
        for (clause, values) in &other.bindings {
            self.bindings.entry(*clause).or_default().extend(values.iter().cloned());
        }
        self
    }

    pub fn bindings_for(&self, clause: Clause) -> &[BindValue] {
        self.bindings.get(&clause).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All bindings in rendering order.
    pub fn bindings(&self) -> Vec<BindValue> {
        self.bindings.values().flatten().cloned().collect()
    }

    /// Read from `(<sql>) AS <alias>` instead of a table. `bindings` become the FROM bindings.
    pub fn from_derived(&mut self, sql: String, alias: &str, bindings: Vec<BindValue>) -> &mut Self {
        self.source = Source::Derived {
            sql,
            alias: alias.to_string(),
        };
        self.bindings.insert(Clause::From, bindings);
        self
    }

    /// `SELECT COUNT(*) AS aggregate` over this query without ordering and limits.
    pub fn count_query(&self) -> SelectQuery {
        let mut inner = self.clone();
        inner.orders.clear();
        inner.bindings.remove(&Clause::Order);
        inner.clear_limits();
        let mut q = SelectQuery::table(self.dialect, "aggregate_table");
        q.add_select("COUNT(*) AS aggregate");
        q.from_derived(inner.to_sql(), "aggregate_table", inner.bindings());
        q
    }

    pub fn to_sql(&self) -> String {
        let d = self.dialect;
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let source = match &self.source {
            Source::Table(t) => d.quote_identifier(t),
            Source::Derived { sql, alias } => format!("({}) AS {}", sql, d.quote_identifier(alias)),
        };
        let mut sql = format!("SELECT {} FROM {}", columns, source);
        for j in &self.joins {
            sql.push(' ');
            sql.push_str(j);
        }
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }
        if !self.havings.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.havings.join(" AND "));
        }
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        sql
    }
}
