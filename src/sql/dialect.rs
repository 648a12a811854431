//! SQL dialect capabilities: identifier quoting, case-insensitive LIKE, HAVING alias support, bind markers.

use std::fmt;

/// The SQL variant a query is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    /// Anything else (SQLite in practice). Behaves like Postgres for HAVING, like MySQL for LIKE.
    Other,
}

impl Dialect {
    /// Map a driver name (`mysql`, `pgsql`, ...) to a dialect.
    pub fn from_driver_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "mysql" | "mariadb" => Dialect::MySql,
            "pgsql" | "postgres" | "postgresql" => Dialect::Postgres,
            _ => Dialect::Other,
        }
    }

    /// Dialect from a connection URL scheme, e.g. `postgres://...`, `mysql://...`, `sqlite::memory:`.
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or_default();
        Self::from_driver_name(scheme)
    }

    pub fn driver_name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Other => "other",
        }
    }

    pub fn case_insensitive_like_operator(&self) -> &'static str {
        match self {
            Dialect::Postgres => "ILIKE",
            _ => "LIKE",
        }
    }

    /// MySQL lets HAVING refer to a SELECT-list alias; the others need the expression restated.
    pub fn supports_having_alias_reference(&self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// How many times the search bindings must be attached (projection, plus HAVING when restated).
    pub fn binding_duplication_factor(&self) -> usize {
        if self.supports_having_alias_reference() {
            1
        } else {
            2
        }
    }

    /// INSERT/UPDATE/DELETE ... RETURNING support.
    pub fn supports_returning(&self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// Quote a single identifier.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quote a possibly qualified column (`table.column`), segment by segment. `*` is left bare.
    pub fn quote_column(&self, column: &str) -> String {
        column
            .split('.')
            .map(|seg| if seg == "*" { seg.to_string() } else { self.quote_identifier(seg) })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quoted column coerced to text. Postgres has no implicit cast for `LOWER`/`=` on non-text types.
    pub fn column_as_text(&self, column: &str) -> String {
        match self {
            Dialect::Postgres => format!("CAST({} AS TEXT)", self.quote_column(column)),
            _ => self.quote_column(column),
        }
    }

    /// Rewrite `?` markers into the dialect's bind syntax. Only Postgres numbers them (`$1`, `$2`, ...).
    /// Markers inside quoted strings or quoted identifiers are left alone.
    pub fn bind_markers(&self, sql: &str) -> String {
        if !matches!(self, Dialect::Postgres) {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut quote: Option<char> = None;
        let mut n = 0u32;
        for c in sql.chars() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None => match c {
                    '\'' | '"' | '`' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '?' => {
                        n += 1;
                        out.push('$');
                        out.push_str(&n.to_string());
                    }
                    _ => out.push(c),
                },
            }
        }
        out
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names_map_to_dialects() {
        assert_eq!(Dialect::from_driver_name("mysql"), Dialect::MySql);
        assert_eq!(Dialect::from_driver_name("pgsql"), Dialect::Postgres);
        assert_eq!(Dialect::from_driver_name("sqlite"), Dialect::Other);
        assert_eq!(Dialect::from_url("postgres://localhost/db"), Dialect::Postgres);
        assert_eq!(Dialect::from_url("mysql://root@localhost/db"), Dialect::MySql);
        assert_eq!(Dialect::from_url("sqlite::memory:"), Dialect::Other);
    }

    #[test]
    fn capabilities_per_dialect() {
        assert_eq!(Dialect::Postgres.case_insensitive_like_operator(), "ILIKE");
        assert_eq!(Dialect::MySql.case_insensitive_like_operator(), "LIKE");
        assert_eq!(Dialect::Other.case_insensitive_like_operator(), "LIKE");
        assert_eq!(Dialect::MySql.binding_duplication_factor(), 1);
        assert_eq!(Dialect::Postgres.binding_duplication_factor(), 2);
        assert_eq!(Dialect::Other.binding_duplication_factor(), 2);
    }

    #[test]
    fn quotes_qualified_columns() {
        assert_eq!(Dialect::MySql.quote_column("posts.title"), "`posts`.`title`");
        assert_eq!(Dialect::Postgres.quote_column("posts.*"), "\"posts\".*");
        assert_eq!(Dialect::Other.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn only_postgres_casts_columns_to_text() {
        assert_eq!(Dialect::Postgres.column_as_text("posts.id"), "CAST(\"posts\".\"id\" AS TEXT)");
        assert_eq!(Dialect::MySql.column_as_text("posts.id"), "`posts`.`id`");
        assert_eq!(Dialect::Other.column_as_text("id"), "\"id\"");
    }

    #[test]
    fn postgres_markers_are_numbered_outside_quotes() {
        let sql = "SELECT \"a?\" FROM t WHERE x = ? AND y = '?' AND z = ?";
        assert_eq!(
            Dialect::Postgres.bind_markers(sql),
            "SELECT \"a?\" FROM t WHERE x = $1 AND y = '?' AND z = $2"
        );
        assert_eq!(Dialect::MySql.bind_markers(sql), sql);
    }
}
