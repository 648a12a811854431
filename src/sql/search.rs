//! Relevance-ranked search over configured columns.
//!
//! Every (column, word, tier) triple becomes a `CASE WHEN LOWER(col) LIKE ? THEN weight ELSE 0 END` term.
//! The terms are summed under `MAX(...) AS relevance`, filtered with a HAVING threshold and ordered by
//! relevance. The scored query is then folded back into the caller's query as a derived table named after
//! the target table, so filters and ordering set earlier still apply.

use crate::error::ConfigError;
use crate::sql::{BindValue, Clause, Dialect, Direction, SelectQuery};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Alias of the computed score in the projection.
pub const RELEVANCE_ALIAS: &str = "relevance";

/// Ordered column → weight mapping. Never empty; every weight is finite and positive.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchColumns(Vec<(String, f64)>);

impl SearchColumns {
    pub fn new(columns: Vec<(String, f64)>) -> Result<Self, ConfigError> {
        if columns.is_empty() {
            return Err(ConfigError::Validation("searchable columns must not be empty".into()));
        }
        for (name, weight) in &columns {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(ConfigError::InvalidSearchWeight {
                    column: name.clone(),
                    weight: *weight,
                });
            }
        }
        Ok(SearchColumns(columns))
    }

    /// Every column at weight 1, used when only a column listing is available.
    pub fn uniform<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(|n| (n.into(), 1.0)).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(c, w)| (c.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.0.iter().map(|(_, w)| w).sum()
    }
}

// Deserialized from a JSON object, keeping document order.
impl<'de> Deserialize<'de> for SearchColumns {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ColumnsVisitor;

        impl<'de> Visitor<'de> for ColumnsVisitor {
            type Value = Vec<(String, f64)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping column names to positive weights")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((column, weight)) = map.next_entry::<String, f64>()? {
                    out.push((column, weight));
                }
                Ok(out)
            }
        }

        let columns = deserializer.deserialize_map(ColumnsVisitor)?;
        SearchColumns::new(columns).map_err(serde::de::Error::custom)
    }
}

/// A table LEFT JOINed while searching, so its columns can be scored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchJoin {
    pub table: String,
    pub first: String,
    pub second: String,
    /// Optional extra join condition `column = value`.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// The table being searched and how its rows are grouped.
#[derive(Clone, Copy, Debug)]
pub struct SearchTarget<'a> {
    pub table: &'a str,
    pub table_prefix: &'a str,
    pub primary_key: &'a str,
    pub columns: &'a SearchColumns,
    /// Replaces the primary-key grouping when set.
    pub group_by: Option<&'a [String]>,
    pub joins: &'a [SearchJoin],
}

impl SearchTarget<'_> {
    pub fn qualified_table(&self) -> String {
        format!("{}{}", self.table_prefix, self.table)
    }

    /// Prefix the table segment of a `table.column` reference. Bare columns are left as is.
    pub fn qualify(&self, reference: &str) -> String {
        match reference.split_once('.') {
            Some((table, column)) => format!("{}{}.{}", self.table_prefix, table, column),
            None => reference.to_string(),
        }
    }
}

/// Caller input for one search.
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    pub text: String,
    pub threshold: Option<f64>,
    pub entire_text: bool,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        SearchRequest {
            text: text.into(),
            threshold: None,
            entire_text: false,
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn entire_text(mut self, entire_text: bool) -> Self {
        self.entire_text = entire_text;
        self
    }
}

/// Match strength of a scored comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// Bare token, relying on LIKE itself.
    Exact,
    /// `token%`.
    Prefix,
    /// `%token%`.
    Fuzzy,
    /// The whole normalized search string.
    EntireText,
}

impl Tier {
    pub const PER_WORD: [Tier; 3] = [Tier::Exact, Tier::Prefix, Tier::Fuzzy];

    pub fn multiplier(&self) -> f64 {
        match self {
            Tier::Exact => 15.0,
            Tier::Prefix => 5.0,
            Tier::Fuzzy => 1.0,
            Tier::EntireText => 30.0,
        }
    }

    pub fn pattern(&self, word: &str) -> String {
        match self {
            Tier::Exact | Tier::EntireText => word.to_string(),
            Tier::Prefix => format!("{}%", word),
            Tier::Fuzzy => format!("%{}%", word),
        }
    }
}

/// One scored comparison and the value bound to its placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredExpression {
    pub column: String,
    pub tier: Tier,
    pub weight: f64,
    pub binding: String,
}

impl ScoredExpression {
    pub fn to_sql(&self, dialect: Dialect) -> String {
        format!(
            "(CASE WHEN LOWER({}) {} ? THEN {} ELSE 0 END)",
            dialect.column_as_text(&self.column),
            dialect.case_insensitive_like_operator(),
            self.weight
        )
    }
}

/// Per-invocation search input after normalization.
#[derive(Clone, Debug)]
pub struct SearchSpec {
    pub columns: SearchColumns,
    /// Lower-cased, trimmed search text.
    pub text: String,
    pub words: Vec<String>,
    pub threshold: f64,
    pub entire_text: bool,
}

impl SearchSpec {
    pub fn new(columns: SearchColumns, request: &SearchRequest) -> Self {
        let text = request.text.trim().to_lowercase();
        // No collapsing: consecutive separators yield empty words.
        let words = text.split(char::is_whitespace).map(str::to_string).collect();
        let threshold = request.threshold.unwrap_or_else(|| columns.total_weight() / 4.0);
        SearchSpec {
            columns,
            text,
            words,
            threshold,
            entire_text: request.entire_text,
        }
    }

    /// Scored comparisons in emission order: per column, each tier across all words, then the entire-text term.
    pub fn expressions(&self) -> Vec<ScoredExpression> {
        let mut out = Vec::new();
        for (column, weight) in self.columns.iter() {
            for tier in Tier::PER_WORD {
                for word in &self.words {
                    out.push(ScoredExpression {
                        column: column.to_string(),
                        tier,
                        weight: weight * tier.multiplier(),
                        binding: tier.pattern(word),
                    });
                }
            }
            if self.entire_text {
                out.push(ScoredExpression {
                    column: column.to_string(),
                    tier: Tier::EntireText,
                    weight: weight * Tier::EntireText.multiplier(),
                    binding: Tier::EntireText.pattern(&self.text),
                });
            }
        }
        out
    }
}

/// Output of [`SearchCompiler::compile`]: the scored query, its SQL and bindings.
#[derive(Clone, Debug)]
pub struct CompiledSearch {
    pub query: SelectQuery,
    pub sql: String,
    pub bindings: Vec<BindValue>,
    pub threshold: f64,
    pub terms: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct SearchCompiler {
    dialect: Dialect,
}

impl SearchCompiler {
    pub fn new(dialect: Dialect) -> Self {
        SearchCompiler { dialect }
    }

    /// Build the scored query from a copy of `base`: projection, joins, HAVING threshold, grouping, bindings.
    pub fn compile(&self, base: &SelectQuery, target: &SearchTarget<'_>, spec: &SearchSpec) -> CompiledSearch {
        let d = self.dialect;
        let table = target.qualified_table();
        let mut query = base.clone();
        query.clear_limits();
        let all_columns = format!("{}.*", table);
        query.select(&[all_columns.as_str()]);

        let mut joined = Vec::with_capacity(target.joins.len());
        for join in target.joins {
            let join_table = format!("{}{}", target.table_prefix, join.table);
            let (first, second) = (target.qualify(&join.first), target.qualify(&join.second));
            match (&join.column, &join.value) {
                (Some(column), Some(value)) => {
                    let column = target.qualify(column);
                    query.left_join_where(&join_table, &first, &second, &column, BindValue::from_json(value));
                }
                _ => {
                    query.left_join(&join_table, &first, &second);
                }
            }
            joined.push(join_table);
        }

        let mut expressions = spec.expressions();
        for e in &mut expressions {
            e.column = target.qualify(&e.column);
        }
        let sum = expressions
            .iter()
            .map(|e| e.to_sql(d))
            .collect::<Vec<_>>()
            .join(" + ");
        query.add_select(format!("MAX({}) AS {}", sum, RELEVANCE_ALIAS));

        let comparator = if d.supports_having_alias_reference() {
            RELEVANCE_ALIAS.to_string()
        } else {
            sum
        };
        query.having_raw(format!("{} > {:.2}", comparator, spec.threshold));
        query.order_by_raw(RELEVANCE_ALIAS, Direction::Desc);

        match target.group_by {
            Some(columns) if !columns.is_empty() => {
                for column in columns {
                    query.group_by(&target.qualify(column));
                }
            }
            _ => {
                query.group_by(&format!("{}.{}", table, target.primary_key));
            }
        }
        // Joined columns are not functionally dependent on the primary key once the join fans out.
        for (column, _) in spec.columns.iter() {
            let column = target.qualify(column);
            if joined.iter().any(|t| column.contains(t.as_str())) {
                query.group_by(&column);
            }
        }

        let clauses = [Clause::Select, Clause::Having];
        for clause in clauses.iter().take(d.binding_duplication_factor()) {
            for e in &expressions {
                query.add_binding(BindValue::String(e.binding.clone()), *clause);
            }
        }

        tracing::trace!(
            dialect = %d,
            terms = expressions.len(),
            threshold = spec.threshold,
            "compiled relevance search"
        );
        CompiledSearch {
            sql: query.to_sql(),
            bindings: query.bindings(),
            query,
            threshold: spec.threshold,
            terms: expressions.len(),
        }
    }

    /// Compile and substitute the scored query as the FROM source of `base`.
    /// The scored query's bindings come first, then `base`'s own, in their original order.
    pub fn apply(&self, base: &SelectQuery, target: &SearchTarget<'_>, spec: &SearchSpec) -> SelectQuery {
        let compiled = self.compile(base, target, spec);
        let mut merged = base.clone();
        merged.from_derived(compiled.sql, &target.qualified_table(), compiled.bindings);
        if !merged.has_orders() {
            merged.order_by_raw(RELEVANCE_ALIAS, Direction::Desc);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_body() -> SearchColumns {
        SearchColumns::new(vec![("title".into(), 2.0), ("body".into(), 1.0)]).unwrap()
    }

    fn target<'a>(columns: &'a SearchColumns, joins: &'a [SearchJoin]) -> SearchTarget<'a> {
        SearchTarget {
            table: "posts",
            table_prefix: "",
            primary_key: "id",
            columns,
            group_by: None,
            joins,
        }
    }

    fn texts(bindings: &[BindValue]) -> Vec<String> {
        bindings.iter().filter_map(|b| b.as_text()).collect()
    }

    #[test]
    fn mysql_scenario_uses_alias_in_having() {
        let cols = title_body();
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("Cat"));
        let base = SelectQuery::table(Dialect::MySql, "posts");
        let compiled = SearchCompiler::new(Dialect::MySql).compile(&base, &target(&cols, &[]), &spec);

        assert_eq!(compiled.terms, 6);
        assert_eq!(compiled.threshold, 0.75);
        assert_eq!(compiled.sql.matches("CASE WHEN").count(), 6);
        assert!(compiled.sql.contains("HAVING relevance > 0.75"));
        assert!(compiled.sql.contains(") AS relevance"));
        assert!(compiled.sql.contains("GROUP BY `posts`.`id`"));
        assert!(compiled.sql.ends_with("ORDER BY relevance DESC"));
        assert!(compiled
            .sql
            .starts_with("SELECT `posts`.*, MAX((CASE WHEN LOWER(`title`) LIKE ? THEN 30 ELSE 0 END) + (CASE WHEN LOWER(`title`) LIKE ? THEN 10 ELSE 0 END)"));
        assert_eq!(
            texts(&compiled.bindings),
            vec!["cat", "cat%", "%cat%", "cat", "cat%", "%cat%"]
        );
    }

    #[test]
    fn postgres_scenario_restates_sum_and_duplicates_bindings() {
        let cols = title_body();
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("cat"));
        let base = SelectQuery::table(Dialect::Postgres, "posts");
        let compiled = SearchCompiler::new(Dialect::Postgres).compile(&base, &target(&cols, &[]), &spec);

        assert_eq!(compiled.sql.matches("ILIKE ?").count(), 12);
        assert!(compiled.sql.contains("LOWER(CAST(\"title\" AS TEXT)) ILIKE ?"));
        assert!(!compiled.sql.contains("HAVING relevance"));
        assert!(compiled.sql.contains("ELSE 0 END) > 0.75"));
        assert_eq!(compiled.bindings.len(), 12);
        assert_eq!(compiled.query.bindings_for(Clause::Select).len(), 6);
        assert_eq!(compiled.query.bindings_for(Clause::Having).len(), 6);
        assert_eq!(compiled.bindings[..6], compiled.bindings[6..]);
    }

    #[test]
    fn entire_text_adds_one_term_per_column() {
        let cols = title_body();
        let request = SearchRequest::new("  Big Cat ").entire_text(true);
        let spec = SearchSpec::new(cols.clone(), &request);
        assert_eq!(spec.words, vec!["big", "cat"]);
        let exprs = spec.expressions();
        // 3 tiers x 2 words + 1 entire-text, per column
        assert_eq!(exprs.len(), 14);
        let whole: Vec<&ScoredExpression> = exprs.iter().filter(|e| e.tier == Tier::EntireText).collect();
        assert_eq!(whole.len(), 2);
        assert_eq!(whole[0].weight, 60.0);
        assert_eq!(whole[0].binding, "big cat");
        assert_eq!(whole[1].weight, 30.0);
        assert_eq!(exprs[6].column, "title");
        assert_eq!(exprs[7].column, "body");
    }

    #[test]
    fn consecutive_separators_keep_empty_words() {
        let spec = SearchSpec::new(title_body(), &SearchRequest::new("a  b"));
        assert_eq!(spec.words, vec!["a", "", "b"]);
        assert_eq!(spec.expressions().len(), 2 * 3 * 3);
    }

    #[test]
    fn score_bound_is_sum_of_tiers() {
        let cols = title_body();
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("one two three").entire_text(true));
        let max: f64 = spec.expressions().iter().map(|e| e.weight).sum();
        let bound: f64 = cols.iter().map(|(_, w)| w * 21.0 * 3.0 + w * 30.0).sum();
        assert!(spec.expressions().iter().all(|e| e.weight >= 0.0));
        assert!(max <= bound);
    }

    #[test]
    fn explicit_threshold_wins() {
        let spec = SearchSpec::new(title_body(), &SearchRequest::new("cat").threshold(3.333));
        assert_eq!(spec.threshold, 3.333);
        let base = SelectQuery::table(Dialect::MySql, "posts");
        let cols = title_body();
        let compiled = SearchCompiler::new(Dialect::MySql).compile(&base, &target(&cols, &[]), &spec);
        assert!(compiled.sql.contains("HAVING relevance > 3.33"));
    }

    #[test]
    fn joined_columns_are_grouped() {
        let cols = SearchColumns::new(vec![("posts.title".into(), 1.0), ("users.name".into(), 1.0)]).unwrap();
        let joins = vec![SearchJoin {
            table: "users".into(),
            first: "posts.user_id".into(),
            second: "users.id".into(),
            column: None,
            value: None,
        }];
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("ann"));
        let base = SelectQuery::table(Dialect::MySql, "posts");
        let compiled = SearchCompiler::new(Dialect::MySql).compile(&base, &target(&cols, &joins), &spec);
        assert!(compiled
            .sql
            .contains("LEFT JOIN `users` ON `posts`.`user_id` = `users`.`id`"));
        assert_eq!(compiled.query.groups(), &["`posts`.`id`", "`users`.`name`"]);
    }

    #[test]
    fn group_by_override_replaces_primary_key() {
        let cols = title_body();
        let group = vec!["posts.slug".to_string()];
        let mut t = target(&cols, &[]);
        t.group_by = Some(&group);
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("cat"));
        let base = SelectQuery::table(Dialect::Postgres, "posts");
        let compiled = SearchCompiler::new(Dialect::Postgres).compile(&base, &t, &spec);
        assert_eq!(compiled.query.groups(), &["\"posts\".\"slug\""]);
    }

    #[test]
    fn join_condition_binding_precedes_having() {
        let cols = SearchColumns::uniform(["tags.name"]).unwrap();
        let joins = vec![SearchJoin {
            table: "tags".into(),
            first: "posts.id".into(),
            second: "tags.post_id".into(),
            column: Some("tags.kind".into()),
            value: Some(serde_json::json!("topic")),
        }];
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("rust"));
        let base = SelectQuery::table(Dialect::Other, "posts");
        let compiled = SearchCompiler::new(Dialect::Other).compile(&base, &target(&cols, &joins), &spec);
        assert_eq!(
            texts(&compiled.bindings),
            vec!["rust", "rust%", "%rust%", "topic", "rust", "rust%", "%rust%"]
        );
    }

    #[test]
    fn merge_keeps_base_bindings_after_search_bindings() {
        let cols = title_body();
        let mut base = SelectQuery::table(Dialect::MySql, "posts");
        base.where_eq("posts.status", "live".into());
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("cat"));
        let merged = SearchCompiler::new(Dialect::MySql).apply(&base, &target(&cols, &[]), &spec);
        let sql = merged.to_sql();

        assert!(sql.starts_with("SELECT * FROM (SELECT `posts`.*, MAX("));
        assert!(sql.ends_with(") AS `posts` WHERE `posts`.`status` = ? ORDER BY relevance DESC"));
        // inner: 6 search bindings + the cloned where; outer: the base where
        assert_eq!(
            texts(&merged.bindings()),
            vec!["cat", "cat%", "%cat%", "cat", "cat%", "%cat%", "live", "live"]
        );
        assert_eq!(merged.bindings().last(), base.bindings().last());
    }

    #[test]
    fn derived_alias_respects_prefix() {
        let cols = title_body();
        let mut t = target(&cols, &[]);
        t.table_prefix = "app_";
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("cat"));
        let base = SelectQuery::table(Dialect::MySql, "app_posts");
        let merged = SearchCompiler::new(Dialect::MySql).apply(&base, &t, &spec);
        let sql = merged.to_sql();
        assert!(sql.contains("SELECT `app_posts`.*"));
        assert!(sql.contains("GROUP BY `app_posts`.`id`"));
        assert!(sql.contains(") AS `app_posts`"));
    }

    #[test]
    fn postgres_scores_non_text_columns_as_text() {
        let cols = SearchColumns::uniform(["id", "title"]).unwrap();
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("7"));
        let base = SelectQuery::table(Dialect::Postgres, "posts");
        let compiled = SearchCompiler::new(Dialect::Postgres).compile(&base, &target(&cols, &[]), &spec);
        assert!(compiled.sql.contains("LOWER(CAST(\"id\" AS TEXT)) ILIKE ?"));
        assert!(!compiled.sql.contains("LOWER(\"id\")"));

        let base = SelectQuery::table(Dialect::MySql, "posts");
        let mysql = SearchCompiler::new(Dialect::MySql).compile(&base, &target(&cols, &[]), &spec);
        assert!(mysql.sql.contains("LOWER(`id`) LIKE ?"));
    }

    #[test]
    fn prefix_applies_to_joins_and_qualified_columns() {
        let cols = SearchColumns::new(vec![("posts.title".into(), 1.0), ("users.name".into(), 1.0)]).unwrap();
        let joins = vec![SearchJoin {
            table: "users".into(),
            first: "posts.user_id".into(),
            second: "users.id".into(),
            column: Some("users.active".into()),
            value: Some(serde_json::json!(true)),
        }];
        let mut t = target(&cols, &joins);
        t.table_prefix = "app_";
        let spec = SearchSpec::new(cols.clone(), &SearchRequest::new("ann"));
        let base = SelectQuery::table(Dialect::MySql, "app_posts");
        let compiled = SearchCompiler::new(Dialect::MySql).compile(&base, &t, &spec);
        assert!(compiled
            .sql
            .contains("LEFT JOIN `app_users` ON `app_posts`.`user_id` = `app_users`.`id` AND `app_users`.`active` = ?"));
        assert!(compiled.sql.contains("LOWER(`app_users`.`name`) LIKE ?"));
        assert!(!compiled.sql.contains("`users`"));
        assert_eq!(compiled.query.groups(), &["`app_posts`.`id`", "`app_users`.`name`"]);
    }

    #[test]
    fn weights_are_validated() {
        assert!(SearchColumns::new(vec![]).is_err());
        assert!(SearchColumns::new(vec![("a".into(), 0.0)]).is_err());
        assert!(SearchColumns::new(vec![("a".into(), -1.0)]).is_err());
        let parsed: SearchColumns = serde_json::from_str(r#"{"title": 2, "body": 1.5}"#).unwrap();
        assert_eq!(parsed.iter().collect::<Vec<_>>(), vec![("title", 2.0), ("body", 1.5)]);
        assert!(serde_json::from_str::<SearchColumns>(r#"{"title": -2}"#).is_err());
    }
}
