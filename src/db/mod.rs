//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and MySQL. The driver is
//! picked from configuration and hidden behind `DatabasePool`.
//!
//! Repositories write their SQL once in the dialect subset both backends
//! accept and run it through [`with_pool!`], which binds the concrete sqlx
//! pool for the active driver.
//!
//! ```ignore
//! use ruifeng::config::DatabaseConfig;
//! use ruifeng::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod seed;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

use chrono::{DateTime, Utc};

/// Run `$body` with `$conn` bound to the concrete pool of the active driver.
///
/// The body is expanded once per driver, so sqlx infers the database type
/// separately in each arm. Must be used inside a function returning
/// `anyhow::Result`.
macro_rules! with_pool {
    ($pool:expr, $conn:ident => $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool
                    .as_sqlite()
                    .ok_or_else(|| anyhow::anyhow!("SQLite pool is not available"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool
                    .as_mysql()
                    .ok_or_else(|| anyhow::anyhow!("MySQL pool is not available"))?;
                $body
            }
        }
    };
}

/// Bind every [`SqlValue`] in order onto a sqlx query.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::db::SqlValue::Text(v) => query.bind(v.clone()),
                $crate::db::SqlValue::Int(v) => query.bind(*v),
                $crate::db::SqlValue::Bool(v) => query.bind(*v),
                $crate::db::SqlValue::Time(v) => query.bind(*v),
            };
        }
        query
    }};
}

pub(crate) use bind_values;
pub(crate) use with_pool;

/// A dynamically bound query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

/// Auto-increment id assigned by an INSERT, for either driver's result type
pub(crate) trait LastInsertId {
    fn last_id(&self) -> i64;
}

impl LastInsertId for sqlx::sqlite::SqliteQueryResult {
    fn last_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl LastInsertId for sqlx::mysql::MySqlQueryResult {
    fn last_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}

/// WHERE clause builder for list queries with optional filters
#[derive(Debug, Default, Clone)]
pub struct SqlFilter {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; every `?` in `clause` must have a matching value.
    pub fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = SqlValue>) {
        self.clauses.push(clause.into());
        self.values.extend(values);
    }

    /// Add a condition without parameters
    pub fn push_clause(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    /// Add `column IN (?, ?, ...)`; an empty list matches nothing.
    pub fn push_in(&mut self, column: &str, ids: &[String]) {
        if ids.is_empty() {
            self.clauses.push("1 = 0".to_string());
            return;
        }
        self.clauses
            .push(format!("{} IN ({})", column, placeholders(ids.len())));
        self.values
            .extend(ids.iter().map(|id| SqlValue::Text(id.clone())));
    }

    /// Render as ` WHERE a AND b`, or an empty string without conditions
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// `?, ?, ?` with `count` placeholders
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Wrap a search term for a substring `LIKE` match.
///
/// Wildcards in the term are not escaped: the two dialects disagree on the
/// `ESCAPE` literal, so `%` and `_` typed by users keep their LIKE meaning.
pub fn like_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_filter_where_sql() {
        let mut filter = SqlFilter::new();
        assert_eq!(filter.where_sql(), "");

        filter.push("a = ?", [SqlValue::Int(1)]);
        filter.push_in("b", &["x".to_string(), "y".to_string()]);

        assert_eq!(filter.where_sql(), " WHERE a = ? AND b IN (?, ?)");
        assert_eq!(filter.values().len(), 3);
    }

    #[test]
    fn test_filter_empty_in_matches_nothing() {
        let mut filter = SqlFilter::new();
        filter.push_in("id", &[]);
        assert_eq!(filter.where_sql(), " WHERE 1 = 0");
        assert!(filter.values().is_empty());
    }

    #[test]
    fn test_like_pattern_wraps_trimmed_term() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("  jay chou "), "%jay chou%");
    }
}
