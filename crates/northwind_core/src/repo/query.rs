//! Lazy entity query descriptors.
//!
//! # Responsibility
//! - Describe a query as filters + includes + an optional session scope.
//! - Translate the description into parameterized SQL only when loaded.
//!
//! # Invariants
//! - Building or composing a query never touches the database.
//! - Every bound value goes through SQL parameters; identifiers come only
//!   from static metadata.
//! - Session scope is ignored for entities without a session column.

use crate::model::meta::{EntityMeta, SESSION_COLUMN};
use crate::model::session::UserSessionId;
use crate::repo::RepoResult;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::marker::PhantomData;

/// Table-level description of where a queryable shape is read from.
#[derive(Debug, Clone)]
pub struct QuerySource {
    pub table: &'static str,
    pub select_list: String,
    pub session_scoped: bool,
    pub order_by: String,
}

impl From<&EntityMeta> for QuerySource {
    fn from(meta: &EntityMeta) -> Self {
        Self {
            table: meta.table,
            select_list: meta.select_list(),
            session_scoped: meta.session_scoped,
            order_by: meta.keys.join(", "),
        }
    }
}

/// A shape that can be materialized from query rows.
pub trait Queryable: Sized {
    fn source() -> QuerySource;

    fn from_row(row: &Row<'_>) -> RepoResult<Self>;

    /// Loads related rows requested by `includes` into `rows`.
    ///
    /// Shapes without navigations reject every include.
    fn load_includes(
        _rows: &mut [Self],
        includes: &[Include],
        _scope: Option<UserSessionId>,
        _conn: &Connection,
    ) -> RepoResult<()> {
        match includes.first() {
            Some(include) => Err(super::RepoError::UnsupportedInclude {
                table: Self::source().table,
                include: *include,
            }),
            None => Ok(()),
        }
    }
}

/// Row predicate appended to a query's `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`.
    Eq { column: &'static str, value: Value },
    /// `column IN (values)`; an empty list matches nothing.
    In {
        column: &'static str,
        values: Vec<Value>,
    },
    /// Ordinal, case-sensitive prefix match.
    StartsWith {
        column: &'static str,
        prefix: String,
    },
    /// Non-null date column whose calendar year equals `year`.
    InYear { column: &'static str, year: i32 },
    /// Order has at least one visible detail line for the product.
    HasOrderDetailForProduct(i64),
}

impl Filter {
    fn push_sql(&self, scope: Option<UserSessionId>, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Self::Eq { column, value } => {
                sql.push_str(&format!(" AND {column} = ?"));
                binds.push(value.clone());
            }
            Self::In { column, values } => {
                if values.is_empty() {
                    sql.push_str(" AND 0 = 1");
                    return;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!(" AND {column} IN ({placeholders})"));
                binds.extend(values.iter().cloned());
            }
            Self::StartsWith { column, prefix } => {
                sql.push_str(&format!(" AND instr({column}, ?) = 1"));
                binds.push(Value::Text(prefix.clone()));
            }
            Self::InYear { column, year } => {
                sql.push_str(&format!(
                    " AND {column} IS NOT NULL AND CAST(strftime('%Y', {column}) AS INTEGER) = ?"
                ));
                binds.push(Value::Integer(i64::from(*year)));
            }
            Self::HasOrderDetailForProduct(product_id) => {
                sql.push_str(
                    " AND EXISTS (
                        SELECT 1
                        FROM order_details od
                        WHERE od.order_id = orders.order_id
                          AND od.product_id = ?",
                );
                binds.push(Value::Integer(*product_id));
                if let Some(session) = scope {
                    sql.push_str(" AND (od.user_session_id IS NULL OR od.user_session_id = ?)");
                    binds.push(Value::Text(session.to_db()));
                }
                sql.push(')');
            }
        }
    }
}

/// Related rows to load alongside the primary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Include {
    /// Customer -> all visible orders.
    Orders,
    /// Customer -> visible orders dated in the given calendar year.
    OrdersInYear(i32),
    /// Order -> its visible customer.
    Customer,
    /// Order -> its visible detail lines.
    OrderDetails,
}

/// Composable, unexecuted query over one queryable shape.
#[derive(Debug, Clone)]
pub struct EntityQuery<T> {
    scope: Option<UserSessionId>,
    filters: Vec<Filter>,
    includes: Vec<Include>,
    _shape: PhantomData<fn() -> T>,
}

impl<T: Queryable> Default for EntityQuery<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Queryable> EntityQuery<T> {
    /// Unfiltered query over the whole collection.
    pub fn new() -> Self {
        Self {
            scope: None,
            filters: Vec::new(),
            includes: Vec::new(),
            _shape: PhantomData,
        }
    }

    /// Restricts rows (and included rows) to those visible to `session`.
    pub fn visible_to(self, session: UserSessionId) -> Self {
        self.with_scope(Some(session))
    }

    pub(crate) fn with_scope(mut self, scope: Option<UserSessionId>) -> Self {
        self.scope = if T::source().session_scoped {
            scope
        } else {
            None
        };
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.includes.push(include);
        self
    }

    pub fn scope(&self) -> Option<UserSessionId> {
        self.scope
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    /// Renders the select statement and its bind values.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let source = T::source();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            source.select_list, source.table
        );
        let mut binds = Vec::new();

        if let Some(session) = self.scope {
            sql.push_str(&format!(
                " AND ({0}.{1} IS NULL OR {0}.{1} = ?)",
                source.table, SESSION_COLUMN
            ));
            binds.push(Value::Text(session.to_db()));
        }

        for filter in &self.filters {
            filter.push_sql(self.scope, &mut sql, &mut binds);
        }

        sql.push_str(&format!(" ORDER BY {}", source.order_by));
        (sql, binds)
    }

    /// Executes the query and loads requested includes.
    pub fn load(&self, conn: &Connection) -> RepoResult<Vec<T>> {
        let (sql, binds) = self.to_sql();
        let mut rows = self.query_rows(conn, &sql, binds)?;
        if !self.includes.is_empty() && !rows.is_empty() {
            T::load_includes(&mut rows, &self.includes, self.scope, conn)?;
        }
        Ok(rows)
    }

    /// Executes the query and returns its first row, if any.
    pub fn first(&self, conn: &Connection) -> RepoResult<Option<T>> {
        let (mut sql, binds) = self.to_sql();
        sql.push_str(" LIMIT 1");
        let mut rows = self.query_rows(conn, &sql, binds)?;
        if !self.includes.is_empty() && !rows.is_empty() {
            T::load_includes(&mut rows, &self.includes, self.scope, conn)?;
        }
        Ok(rows.pop())
    }

    /// Counts matching rows without materializing them.
    pub fn count(&self, conn: &Connection) -> RepoResult<u64> {
        let (sql, binds) = self.to_sql();
        let count_sql = format!("SELECT COUNT(*) FROM ({sql})");
        let count: i64 = conn.query_row(&count_sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn query_rows(&self, conn: &Connection, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(T::from_row(row)?);
        }
        Ok(items)
    }
}
