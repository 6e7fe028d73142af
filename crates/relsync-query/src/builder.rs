//! The query-builder contract consumed by the association engine.

use crate::clause::Query;
use crate::expr::quote_identifier;
use relsync_core::{ModelSchema, Result, Row, Value};
use serde::{Deserialize, Serialize};

/// ON CONFLICT clause for INSERT statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnConflict {
    /// Do nothing on conflict (INSERT ... ON CONFLICT DO NOTHING)
    DoNothing,
    /// Update specified columns on conflict (INSERT ... ON CONFLICT DO UPDATE SET ...)
    DoUpdate {
        /// The columns to update. If empty, all non-primary-key columns are updated.
        columns: Vec<String>,
        /// The conflict target (column names). If empty, uses primary key.
        target: Vec<String>,
    },
}

impl OnConflict {
    /// Update `columns` when the primary key conflicts.
    pub fn do_update(columns: &[&str]) -> Self {
        OnConflict::DoUpdate {
            columns: columns.iter().map(|s| (*s).to_string()).collect(),
            target: Vec::new(),
        }
    }

    /// Update every non-key column when the primary key conflicts.
    pub fn update_all() -> Self {
        OnConflict::DoUpdate {
            columns: Vec::new(),
            target: Vec::new(),
        }
    }
}

/// Statement execution against a backing store.
///
/// Every call is synchronous and scoped to the table named by the query or
/// schema. Implementations report failures as `Error::Query` (or
/// `Error::Cancelled`); the association engine propagates them unchanged.
pub trait QueryBuilder {
    /// Rows of `query.table` matching the query.
    fn find(&mut self, query: &Query) -> Result<Vec<Row>>;

    /// Number of rows of `query.table` matching the query.
    fn count(&mut self, query: &Query) -> Result<i64>;

    /// Set `assignments` on matching rows; returns rows affected.
    fn update_columns(&mut self, query: &Query, assignments: &[(String, Value)]) -> Result<u64>;

    /// Delete matching rows; returns rows affected.
    fn delete(&mut self, query: &Query) -> Result<u64>;

    /// Insert `row` into `schema.table`.
    ///
    /// Returns the columns the store generated (auto-increment keys). A row
    /// skipped by [`OnConflict::DoNothing`] generates nothing.
    fn create(
        &mut self,
        schema: &ModelSchema,
        row: &[(&'static str, Value)],
        on_conflict: &OnConflict,
    ) -> Result<Vec<(&'static str, Value)>>;
}

impl<Q: QueryBuilder + ?Sized> QueryBuilder for &mut Q {
    fn find(&mut self, query: &Query) -> Result<Vec<Row>> {
        (**self).find(query)
    }

    fn count(&mut self, query: &Query) -> Result<i64> {
        (**self).count(query)
    }

    fn update_columns(&mut self, query: &Query, assignments: &[(String, Value)]) -> Result<u64> {
        (**self).update_columns(query, assignments)
    }

    fn delete(&mut self, query: &Query) -> Result<u64> {
        (**self).delete(query)
    }

    fn create(
        &mut self,
        schema: &ModelSchema,
        row: &[(&'static str, Value)],
        on_conflict: &OnConflict,
    ) -> Result<Vec<(&'static str, Value)>> {
        (**self).create(schema, row, on_conflict)
    }
}

/// Render an INSERT statement with its ON CONFLICT clause.
pub fn insert_sql(
    schema: &ModelSchema,
    row: &[(&'static str, Value)],
    on_conflict: &OnConflict,
) -> (String, Vec<Value>) {
    let columns: Vec<String> = row.iter().map(|(c, _)| quote_identifier(c)).collect();
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("${i}")).collect();
    let params = row.iter().map(|(_, v)| v.clone()).collect();

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(schema.table),
        columns.join(", "),
        placeholders.join(", ")
    );

    match on_conflict {
        OnConflict::DoNothing => sql.push_str(" ON CONFLICT DO NOTHING"),
        OnConflict::DoUpdate { columns, target } => {
            let target: Vec<String> = if target.is_empty() {
                schema.primary_columns().into_iter().map(quote_identifier).collect()
            } else {
                target.iter().map(|c| quote_identifier(c)).collect()
            };
            let updates: Vec<String> = if columns.is_empty() {
                schema
                    .fields()
                    .iter()
                    .filter(|f| !f.primary_key)
                    .map(|f| f.column_name.to_string())
                    .collect()
            } else {
                columns.clone()
            };
            let sets: Vec<String> = updates
                .iter()
                .map(|c| {
                    let q = quote_identifier(c);
                    format!("{q} = EXCLUDED.{q}")
                })
                .collect();
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                target.join(", "),
                sets.join(", ")
            ));
        }
    }

    (sql, params)
}
