//! Query scopes: target table, WHERE filters and inner joins.

use crate::expr::{Expr, quote_identifier};
use relsync_core::Value;

/// An INNER JOIN against another table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Table to join
    pub table: String,
    /// ON conditions, ANDed
    pub on: Vec<Expr>,
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Vec<Expr>) -> Self {
        Self {
            table: table.into(),
            on,
        }
    }
}

/// The rows a statement operates on.
///
/// Filters are ANDed. A query with no filters targets the whole table, so the
/// association engine always supplies at least one membership predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Target table
    pub table: String,
    /// WHERE conditions, ANDed
    pub filters: Vec<Expr>,
    /// Inner joins, in order
    pub joins: Vec<Join>,
}

impl Query {
    /// Create a query over `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            joins: Vec::new(),
        }
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    /// Add several WHERE conditions.
    pub fn filters(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.filters.extend(exprs);
        self
    }

    /// Add an INNER JOIN.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// The combined WHERE predicate.
    pub fn where_expr(&self) -> Option<Expr> {
        Expr::all(self.filters.iter().cloned())
    }

    /// Render `SELECT "table".* ...`.
    pub fn select_sql(&self) -> (String, Vec<Value>) {
        let table = quote_identifier(&self.table);
        self.render(format!("SELECT {table}.* FROM {table}"), Vec::new())
    }

    /// Render `SELECT COUNT(*) ...`.
    pub fn count_sql(&self) -> (String, Vec<Value>) {
        let head = format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.table));
        self.render(head, Vec::new())
    }

    /// Render `UPDATE ... SET ...`.
    pub fn update_sql(&self, assignments: &[(String, Value)]) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sets: Vec<String> = assignments
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{} = ${}", quote_identifier(column), params.len())
            })
            .collect();
        let head = format!(
            "UPDATE {} SET {}",
            quote_identifier(&self.table),
            sets.join(", ")
        );
        self.render(head, params)
    }

    /// Render `DELETE FROM ...`.
    pub fn delete_sql(&self) -> (String, Vec<Value>) {
        let head = format!("DELETE FROM {}", quote_identifier(&self.table));
        self.render(head, Vec::new())
    }

    fn render(&self, mut sql: String, mut params: Vec<Value>) -> (String, Vec<Value>) {
        for join in &self.joins {
            sql.push_str(" INNER JOIN ");
            sql.push_str(&quote_identifier(&join.table));
            if let Some(on) = Expr::all(join.on.iter().cloned()) {
                sql.push_str(" ON ");
                sql.push_str(&on.build(&mut params, 0));
            }
        }
        if let Some(predicate) = self.where_expr() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.build(&mut params, 0));
        }
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_join() {
        let query = Query::new("languages")
            .join(Join::inner(
                "user_languages",
                vec![
                    Expr::qualified("user_languages", "language_code")
                        .eq(Expr::qualified("languages", "code")),
                    Expr::qualified("user_languages", "user_id").in_list(vec![Value::BigInt(1)]),
                ],
            ))
            .filter(Expr::qualified("user_languages", "deleted_at").is_null());
        let (sql, params) = query.select_sql();
        assert_eq!(
            sql,
            "SELECT \"languages\".* FROM \"languages\" INNER JOIN \"user_languages\" ON \
             \"user_languages\".\"language_code\" = \"languages\".\"code\" AND \
             \"user_languages\".\"user_id\" IN ($1) WHERE \"user_languages\".\"deleted_at\" IS NULL"
        );
        assert_eq!(params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn test_update_numbers_assignments_first() {
        let query =
            Query::new("pets").filter(Expr::qualified("pets", "user_id").in_list(vec![7_i64]));
        let (sql, params) = query.update_sql(&[("user_id".to_string(), Value::Null)]);
        assert_eq!(
            sql,
            "UPDATE \"pets\" SET \"user_id\" = $1 WHERE \"pets\".\"user_id\" IN ($2)"
        );
        assert_eq!(params, vec![Value::Null, Value::BigInt(7)]);
    }

    #[test]
    fn test_count_and_delete() {
        let query = Query::new("pets");
        assert_eq!(query.count_sql().0, "SELECT COUNT(*) FROM \"pets\"");
        assert_eq!(query.delete_sql().0, "DELETE FROM \"pets\"");
        assert!(query.where_expr().is_none());
    }
}
