//! Predicate expressions.
//!
//! `Expr` is what the association engine hands to a [`QueryBuilder`]: column
//! references, literals, comparisons, membership tests and their negation.
//! Expressions render to parameterized SQL for logging and for backends that
//! execute SQL text; [`MemoryStore`] evaluates them directly.
//!
//! [`QueryBuilder`]: crate::QueryBuilder
//! [`MemoryStore`]: crate::MemoryStore

use relsync_core::{JoinFilter, Value};

/// A SQL predicate or operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value
    Literal(Value),

    /// Row value `(a, b)` used by composite-key membership
    Tuple(Vec<Expr>),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// IN expression. An empty list never matches (always matches when negated).
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Get the precedence of this operator (higher = binds tighter).
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create an unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a table-qualified column reference.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Create a literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a row value.
    pub fn tuple(items: Vec<Expr>) -> Self {
        Expr::Tuple(items)
    }

    /// Membership of `columns` of `table` in `tuples`.
    ///
    /// One column gives `col IN (..)`, several give `(a, b) IN ((..), (..))`.
    /// No tuples gives a membership that never matches.
    pub fn membership(table: &str, columns: &[&str], tuples: Vec<Vec<Value>>) -> Self {
        if let [column] = columns {
            let values = tuples
                .into_iter()
                .filter_map(|t| t.into_iter().next())
                .map(Expr::Literal)
                .collect();
            return Expr::In {
                expr: Box::new(Expr::qualified(table, *column)),
                values,
                negated: false,
            };
        }
        let target = columns.iter().map(|c| Expr::qualified(table, *c)).collect();
        let values = tuples
            .into_iter()
            .map(|t| Expr::Tuple(t.into_iter().map(Expr::Literal).collect()))
            .collect();
        Expr::In {
            expr: Box::new(Expr::Tuple(target)),
            values,
            negated: false,
        }
    }

    /// Predicate for a join-table default filter.
    pub fn from_join_filter(table: &str, filter: &JoinFilter) -> Self {
        let column = Expr::qualified(table, filter.column());
        match filter {
            JoinFilter::IsNull(_) => column.is_null(),
            JoinFilter::IsNotNull(_) => column.is_not_null(),
            JoinFilter::Equals(_, value) => column.eq(*value),
            JoinFilter::EqualsInt(_, value) => column.eq(*value),
        }
    }

    /// AND together a list of predicates. `None` when the list is empty.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        exprs.into_iter().reduce(|acc, e| acc.and(e))
    }

    // ==================== Comparison Operators ====================

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other.into())
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other.into())
    }

    // ==================== Logical Operators ====================

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other.into())
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other.into())
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    // ==================== Null Checks ====================

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    // ==================== IN Expressions ====================

    /// IN list of values
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// NOT IN list of values
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    // ==================== SQL Rendering ====================

    /// Build SQL string and collect parameters.
    ///
    /// Placeholders are numbered `$n` starting after `offset`.
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        match self {
            Expr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", quote_identifier(t), quote_identifier(name)),
                None => quote_identifier(name),
            },

            Expr::Literal(value) => {
                params.push(value.clone());
                format!("${}", offset + params.len())
            }

            Expr::Tuple(items) => {
                let parts: Vec<_> = items.iter().map(|e| e.build(params, offset)).collect();
                format!("({})", parts.join(", "))
            }

            Expr::Binary { left, op, right } => {
                let left_sql = build_operand(left, *op, params, offset);
                let right_sql = build_operand(right, *op, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::Not(expr) => format!("NOT ({})", expr.build(params, offset)),

            Expr::In {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let expr_sql = expr.build(params, offset);
                let value_sqls: Vec<_> = values.iter().map(|v| v.build(params, offset)).collect();
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build(params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }
        }
    }
}

fn build_operand(expr: &Expr, parent: BinaryOp, params: &mut Vec<Value>, offset: usize) -> String {
    let sql = expr.build(params, offset);
    match expr {
        Expr::Binary { op, .. } if op.precedence() < parent.precedence() => format!("({sql})"),
        _ => sql,
    }
}

/// Quote an identifier with double quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// Conversion from Value to Expr
impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    fn render(expr: &Expr) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        (sql, params)
    }

    #[test]
    fn test_column_qualified() {
        let (sql, params) = render(&Expr::qualified("users", "name"));
        assert_eq!(sql, "\"users\".\"name\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_eq_and_precedence() {
        let expr = Expr::col("a")
            .eq(1)
            .or(Expr::col("b").eq(2))
            .and(Expr::col("c").is_null());
        let (sql, params) = render(&expr);
        assert_eq!(sql, "(\"a\" = $1 OR \"b\" = $2) AND \"c\" IS NULL");
        assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_single_column_membership() {
        let expr = Expr::membership(
            "pets",
            &["user_id"],
            vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]],
        );
        let (sql, params) = render(&expr);
        assert_eq!(sql, "\"pets\".\"user_id\" IN ($1, $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_composite_membership() {
        let expr = Expr::membership(
            "user_languages",
            &["user_id", "language_code"],
            vec![vec![Value::BigInt(1), Value::from("en")]],
        );
        let (sql, _) = render(&expr);
        assert_eq!(
            sql,
            "(\"user_languages\".\"user_id\", \"user_languages\".\"language_code\") IN (($1, $2))"
        );
    }

    #[test]
    fn test_empty_membership_never_matches() {
        let expr = Expr::membership("pets", &["user_id"], Vec::new());
        assert_eq!(render(&expr).0, "1 = 0");
        let negated = Expr::col("id").not_in_list(Vec::<Expr>::new());
        assert_eq!(render(&negated).0, "1 = 1");
    }

    #[test]
    fn test_join_filters() {
        let expr = Expr::from_join_filter("user_languages", &JoinFilter::IsNull("deleted_at"));
        assert_eq!(render(&expr).0, "\"user_languages\".\"deleted_at\" IS NULL");
        let expr = Expr::from_join_filter("user_languages", &JoinFilter::EqualsInt("active", 1));
        assert_eq!(render(&expr).1, vec![Value::BigInt(1)]);
    }

    #[test]
    fn test_all() {
        assert!(Expr::all(Vec::new()).is_none());
        let expr = Expr::all(vec![Expr::col("a").eq(1), Expr::col("b").ne(2)]).unwrap();
        assert_eq!(render(&expr).0, "\"a\" = $1 AND \"b\" <> $2");
    }
}
