//! In-process reference backend.
//!
//! `MemoryStore` keeps tables as vectors of rows and evaluates [`Expr`]
//! predicates with SQL three-valued logic. It records every statement it
//! executes and can be told to fail the next call of a given kind, which is
//! what the association tests use to check ordering and poisoning.

use crate::builder::{OnConflict, QueryBuilder, insert_sql};
use crate::clause::Query;
use crate::expr::{BinaryOp, Expr};
use relsync_core::{
    ColumnInfo, Error, FieldInfo, Model, ModelSchema, QueryErrorKind, Result, Row, Value,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Kind of statement executed against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Find,
    Count,
    Update,
    Delete,
    Create,
}

impl Operation {
    /// Whether the statement changes stored rows.
    pub const fn is_mutation(self) -> bool {
        matches!(
            self,
            Operation::Update | Operation::Delete | Operation::Create
        )
    }
}

/// One executed statement.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub operation: Operation,
    pub table: String,
    pub sql: String,
    pub params: Vec<Value>,
    /// Rows returned, counted or affected.
    pub rows: u64,
}

#[derive(Debug)]
struct Table {
    fields: &'static [FieldInfo],
    columns: Arc<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    next_id: i64,
}

impl Table {
    fn new(fields: &'static [FieldInfo]) -> Self {
        let names = fields.iter().map(|f| f.column_name.to_string()).collect();
        Self {
            fields,
            columns: Arc::new(ColumnInfo::new(names)),
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn index_of(&self, table: &str, column: &str) -> Result<usize> {
        self.columns.index_of(column).ok_or_else(|| {
            Error::query(
                QueryErrorKind::NotFound,
                format!("no such column: {}.{}", table, column),
            )
        })
    }

    fn key_indices(&self, target: &[String]) -> Vec<usize> {
        if target.is_empty() {
            self.fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.primary_key)
                .map(|(i, _)| i)
                .collect()
        } else {
            target
                .iter()
                .filter_map(|c| self.columns.index_of(c))
                .collect()
        }
    }
}

/// A table row bound to its table name during evaluation.
#[derive(Clone, Copy)]
struct Bound<'t> {
    name: &'t str,
    table: &'t Table,
    row: &'t [Value],
}

/// In-memory implementation of [`QueryBuilder`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    statements: Vec<Statement>,
    failures: HashMap<Operation, Error>,
}

impl MemoryStore {
    /// Create an empty store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model's table.
    pub fn with_model<M: Model>(self) -> Self {
        self.with_table(ModelSchema::of::<M>())
    }

    /// Register a table by schema (join tables).
    pub fn with_table(mut self, schema: ModelSchema) -> Self {
        self.tables
            .entry(schema.table.to_string())
            .or_insert_with(|| Table::new(schema.fields()));
        self
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&mut self, operation: Operation, error: Error) {
        self.failures.insert(operation, error);
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Number of statements that changed (or tried to change) rows.
    pub fn mutation_count(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| s.operation.is_mutation())
            .count()
    }

    pub fn clear_log(&mut self) {
        self.statements.clear();
    }

    /// All rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|r| Row::with_columns(Arc::clone(&t.columns), r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert a row directly, bypassing the statement log.
    pub fn seed(&mut self, table: &str, row: &[(&str, Value)]) -> Result<()> {
        let t = self.table_mut(table)?;
        let mut values = vec![Value::Null; t.columns.width()];
        for (column, value) in row {
            let idx = t.index_of(table, column)?;
            if let Some(id) = value.as_i64() {
                if t.fields[idx].auto_increment && id >= t.next_id {
                    t.next_id = id + 1;
                }
            }
            values[idx] = value.clone();
        }
        t.rows.push(values);
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| no_such_table(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| no_such_table(name))
    }

    fn take_failure(&mut self, operation: Operation, sql: &str) -> Result<()> {
        match self.failures.remove(&operation) {
            Some(Error::Query(q)) => {
                tracing::debug!(?operation, "Injected store failure");
                Err(Error::Query(q.with_sql(sql)))
            }
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(
        &mut self,
        operation: Operation,
        table: &str,
        sql: String,
        params: Vec<Value>,
        rows: u64,
    ) {
        tracing::trace!(sql = %sql, ?operation, rows, "Executed statement");
        self.statements.push(Statement {
            operation,
            table: table.to_string(),
            sql,
            params,
            rows,
        });
    }

    /// Indices of base-table rows matching the query, one entry per join
    /// combination (so an inner join can repeat a row).
    fn matching(&self, query: &Query) -> Result<Vec<usize>> {
        let base = self.table(&query.table)?;
        let joined: Vec<(&str, &Table)> = query
            .joins
            .iter()
            .map(|j| self.table(&j.table).map(|t| (j.table.as_str(), t)))
            .collect::<Result<_>>()?;
        let predicate = query.where_expr();

        let mut out = Vec::new();
        for (idx, row) in base.rows.iter().enumerate() {
            let mut scopes = vec![vec![Bound {
                name: &query.table,
                table: base,
                row,
            }]];
            for (join, (name, table)) in query.joins.iter().zip(&joined) {
                let on = Expr::all(join.on.iter().cloned());
                let mut next = Vec::new();
                for scope in scopes {
                    for candidate in &table.rows {
                        let mut extended = scope.clone();
                        extended.push(Bound {
                            name: *name,
                            table: *table,
                            row: candidate,
                        });
                        let keep = match &on {
                            Some(on) => eval_predicate(on, &extended)? == Some(true),
                            None => true,
                        };
                        if keep {
                            next.push(extended);
                        }
                    }
                }
                scopes = next;
            }
            for scope in &scopes {
                let keep = match &predicate {
                    Some(p) => eval_predicate(p, scope)? == Some(true),
                    None => true,
                };
                if keep {
                    out.push(idx);
                }
            }
        }
        Ok(out)
    }
}

fn no_such_table(name: &str) -> Error {
    Error::query(QueryErrorKind::NotFound, format!("no such table: {}", name))
}

fn lookup<'s>(scope: &'s [Bound<'s>], table: Option<&str>, column: &str) -> Result<&'s Value> {
    for bound in scope {
        if table.is_some_and(|t| t != bound.name) {
            continue;
        }
        if let Some(idx) = bound.table.columns.index_of(column) {
            return Ok(&bound.row[idx]);
        }
    }
    let name = match table {
        Some(t) => format!("{}.{}", t, column),
        None => column.to_string(),
    };
    Err(Error::query(
        QueryErrorKind::NotFound,
        format!("no such column: {}", name),
    ))
}

fn eval_value(expr: &Expr, scope: &[Bound<'_>]) -> Result<Value> {
    match expr {
        Expr::Column { table, name } => lookup(scope, table.as_deref(), name).cloned(),
        Expr::Literal(v) => Ok(v.clone()),
        other => Ok(match eval_predicate(other, scope)? {
            Some(b) => Value::Bool(b),
            None => Value::Null,
        }),
    }
}

/// `=` between two operands; `None` is SQL UNKNOWN.
fn eval_eq(left: &Expr, right: &Expr, scope: &[Bound<'_>]) -> Result<Option<bool>> {
    if let (Expr::Tuple(ls), Expr::Tuple(rs)) = (left, right) {
        if ls.len() != rs.len() {
            return Err(Error::query(
                QueryErrorKind::Database,
                "row value misused: tuple sizes differ",
            ));
        }
        let mut result = Some(true);
        for (l, r) in ls.iter().zip(rs) {
            result = and3(result, eval_eq(l, r, scope)?);
        }
        return Ok(result);
    }
    let l = eval_value(left, scope)?;
    let r = eval_value(right, scope)?;
    if l.is_null() || r.is_null() {
        Ok(None)
    } else {
        Ok(Some(l.sql_eq(&r)))
    }
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn eval_predicate(expr: &Expr, scope: &[Bound<'_>]) -> Result<Option<bool>> {
    match expr {
        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => Ok(and3(
                eval_predicate(left, scope)?,
                eval_predicate(right, scope)?,
            )),
            BinaryOp::Or => Ok(or3(
                eval_predicate(left, scope)?,
                eval_predicate(right, scope)?,
            )),
            BinaryOp::Eq => eval_eq(left, right, scope),
            BinaryOp::Ne => Ok(eval_eq(left, right, scope)?.map(|b| !b)),
        },
        Expr::Not(inner) => Ok(eval_predicate(inner, scope)?.map(|b| !b)),
        Expr::In {
            expr,
            values,
            negated,
        } => {
            let mut result = Some(false);
            for candidate in values {
                result = or3(result, eval_eq(expr, candidate, scope)?);
                if result == Some(true) {
                    break;
                }
            }
            Ok(if *negated { result.map(|b| !b) } else { result })
        }
        Expr::IsNull { expr, negated } => {
            let is_null = eval_value(expr, scope)?.is_null();
            Ok(Some(is_null != *negated))
        }
        Expr::Column { .. } | Expr::Literal(_) => match eval_value(expr, scope)? {
            Value::Null => Ok(None),
            v => v.as_bool().map(Some).ok_or_else(|| {
                Error::query(
                    QueryErrorKind::Database,
                    format!("{} used as a condition", v.type_name()),
                )
            }),
        },
        Expr::Tuple(_) => Err(Error::query(
            QueryErrorKind::Database,
            "row value used as a condition",
        )),
    }
}

impl QueryBuilder for MemoryStore {
    fn find(&mut self, query: &Query) -> Result<Vec<Row>> {
        let (sql, params) = query.select_sql();
        self.take_failure(Operation::Find, &sql)?;
        let indices = self.matching(query)?;
        let table = self.table(&query.table)?;
        let rows: Vec<Row> = indices
            .iter()
            .map(|&i| Row::with_columns(Arc::clone(&table.columns), table.rows[i].clone()))
            .collect();
        self.record(Operation::Find, &query.table, sql, params, rows.len() as u64);
        Ok(rows)
    }

    fn count(&mut self, query: &Query) -> Result<i64> {
        let (sql, params) = query.count_sql();
        self.take_failure(Operation::Count, &sql)?;
        let count = self.matching(query)?.len();
        self.record(Operation::Count, &query.table, sql, params, count as u64);
        Ok(count as i64)
    }

    fn update_columns(&mut self, query: &Query, assignments: &[(String, Value)]) -> Result<u64> {
        let (sql, params) = query.update_sql(assignments);
        self.take_failure(Operation::Update, &sql)?;
        let mut indices = self.matching(query)?;
        indices.dedup();
        let table_name = query.table.clone();
        let table = self.table_mut(&table_name)?;
        let targets: Vec<(usize, Value)> = assignments
            .iter()
            .map(|(c, v)| table.index_of(&table_name, c).map(|i| (i, v.clone())))
            .collect::<Result<_>>()?;
        for &row in &indices {
            for (col, value) in &targets {
                table.rows[row][*col] = value.clone();
            }
        }
        let affected = indices.len() as u64;
        self.record(Operation::Update, &table_name, sql, params, affected);
        Ok(affected)
    }

    fn delete(&mut self, query: &Query) -> Result<u64> {
        let (sql, params) = query.delete_sql();
        self.take_failure(Operation::Delete, &sql)?;
        let mut indices = self.matching(query)?;
        indices.dedup();
        let table_name = query.table.clone();
        let table = self.table_mut(&table_name)?;
        for &row in indices.iter().rev() {
            table.rows.remove(row);
        }
        let affected = indices.len() as u64;
        self.record(Operation::Delete, &table_name, sql, params, affected);
        Ok(affected)
    }

    fn create(
        &mut self,
        schema: &ModelSchema,
        row: &[(&'static str, Value)],
        on_conflict: &OnConflict,
    ) -> Result<Vec<(&'static str, Value)>> {
        let (sql, params) = insert_sql(schema, row, on_conflict);
        self.take_failure(Operation::Create, &sql)?;
        let table_name = schema.table;
        let table = self.table_mut(table_name)?;

        let mut values = vec![Value::Null; table.columns.width()];
        for (column, value) in row {
            let idx = table.index_of(table_name, column)?;
            values[idx] = value.clone();
        }

        let target = match on_conflict {
            OnConflict::DoUpdate { target, .. } => target.clone(),
            OnConflict::DoNothing => Vec::new(),
        };
        let keys = table.key_indices(&target);
        let conflict = if keys.is_empty() {
            table.rows.iter().position(|r| {
                r.iter()
                    .zip(&values)
                    .all(|(a, b)| a == b || a.sql_eq(b))
            })
        } else if keys.iter().any(|&k| values[k].is_zero()) {
            None
        } else {
            table
                .rows
                .iter()
                .position(|r| keys.iter().all(|&k| r[k].sql_eq(&values[k])))
        };

        let (generated, affected) = match (conflict, on_conflict) {
            (Some(_), OnConflict::DoNothing) => (Vec::new(), 0),
            (Some(existing), OnConflict::DoUpdate { columns, .. }) => {
                let updates: Vec<usize> = if columns.is_empty() {
                    row.iter()
                        .filter_map(|(c, _)| table.columns.index_of(c))
                        .filter(|i| !table.fields[*i].primary_key)
                        .collect()
                } else {
                    columns
                        .iter()
                        .map(|c| table.index_of(table_name, c))
                        .collect::<Result<_>>()?
                };
                for idx in updates {
                    table.rows[existing][idx] = values[idx].clone();
                }
                (Vec::new(), 1)
            }
            (None, _) => {
                let fields = table.fields;
                let mut generated = Vec::new();
                for (idx, field) in fields.iter().enumerate() {
                    if field.auto_increment && values[idx].is_zero() {
                        let id = table.next_id;
                        table.next_id += 1;
                        values[idx] = Value::BigInt(id);
                        generated.push((field.column_name, Value::BigInt(id)));
                    } else if field.auto_increment {
                        if let Some(id) = values[idx].as_i64() {
                            table.next_id = table.next_id.max(id + 1);
                        }
                    }
                }
                table.rows.push(values);
                (generated, 1)
            }
        };

        self.record(Operation::Create, table_name, sql, params, affected);
        Ok(generated)
    }
}
