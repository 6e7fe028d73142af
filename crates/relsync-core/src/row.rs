//! Rows handed back by the query builder.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column layout of a table, shared by every row read from it.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    positions: HashMap<String, usize>,
    width: usize,
}

impl ColumnInfo {
    pub fn new(names: Vec<String>) -> Self {
        let width = names.len();
        let positions = names.into_iter().enumerate().map(|(i, n)| (n, i)).collect();
        Self { positions, width }
    }

    /// Number of columns in the layout.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// One stored row: values in column order plus the shared layout.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(column_names)), values)
    }

    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Read column `name` converted to `T`.
    ///
    /// A missing column and a failed conversion are both `Error::Type`
    /// naming the column.
    pub fn get_named<T>(&self, name: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = Error>,
    {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "no such column".to_string(),
                column: Some(name.to_string()),
                relation: None,
            }));
        };
        T::try_from(value.clone()).map_err(|e| match e {
            Error::Type(te) => Error::Type(TypeError {
                column: Some(name.to_string()),
                ..te
            }),
            e => e,
        })
    }
}
