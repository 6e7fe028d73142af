//! Error types for relsync operations.
//!
//! `Error` is `Clone`: a poisoned association handle hands the same error back
//! on every later call.

use std::fmt;

/// The primary error type for all relsync operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// The requested association name is not declared on the model.
    UnsupportedRelation(RelationError),
    /// A multi-entity save got a different number of values than sources.
    LengthMismatch {
        /// Number of source entities.
        expected: usize,
        /// Number of supplied values.
        actual: usize,
    },
    /// A value or association field has an incompatible type/shape.
    Type(TypeError),
    /// A primary key needed for a set computation is absent.
    PrimaryKeyRequired {
        /// Table whose key was missing.
        table: &'static str,
    },
    /// The backing store rejected a predicate or mutation.
    Query(QueryError),
    /// Relationship metadata is malformed.
    Schema(SchemaError),
    /// The store call was cancelled.
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct RelationError {
    /// Table of the model the lookup ran against.
    pub model: &'static str,
    /// The association name that was requested.
    pub relation: String,
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub relation: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// Connection lost during the statement
    Disconnected,
    /// Other database error
    Database,
}

#[derive(Debug, Clone)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// A referenced table or column is not declared
    ColumnNotFound,
    /// Kind, references and join table disagree
    Invalid,
    /// A table or column name is not a plain identifier
    Identifier,
}

impl Error {
    /// Build a store failure with the given kind and message.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            sql: None,
            message: message.into(),
        })
    }

    /// Build a malformed-metadata error.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
        })
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Attach the rendered statement to this error.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedRelation(e) => write!(f, "unsupported relations: {}", e),
            Error::LengthMismatch { expected, actual } => write!(
                f,
                "invalid association values, length doesn't match: expected {}, got {}",
                expected, actual
            ),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::PrimaryKeyRequired { table } => {
                write!(f, "primary key required for table '{}'", table)
            }
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for RelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' on '{}'", self.relation, self.model)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rel) = self.relation {
            write!(
                f,
                "unsupported data type: expected {} for relation '{}', found {}",
                self.expected, rel, self.actual
            )
        } else if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

/// Result type alias for relsync operations.
pub type Result<T> = std::result::Result<T, Error>;
