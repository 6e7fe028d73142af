//! Predicates and the query-builder contract for relsync.
//!
//! `relsync-query` is the **statement layer** between the association engine
//! and a backing store.
//!
//! # Role In The Architecture
//!
//! - **Expression DSL**: `Expr` builds the equality, membership, negation and
//!   null checks the engine derives from relationship metadata.
//! - **Query scopes**: `Query` and `Join` name the target table, WHERE
//!   filters and inner joins of a statement, and render them as SQL text.
//! - **Store contract**: `QueryBuilder` executes find/count/update/delete/create.
//! - **Reference backend**: `MemoryStore` implements `QueryBuilder` in process.

pub mod builder;
pub mod clause;
pub mod expr;
pub mod memory;

pub use builder::{OnConflict, QueryBuilder, insert_sql};
pub use clause::{Join, Query};
pub use expr::{BinaryOp, Expr, quote_identifier};
pub use memory::{MemoryStore, Operation, Statement};
