//! Core types and traits for relsync.
//!
//! This crate provides the shared contracts of the synchronization engine:
//!
//! - `Value` and `Row` for data flowing to and from the store
//! - `Model`, `FieldAccess` and `AssociationAccess` for entities
//! - `Relationship` metadata describing how two models are linked
//! - identity helpers used to build membership predicates

pub mod error;
pub mod field;
pub mod identity;
pub mod model;
pub mod relationship;
pub mod row;
pub mod value;

pub use error::{
    Error, QueryError, QueryErrorKind, RelationError, Result, SchemaError, SchemaErrorKind,
    TypeError,
};
pub use field::FieldInfo;
pub use identity::{IdentitySet, identity_key, identity_of};
pub use model::{AssociationAccess, FieldAccess, FieldSlot, Model};
pub use relationship::{
    JoinFilter, JoinTable, ModelSchema, Reference, ReferenceSets, Relationship,
    RelationshipKind, check_identifier, find_relationship,
};
pub use row::{ColumnInfo, Row};
pub use value::Value;
