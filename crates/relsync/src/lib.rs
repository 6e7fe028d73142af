//! relsync - keep in-memory relationship graphs consistent with a relational store.
//!
//! relsync synchronizes the association fields of model structs with the rows
//! that back them, for four relationship kinds:
//!
//! - **belongs-to**: the source row holds the foreign key
//! - **has-one** / **has-many**: the related rows hold the foreign key
//! - **many-to-many**: a join table holds both sides' keys
//!
//! # Quick Start
//!
//! ```ignore
//! use relsync::prelude::*;
//!
//! impl Model for User {
//!     const TABLE_NAME: &'static str = "users";
//!     const RELATIONSHIPS: &'static [Relationship] = &[Relationship::has_many::<User, Pet>(
//!         "pets",
//!         &[Reference::owned("id", "user_id")],
//!     )];
//!     // fields(), to_row(), from_row() ...
//! }
//!
//! let mut session = Session::new(MemoryStore::new().with_model::<User>().with_model::<Pet>());
//! let mut user = User::new("jinzhu");
//!
//! // Insert the user and two pets, linking them.
//! let mut pets = vec![Pet::new("rex"), Pet::new("tom")];
//! session.association::<User, Pet>(&mut user, "pets")?.append(&mut pets)?;
//!
//! // Keep only "tom": "rex" has its user_id set to NULL.
//! let mut keep = vec![pets[1].clone()];
//! let mut pets_of = session.association::<User, Pet>(&mut user, "pets")?;
//! pets_of.replace(&mut keep)?;
//! assert_eq!(pets_of.count()?, 1);
//! ```
//!
//! # Crates
//!
//! - `relsync-core`: values, rows, model traits, relationship metadata, errors
//! - `relsync-query`: predicate expressions, the `QueryBuilder` store contract
//!   and the in-memory `MemoryStore`
//! - `relsync-session`: `Session` and the association engine

pub use relsync_core::{
    AssociationAccess, ColumnInfo, Error, FieldAccess, FieldInfo, FieldSlot, IdentitySet,
    JoinFilter, JoinTable, Model, ModelSchema, QueryError, QueryErrorKind, Reference,
    RelationError, Relationship, RelationshipKind, Result, Row, SchemaError, SchemaErrorKind,
    TypeError, Value, find_relationship,
};
pub use relsync_query::{
    BinaryOp, Expr, Join, MemoryStore, OnConflict, Operation, Query, QueryBuilder, Statement,
};
pub use relsync_session::{Association, HandleState, Session, SessionConfig, SyncStrategy};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        // Model traits and metadata
        AssociationAccess,
        // Session
        Association,
        Error,
        // Query building
        Expr,
        FieldAccess,
        FieldInfo,
        FieldSlot,
        JoinFilter,
        JoinTable,
        MemoryStore,
        Model,
        QueryBuilder,
        Reference,
        Relationship,
        Result,
        Row,
        Session,
        SessionConfig,
        Value,
    };
}
