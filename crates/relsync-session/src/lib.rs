//! Session and association engine for relsync.
//!
//! `relsync-session` is the **synchronization layer**. It binds an in-memory
//! source entity (or slice of entities) to one declared relationship and keeps
//! the association field and the store consistent.
//!
//! # Role In The Architecture
//!
//! - **Association handle**: `find`, `append`, `replace`, `delete`, `clear`
//!   and `count` on one relationship of one source.
//! - **Predicate synthesis**: relationship references become membership and
//!   equality predicates over the source's keys.
//! - **Graph mutation**: association fields are rebuilt, values are saved and
//!   generated keys are copied back to the caller's values.
//! - **Set reconciliation**: stale members are detached after a replace and
//!   removed members are unlinked on delete.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(MemoryStore::new().with_model::<User>().with_model::<Pet>());
//!
//! let mut user = User::new("jinzhu");
//! let mut pets = vec![Pet::new("rex"), Pet::new("tom")];
//! session.association::<User, Pet>(&mut user, "pets")?.append(&mut pets)?;
//!
//! // Generated keys were assigned back.
//! assert!(pets[0].id.is_some());
//! ```

pub mod association;
pub mod mutator;
pub mod predicate;
pub mod reconcile;

pub use association::{Association, HandleState};
pub use reconcile::SyncStrategy;

use relsync_core::{AssociationAccess, Error, FieldAccess, Model, Result};
use relsync_query::QueryBuilder;
use serde::{Deserialize, Serialize};

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for association handles created by a [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Skip join-table default filters in `find`/`count`.
    pub unscoped: bool,
    /// Upsert every column of related rows when saving, not only their keys.
    pub full_save_associations: bool,
}

impl SessionConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Custom(format!("invalid session config: {e}")))
    }

    /// Set the `unscoped` option (builder pattern).
    #[must_use]
    pub fn unscoped(mut self, value: bool) -> Self {
        self.unscoped = value;
        self
    }

    /// Set the `full_save_associations` option (builder pattern).
    #[must_use]
    pub fn full_save_associations(mut self, value: bool) -> Self {
        self.full_save_associations = value;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// Owns a store and hands out association handles over it.
///
/// A handle borrows the store and its source exclusively, so at most one
/// handle is live per session at a time.
#[derive(Debug)]
pub struct Session<Q> {
    store: Q,
    config: SessionConfig,
}

impl<Q: QueryBuilder> Session<Q> {
    /// Create a session with the default configuration.
    pub fn new(store: Q) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    /// Create a session with a custom configuration.
    pub fn with_config(store: Q, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Q {
        &self.store
    }

    /// Get a mutable reference to the underlying store.
    pub fn store_mut(&mut self) -> &mut Q {
        &mut self.store
    }

    /// Consume the session and return the store.
    pub fn into_inner(self) -> Q {
        self.store
    }

    /// Open the association `name` of a single source entity.
    ///
    /// Fails with `Error::UnsupportedRelation` when `S` declares no such
    /// relationship, `Error::Schema` when its metadata is malformed and
    /// `Error::Type` when `T` is not the related model.
    pub fn association<'a, S, T>(
        &'a mut self,
        source: &'a mut S,
        name: &str,
    ) -> Result<Association<'a, S, T, Q>>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        Association::new(
            &mut self.store,
            std::slice::from_mut(source),
            false,
            name,
            self.config.clone(),
        )
    }

    /// Open the association `name` over a slice of source entities.
    pub fn association_many<'a, S, T>(
        &'a mut self,
        sources: &'a mut [S],
        name: &str,
    ) -> Result<Association<'a, S, T, Q>>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        Association::new(&mut self.store, sources, true, name, self.config.clone())
    }
}
