//! The association handle.
//!
//! An [`Association`] binds a source (one entity or a slice) to one declared
//! relationship and one store. Every operation first checks the handle state:
//! once an operation fails the handle is poisoned and hands back that error
//! without touching the store again.

use crate::SessionConfig;
use crate::mutator::{
    check_shape, field_slot, prune_deleted, save_association, save_association_each,
};
use crate::predicate::query_conditions;
use crate::reconcile::Reconciler;
use relsync_core::{
    AssociationAccess, Error, FieldAccess, Model, RelationError, Relationship, Result,
    SchemaErrorKind, TypeError, find_relationship,
};
use relsync_query::{Expr, Join, Query, QueryBuilder};
use std::marker::PhantomData;

/// Error state of an association handle.
#[derive(Debug, Clone, Default)]
pub enum HandleState {
    /// No operation has failed.
    #[default]
    Clean,
    /// An operation failed; every later call returns this error.
    Poisoned(Error),
}

/// Operations on one relationship of a source.
///
/// `S` is the source model, `T` the related model and `Q` the store.
pub struct Association<'a, S, T, Q: ?Sized> {
    store: &'a mut Q,
    sources: &'a mut [S],
    is_slice: bool,
    relationship: &'static Relationship,
    config: SessionConfig,
    state: HandleState,
    _related: PhantomData<fn() -> T>,
}

impl<'a, S, T, Q> Association<'a, S, T, Q>
where
    S: Model + FieldAccess + AssociationAccess<T>,
    T: Model + FieldAccess,
    Q: QueryBuilder + ?Sized,
{
    pub(crate) fn new(
        store: &'a mut Q,
        sources: &'a mut [S],
        is_slice: bool,
        name: &str,
        config: SessionConfig,
    ) -> Result<Self> {
        let relationship = find_relationship::<S>(name).ok_or_else(|| {
            Error::UnsupportedRelation(RelationError {
                model: S::TABLE_NAME,
                relation: name.to_string(),
            })
        })?;
        relationship.validate()?;

        if relationship.schema.table != S::TABLE_NAME {
            return Err(Error::schema(
                SchemaErrorKind::Invalid,
                format!(
                    "relationship '{}' is declared for '{}', not '{}'",
                    relationship.name,
                    relationship.schema.table,
                    S::TABLE_NAME
                ),
            ));
        }
        if relationship.field_schema.table != T::TABLE_NAME {
            return Err(Error::Type(TypeError {
                expected: relationship.field_schema.table,
                actual: T::TABLE_NAME.to_string(),
                column: None,
                relation: Some(relationship.name),
            }));
        }
        if let Some(first) = sources.first_mut() {
            check_shape(&field_slot::<S, T>(first, relationship)?, relationship)?;
        }

        tracing::debug!(
            model = S::TABLE_NAME,
            relation = relationship.name,
            kind = %relationship.kind,
            sources = sources.len(),
            "Opened association"
        );

        Ok(Self {
            store,
            sources,
            is_slice,
            relationship,
            config,
            state: HandleState::Clean,
            _related: PhantomData,
        })
    }

    /// Skip join-table default filters in `find` and `count`.
    #[must_use]
    pub fn unscoped(mut self) -> Self {
        self.config.unscoped = true;
        self
    }

    pub fn relationship(&self) -> &'static Relationship {
        self.relationship
    }

    pub fn state(&self) -> &HandleState {
        &self.state
    }

    /// The error that poisoned this handle, if any.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            HandleState::Clean => None,
            HandleState::Poisoned(e) => Some(e),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, HandleState::Poisoned(_))
    }

    // ==================== Queries ====================

    /// Related rows of the sources matching `conds` as well.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = self.relationship.name))]
    pub fn find(&mut self, conds: impl IntoIterator<Item = Expr>) -> Result<Vec<T>> {
        let conds: Vec<Expr> = conds.into_iter().collect();
        self.guard(|h| {
            let query = h.scope()?.filters(conds);
            let rows = h.store.find(&query)?;
            tracing::debug!(rows = rows.len(), "Loaded related rows");
            rows.iter().map(T::from_row).collect()
        })
    }

    /// Number of related rows of the sources.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = self.relationship.name))]
    pub fn count(&mut self) -> Result<i64> {
        self.guard(|h| {
            let query = h.scope()?;
            h.store.count(&query)
        })
    }

    // ==================== Mutations ====================

    /// Add `values` to the association and save them.
    ///
    /// For to-one relationships this is [`replace`](Self::replace) when
    /// `values` is non-empty, and a no-op otherwise.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(relation = self.relationship.name, values = values.len())
    )]
    pub fn append(&mut self, values: &mut [T]) -> Result<()> {
        self.guard(|h| {
            if h.relationship.kind.is_to_many() {
                h.save(false, values)
            } else if values.is_empty() {
                Ok(())
            } else {
                h.replace_members(values)
            }
        })
    }

    /// Make `values` the complete association. Empty `values` clears it.
    ///
    /// New members are saved before stale ones are detached.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(relation = self.relationship.name, values = values.len())
    )]
    pub fn replace(&mut self, values: &mut [T]) -> Result<()> {
        self.guard(|h| h.replace_members(values))
    }

    /// Add `groups[i]` to the association of source `i` and save them.
    ///
    /// `groups` pairs up with the sources; each group may hold any number of
    /// values. For to-one relationships a non-empty group replaces the
    /// source's current value and an empty group leaves it alone.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(relation = self.relationship.name, groups = groups.len())
    )]
    pub fn append_each(&mut self, groups: &mut [Vec<T>]) -> Result<()> {
        self.guard(|h| {
            h.save_each(false, groups)?;
            if h.relationship.kind.is_to_many() {
                return Ok(());
            }
            h.detach_each(groups, false)
        })
    }

    /// Make `groups[i]` the complete association of source `i`.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(relation = self.relationship.name, groups = groups.len())
    )]
    pub fn replace_each(&mut self, groups: &mut [Vec<T>]) -> Result<()> {
        self.guard(|h| {
            h.save_each(true, groups)?;
            h.detach_each(groups, true)
        })
    }

    /// Unlink `values` from the sources and drop them from the association.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(relation = self.relationship.name, values = values.len())
    )]
    pub fn delete(&mut self, values: &[T]) -> Result<()> {
        self.guard(|h| {
            let affected = Reconciler::new(&mut *h.store, h.relationship, &h.config)
                .delete(&*h.sources, values)?;
            tracing::debug!(affected, "Unlinked related rows");
            prune_deleted(h.relationship, h.sources, values)
        })
    }

    /// Remove every member of the association.
    pub fn clear(&mut self) -> Result<()> {
        self.replace(&mut [])
    }

    // ==================== Internals ====================

    /// Run `op` unless poisoned; poison on failure.
    fn guard<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if let HandleState::Poisoned(e) = &self.state {
            return Err(e.clone());
        }
        op(self).inspect_err(|e| {
            tracing::warn!(
                relation = self.relationship.name,
                error = %e,
                "Association handle poisoned"
            );
            self.state = HandleState::Poisoned(e.clone());
        })
    }

    fn save(&mut self, clear: bool, values: &mut [T]) -> Result<()> {
        save_association(
            &mut *self.store,
            self.relationship,
            &self.config,
            self.sources,
            self.is_slice,
            clear,
            values,
        )
    }

    fn save_each(&mut self, clear: bool, groups: &mut [Vec<T>]) -> Result<()> {
        save_association_each(
            &mut *self.store,
            self.relationship,
            &self.config,
            self.sources,
            clear,
            groups,
        )
    }

    fn replace_members(&mut self, values: &mut [T]) -> Result<()> {
        self.save(true, values)?;
        let mut reconciler = Reconciler::new(&mut *self.store, self.relationship, &self.config);
        if !self.is_slice || values.is_empty() {
            return reconciler.detach_stale::<S, T>(self.sources, values);
        }
        // Each source keeps only the value paired with it.
        for (source, value) in self.sources.iter_mut().zip(values.iter()) {
            reconciler
                .detach_stale::<S, T>(std::slice::from_mut(source), std::slice::from_ref(value))?;
        }
        Ok(())
    }

    /// Detach stale members source by source. Sources with an empty group are
    /// detached only when `clear` is set.
    fn detach_each(&mut self, groups: &[Vec<T>], clear: bool) -> Result<()> {
        let mut reconciler = Reconciler::new(&mut *self.store, self.relationship, &self.config);
        if groups.is_empty() {
            if clear {
                return reconciler.detach_stale::<S, T>(self.sources, &[]);
            }
            return Ok(());
        }
        for (source, group) in self.sources.iter_mut().zip(groups) {
            if clear || !group.is_empty() {
                reconciler.detach_stale::<S, T>(std::slice::from_mut(source), group)?;
            }
        }
        Ok(())
    }

    /// The query selecting the sources' related rows.
    fn scope(&self) -> Result<Query> {
        let rel = self.relationship;
        let conds = query_conditions(rel, &*self.sources)?;
        let mut query = Query::new(rel.field_schema.table);

        match &rel.join_table {
            Some(jt) => {
                if !self.config.unscoped {
                    for filter in jt.filters {
                        query = query.filter(Expr::from_join_filter(jt.schema.table, filter));
                    }
                }
                query = query.join(Join::inner(jt.schema.table, conds));
            }
            None => query = query.filters(conds),
        }
        Ok(query)
    }
}

impl<S, T, Q: ?Sized> std::fmt::Debug for Association<'_, S, T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Association")
            .field("relationship", &self.relationship.name)
            .field("kind", &self.relationship.kind)
            .field("sources", &self.sources.len())
            .field("is_slice", &self.is_slice)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}
