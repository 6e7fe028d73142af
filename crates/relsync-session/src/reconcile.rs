//! Set reconciliation: persisting, detaching and unlinking related rows.
//!
//! The kind of a relationship is dispatched once through [`SyncStrategy`];
//! each strategy has one handler per operation.
//!
//! | Strategy    | Save                                   | Replace detach                 | Delete                    |
//! |-------------|----------------------------------------|--------------------------------|---------------------------|
//! | `BelongsTo` | related row, then source FK columns    | source FK := NULL (clear only) | source FK := NULL         |
//! | `Owned`     | source, then related rows with the FK  | stale related FK := NULL       | related FK := NULL        |
//! | `Join`      | source, related rows, then join rows   | stale join rows deleted        | matching join rows deleted |

use crate::SessionConfig;
use crate::mutator::field_slot;
use crate::predicate::{membership, membership_or_none};
use relsync_core::{
    AssociationAccess, Error, FieldAccess, IdentitySet, JoinTable, Model, ModelSchema, Reference,
    Relationship, RelationshipKind, Result, SchemaErrorKind, Value, identity_of,
};
use relsync_query::{Expr, OnConflict, Query, QueryBuilder};

/// How a relationship kind is kept in sync with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Foreign key lives on the source row.
    BelongsTo,
    /// Foreign key lives on the related rows (has-one, has-many).
    Owned,
    /// Keys of both sides live in join-table rows.
    Join,
}

impl SyncStrategy {
    pub const fn for_kind(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::BelongsTo => SyncStrategy::BelongsTo,
            RelationshipKind::HasOne | RelationshipKind::HasMany => SyncStrategy::Owned,
            RelationshipKind::Many2Many => SyncStrategy::Join,
        }
    }
}

/// Store-side half of the association engine for one relationship.
pub(crate) struct Reconciler<'r, Q: ?Sized> {
    store: &'r mut Q,
    rel: &'static Relationship,
    strategy: SyncStrategy,
    full_save: bool,
}

impl<'r, Q: QueryBuilder + ?Sized> Reconciler<'r, Q> {
    pub(crate) fn new(
        store: &'r mut Q,
        rel: &'static Relationship,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            rel,
            strategy: SyncStrategy::for_kind(rel.kind),
            full_save: config.full_save_associations,
        }
    }

    // ==================== Save ====================

    /// Persist `source` together with what its association field holds.
    pub(crate) fn save<S, T>(&mut self, source: &mut S) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        match self.strategy {
            SyncStrategy::BelongsTo => self.save_belongs_to::<S, T>(source),
            SyncStrategy::Owned => self.save_owned::<S, T>(source),
            SyncStrategy::Join => self.save_join::<S, T>(source),
        }
    }

    fn save_belongs_to<S, T>(&mut self, source: &mut S) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        let on_conflict = self.related_conflict(&[]);

        let keys = {
            let mut slot = field_slot::<S, T>(source, rel)?;
            let Some(related) = slot.get_mut(0) else {
                return Ok(());
            };
            self.insert(related, &on_conflict)?;
            rel.references
                .iter()
                .filter(|r| !r.is_pinned())
                .map(|r| (r.foreign_key, read_key(&*related, r.primary_key)))
                .collect::<Vec<_>>()
        };

        for (field, value) in &keys {
            source.set(field, value.clone())?;
        }
        let fields: Vec<&'static str> = keys.iter().map(|(field, _)| *field).collect();
        self.persist_columns(source, &fields)
    }

    fn save_owned<S, T>(&mut self, source: &mut S) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        self.ensure_persisted(source)?;

        let mut keys = Vec::new();
        let mut columns = Vec::new();
        for reference in rel.references {
            let value = match reference.primary_value {
                Some(constant) => Value::from(constant),
                None if reference.own_primary_key => read_key(&*source, reference.primary_key),
                None => continue,
            };
            keys.push((reference.foreign_key, value));
            columns.push(rel.foreign_column(reference)?);
        }
        let on_conflict = self.related_conflict(&columns);

        let mut slot = field_slot::<S, T>(source, rel)?;
        for index in 0..slot.len() {
            if let Some(related) = slot.get_mut(index) {
                for (field, value) in &keys {
                    related.set(field, value.clone())?;
                }
                self.insert(related, &on_conflict)?;
            }
        }
        Ok(())
    }

    fn save_join<S, T>(&mut self, source: &mut S) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        let join = join_table(rel)?;
        self.ensure_persisted(source)?;

        let sets = rel.partition();
        let mut source_keys = Vec::new();
        for reference in sets.own {
            source_keys.push((
                rel.foreign_column(reference)?,
                read_key(&*source, reference.primary_key),
            ));
        }
        for reference in sets.pinned {
            if let Some(constant) = reference.primary_value {
                source_keys.push((rel.foreign_column(reference)?, Value::from(constant)));
            }
        }

        let on_conflict = self.related_conflict(&[]);
        let mut links = Vec::new();
        {
            let mut slot = field_slot::<S, T>(source, rel)?;
            for index in 0..slot.len() {
                let Some(related) = slot.get_mut(index) else {
                    continue;
                };
                self.insert(related, &on_conflict)?;
                let mut link = source_keys.clone();
                for reference in &sets.related {
                    link.push((
                        rel.foreign_column(reference)?,
                        read_key(&*related, reference.primary_key),
                    ));
                }
                links.push(link);
            }
        }

        for link in links {
            self.store.create(&join.schema, &link, &OnConflict::DoNothing)?;
        }
        Ok(())
    }

    // ==================== Replace ====================

    /// Detach members no longer held after a replace with `values`.
    pub(crate) fn detach_stale<S, T>(&mut self, sources: &mut [S], values: &[T]) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        match self.strategy {
            SyncStrategy::BelongsTo if values.is_empty() => {
                self.detach_belongs_to::<S, T>(sources)
            }
            SyncStrategy::BelongsTo => Ok(()),
            SyncStrategy::Owned => self.detach_owned::<S, T>(sources),
            SyncStrategy::Join => self.detach_join(sources, values),
        }
    }

    fn detach_belongs_to<S, T>(&mut self, sources: &mut [S]) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        for source in sources.iter_mut() {
            field_slot::<S, T>(source, rel)?.clear();
        }

        let schema = &rel.schema;
        let assignments = rel
            .references
            .iter()
            .map(|r| Ok((rel.foreign_column(r)?.to_string(), Value::Null)))
            .collect::<Result<Vec<_>>>()?;
        let scope = membership(
            schema.table,
            &schema.primary_columns(),
            sources.iter(),
            &schema.primary_field_names(),
        )
        .ok_or(Error::PrimaryKeyRequired {
            table: schema.table,
        })?;

        self.store
            .update_columns(&Query::new(schema.table).filter(scope), &assignments)?;
        Ok(())
    }

    fn detach_owned<S, T>(&mut self, sources: &mut [S]) -> Result<()>
    where
        S: Model + FieldAccess + AssociationAccess<T>,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        let related = &rel.field_schema;
        let table = related.table;
        let related_fields = related.primary_field_names();

        let mut held = IdentitySet::new();
        for source in sources.iter_mut() {
            let slot = field_slot::<S, T>(source, rel)?;
            for value in slot.values() {
                if let Some(identity) = identity_of(value, &related_fields) {
                    held.insert(identity);
                }
            }
        }

        let mut query = Query::new(table);
        if !held.is_empty() {
            query = query.filter(
                Expr::membership(table, &related.primary_columns(), held.into_tuples()).not(),
            );
        }

        let mut source_fields = Vec::new();
        let mut key_columns = Vec::new();
        let mut assignments = Vec::new();
        for reference in rel.references {
            let column = rel.foreign_column(reference)?;
            if let Some(constant) = reference.primary_value {
                query = query.filter(Expr::qualified(table, column).eq(constant));
            } else if let Some(primary_key) = reference.primary_key {
                source_fields.push(primary_key);
                key_columns.push(column);
                assignments.push((column.to_string(), Value::Null));
            }
        }

        let Some(scope) = membership(table, &key_columns, sources.iter(), &source_fields) else {
            tracing::debug!(relation = rel.name, "Source has no key; nothing to detach");
            return Ok(());
        };
        self.store.update_columns(&query.filter(scope), &assignments)?;
        Ok(())
    }

    fn detach_join<S, T>(&mut self, sources: &[S], values: &[T]) -> Result<()>
    where
        S: Model + FieldAccess,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        let query = self.join_scope(sources)?;
        let table = join_table(rel)?.schema.table;

        let (related_fields, related_columns) = key_pairs(rel, &rel.partition().related)?;
        let query = match membership(table, &related_columns, values.iter(), &related_fields) {
            Some(keep) => query.filter(keep.not()),
            None => query,
        };
        self.store.delete(&query)?;
        Ok(())
    }

    // ==================== Delete ====================

    /// Unlink `values` from `sources` in the store. Returns rows affected.
    pub(crate) fn delete<S, T>(&mut self, sources: &[S], values: &[T]) -> Result<u64>
    where
        S: Model + FieldAccess,
        T: Model + FieldAccess,
    {
        let rel = self.rel;
        let keyed: Vec<&Reference> = rel.references.iter().filter(|r| !r.is_pinned()).collect();

        match self.strategy {
            SyncStrategy::BelongsTo => {
                let schema = &rel.schema;
                let (related_fields, fk_columns) = key_pairs(rel, &keyed)?;
                let query = Query::new(schema.table)
                    .filter(membership_or_none(
                        schema.table,
                        &schema.primary_columns(),
                        sources.iter(),
                        &schema.primary_field_names(),
                    ))
                    .filter(membership_or_none(
                        schema.table,
                        &fk_columns,
                        values.iter(),
                        &related_fields,
                    ));
                self.store.update_columns(&query, &null_assignments(&fk_columns))
            }
            SyncStrategy::Owned => {
                let related = &rel.field_schema;
                let (source_fields, fk_columns) = key_pairs(rel, &keyed)?;
                let query = self
                    .pinned_filters(Query::new(related.table), related.table)?
                    .filter(membership_or_none(
                        related.table,
                        &fk_columns,
                        sources.iter(),
                        &source_fields,
                    ))
                    .filter(membership_or_none(
                        related.table,
                        &related.primary_columns(),
                        values.iter(),
                        &related.primary_field_names(),
                    ));
                self.store.update_columns(&query, &null_assignments(&fk_columns))
            }
            SyncStrategy::Join => {
                let query = self.join_scope(sources)?;
                let table = join_table(rel)?.schema.table;
                let (related_fields, related_columns) = key_pairs(rel, &rel.partition().related)?;
                let query = query.filter(membership_or_none(
                    table,
                    &related_columns,
                    values.iter(),
                    &related_fields,
                ));
                self.store.delete(&query)
            }
        }
    }

    // ==================== Helpers ====================

    /// Join rows belonging to `sources`, narrowed by pinned constants.
    fn join_scope<S: FieldAccess>(&self, sources: &[S]) -> Result<Query> {
        let rel = self.rel;
        let table = join_table(rel)?.schema.table;
        let (own_fields, own_columns) = key_pairs(rel, &rel.partition().own)?;
        let scope = membership(table, &own_columns, sources.iter(), &own_fields).ok_or(
            Error::PrimaryKeyRequired {
                table: rel.schema.table,
            },
        )?;
        Ok(self.pinned_filters(Query::new(table), table)?.filter(scope))
    }

    fn pinned_filters(&self, mut query: Query, table: &str) -> Result<Query> {
        for reference in self.rel.references {
            if let Some(constant) = reference.primary_value {
                let column = self.rel.foreign_column(reference)?;
                query = query.filter(Expr::qualified(table, column).eq(constant));
            }
        }
        Ok(query)
    }

    fn related_conflict(&self, key_columns: &[&str]) -> OnConflict {
        if self.full_save {
            OnConflict::update_all()
        } else if key_columns.is_empty() {
            OnConflict::DoNothing
        } else {
            OnConflict::do_update(key_columns)
        }
    }

    /// Insert `source` unless a row with its key already exists. A preset key
    /// that the store has never seen is inserted as is.
    fn ensure_persisted<S: Model + FieldAccess>(&mut self, source: &mut S) -> Result<()> {
        if identity_of(&*source, &self.rel.schema.primary_field_names()).is_none() {
            tracing::debug!(table = S::TABLE_NAME, "Inserting unsaved source");
        }
        self.insert(source, &OnConflict::DoNothing)
    }

    /// Write `fields` of a source row: update by primary key, insert when the
    /// row is new or the update matched nothing.
    fn persist_columns<S: Model + FieldAccess>(
        &mut self,
        source: &mut S,
        fields: &[&str],
    ) -> Result<()> {
        let schema = &self.rel.schema;
        let Some(key) = identity_of(&*source, &schema.primary_field_names()) else {
            return self.insert(source, &OnConflict::DoNothing);
        };

        let assignments = fields
            .iter()
            .map(|f| {
                let value = source.get(f).unwrap_or(Value::Null);
                Ok((schema.column(f)?.to_string(), value))
            })
            .collect::<Result<Vec<_>>>()?;
        let query = Query::new(schema.table).filter(Expr::membership(
            schema.table,
            &schema.primary_columns(),
            vec![key],
        ));
        if self.store.update_columns(&query, &assignments)? == 0 {
            self.insert(source, &OnConflict::update_all())?;
        }
        Ok(())
    }

    /// Insert `entity` and copy generated columns back onto it.
    fn insert<E: Model + FieldAccess>(
        &mut self,
        entity: &mut E,
        on_conflict: &OnConflict,
    ) -> Result<()> {
        let schema = E::schema();
        let generated = self.store.create(&schema, &entity.to_row(), on_conflict)?;
        assign_generated(entity, &schema, generated)
    }
}

/// Set generated `(column, value)` pairs on the fields they map to.
pub(crate) fn assign_generated<E: FieldAccess + ?Sized>(
    entity: &mut E,
    schema: &ModelSchema,
    generated: Vec<(&'static str, Value)>,
) -> Result<()> {
    for (column, value) in generated {
        if let Some(field) = schema.fields().iter().find(|f| f.column_name == column) {
            entity.set(field.name, value)?;
        }
    }
    Ok(())
}

fn read_key<E: FieldAccess + ?Sized>(entity: &E, field: Option<&str>) -> Value {
    field.and_then(|f| entity.get(f)).unwrap_or(Value::Null)
}

fn join_table(rel: &Relationship) -> Result<&JoinTable> {
    rel.join_table.as_ref().ok_or_else(|| {
        Error::schema(
            SchemaErrorKind::Invalid,
            format!("relationship '{}' has no join table", rel.name),
        )
    })
}

/// Primary-key fields of keyed references and the foreign columns they are
/// matched against.
fn key_pairs(
    rel: &Relationship,
    references: &[&Reference],
) -> Result<(Vec<&'static str>, Vec<&'static str>)> {
    let mut fields = Vec::with_capacity(references.len());
    let mut columns = Vec::with_capacity(references.len());
    for reference in references {
        if let Some(primary_key) = reference.primary_key {
            fields.push(primary_key);
            columns.push(rel.foreign_column(reference)?);
        }
    }
    Ok((fields, columns))
}

fn null_assignments(columns: &[&str]) -> Vec<(String, Value)> {
    columns.iter().map(|c| ((*c).to_string(), Value::Null)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_for_kind() {
        assert_eq!(
            SyncStrategy::for_kind(RelationshipKind::BelongsTo),
            SyncStrategy::BelongsTo
        );
        assert_eq!(SyncStrategy::for_kind(RelationshipKind::HasOne), SyncStrategy::Owned);
        assert_eq!(SyncStrategy::for_kind(RelationshipKind::HasMany), SyncStrategy::Owned);
        assert_eq!(SyncStrategy::for_kind(RelationshipKind::Many2Many), SyncStrategy::Join);
    }

    #[test]
    fn test_null_assignments() {
        assert_eq!(
            null_assignments(&["user_id", "user_type"]),
            vec![
                ("user_id".to_string(), Value::Null),
                ("user_type".to_string(), Value::Null)
            ]
        );
    }
}
