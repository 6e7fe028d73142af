//! Graph mutation: association fields, saves and back-assignment.
//!
//! Saving values into an association happens source by source in three
//! passes:
//!
//! 1. The association field is rebuilt (to-one: set, to-many: optionally
//!    cleared, then appended to). Every placement is recorded as a
//!    [`BackAssignment`].
//! 2. The source is saved through the [`Reconciler`], which writes generated
//!    keys onto the instances held in the field.
//! 3. The saved instances are cloned back into the caller's values.

use crate::SessionConfig;
use crate::reconcile::Reconciler;
use relsync_core::{
    AssociationAccess, Error, FieldAccess, FieldSlot, IdentitySet, Model, Relationship, Result,
    TypeError, Value,
};
use relsync_query::QueryBuilder;

/// Where a supplied value ended up in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackAssignment {
    /// Index of the source entity.
    pub source: usize,
    /// Index of the value group the value came from.
    pub argument: usize,
    /// Position of the value inside its group.
    pub element: usize,
    /// Position inside the source's association field.
    pub slot_index: usize,
}

/// Borrow the association field named by `rel` on `source`.
pub(crate) fn field_slot<'s, S, T>(
    source: &'s mut S,
    rel: &Relationship,
) -> Result<FieldSlot<'s, T>>
where
    S: AssociationAccess<T>,
{
    source.association_mut(rel.name).ok_or_else(|| {
        Error::Type(TypeError {
            expected: "association field",
            actual: format!("no field '{}' on '{}'", rel.name, rel.schema.table),
            column: None,
            relation: Some(rel.name),
        })
    })
}

/// Slot shape must match the relationship kind.
pub(crate) fn check_shape<T>(slot: &FieldSlot<'_, T>, rel: &'static Relationship) -> Result<()> {
    if slot.is_collection() == rel.kind.is_to_many() {
        return Ok(());
    }
    Err(Error::Type(TypeError {
        expected: if rel.kind.is_to_many() {
            "collection"
        } else {
            "single value"
        },
        actual: slot.shape().to_string(),
        column: None,
        relation: Some(rel.name),
    }))
}

/// Place `values` into the association of `sources`, save, and copy the saved
/// instances back into `values`.
///
/// With `is_slice`, `values` pairs up with `sources` one-to-one; any other
/// length is `Error::LengthMismatch` before the store is touched, except that
/// clearing with no values detaches every source in memory.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(relation = rel.name, clear = clear, values = values.len())
)]
pub fn save_association<S, T, Q>(
    store: &mut Q,
    rel: &'static Relationship,
    config: &SessionConfig,
    sources: &mut [S],
    is_slice: bool,
    clear: bool,
    values: &mut [T],
) -> Result<()>
where
    S: Model + FieldAccess + AssociationAccess<T>,
    T: Model + FieldAccess,
    Q: QueryBuilder + ?Sized,
{
    if !is_slice {
        let Some(source) = sources.first_mut() else {
            return Ok(());
        };
        let mut reconciler = Reconciler::new(store, rel, config);
        return save_source(&mut reconciler, rel, 0, source, 0, clear, values);
    }

    if !pair_up::<S, T>(rel, sources, values.len(), clear)? {
        return Ok(());
    }
    let mut reconciler = Reconciler::new(store, rel, config);
    for (index, (source, value)) in sources.iter_mut().zip(values.iter_mut()).enumerate() {
        save_source(
            &mut reconciler,
            rel,
            index,
            source,
            index,
            clear,
            std::slice::from_mut(value),
        )?;
    }
    Ok(())
}

/// Like [`save_association`] with one group of values per source: `groups[i]`
/// goes into the association of `sources[i]`.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(relation = rel.name, clear = clear, groups = groups.len())
)]
pub fn save_association_each<S, T, Q>(
    store: &mut Q,
    rel: &'static Relationship,
    config: &SessionConfig,
    sources: &mut [S],
    clear: bool,
    groups: &mut [Vec<T>],
) -> Result<()>
where
    S: Model + FieldAccess + AssociationAccess<T>,
    T: Model + FieldAccess,
    Q: QueryBuilder + ?Sized,
{
    if !pair_up::<S, T>(rel, sources, groups.len(), clear)? {
        return Ok(());
    }
    let mut reconciler = Reconciler::new(store, rel, config);
    for (index, (source, group)) in sources.iter_mut().zip(groups.iter_mut()).enumerate() {
        save_source(&mut reconciler, rel, index, source, index, clear, group)?;
    }
    Ok(())
}

/// Check that `supplied` values pair up with `sources`. A clear with nothing
/// supplied detaches every source in memory and returns `false`.
fn pair_up<S, T>(
    rel: &'static Relationship,
    sources: &mut [S],
    supplied: usize,
    clear: bool,
) -> Result<bool>
where
    S: FieldAccess + AssociationAccess<T>,
{
    if supplied == sources.len() {
        return Ok(true);
    }
    if clear && supplied == 0 {
        for source in sources.iter_mut() {
            detach_in_memory::<S, T>(rel, source)?;
        }
        return Ok(false);
    }
    Err(Error::LengthMismatch {
        expected: sources.len(),
        actual: supplied,
    })
}

/// Attach `values` to one source, save it, and assign the saved instances
/// back into `values`.
fn save_source<S, T, Q>(
    reconciler: &mut Reconciler<'_, Q>,
    rel: &'static Relationship,
    source_index: usize,
    source: &mut S,
    argument: usize,
    clear: bool,
    values: &mut [T],
) -> Result<()>
where
    S: Model + FieldAccess + AssociationAccess<T>,
    T: Model + FieldAccess,
    Q: QueryBuilder + ?Sized,
{
    if values.is_empty() {
        if clear {
            detach_in_memory::<S, T>(rel, source)?;
        }
        return Ok(());
    }

    let mut assignments = Vec::with_capacity(values.len());
    for (element, value) in values.iter().enumerate() {
        let slot_index = attach(rel, source, value.clone(), clear && element == 0)?;
        if !rel.kind.is_to_many() {
            // The last value replaces earlier ones in a to-one field.
            assignments.clear();
        }
        assignments.push(BackAssignment {
            source: source_index,
            argument,
            element,
            slot_index,
        });
    }
    reconciler.save::<S, T>(source)?;
    back_assign(rel, source, values, &assignments)
}

/// Put `value` into the association field of `source`. Returns its slot index.
fn attach<S, T>(rel: &'static Relationship, source: &mut S, value: T, clear: bool) -> Result<usize>
where
    S: AssociationAccess<T>,
{
    let mut slot = field_slot::<S, T>(source, rel)?;
    check_shape(&slot, rel)?;
    if rel.kind.is_to_many() {
        if clear {
            slot.clear();
        }
        slot.push(value, rel.name)
    } else {
        slot.set_one(value, rel.name)?;
        Ok(0)
    }
}

/// Empty the association field; without a join table also zero the source's
/// foreign keys.
fn detach_in_memory<S, T>(rel: &'static Relationship, source: &mut S) -> Result<()>
where
    S: FieldAccess + AssociationAccess<T>,
{
    field_slot::<S, T>(source, rel)?.clear();
    if rel.join_table.is_none() {
        for reference in rel.references {
            if !reference.own_primary_key && !reference.is_pinned() {
                source.set(reference.foreign_key, Value::Null)?;
            }
        }
    }
    Ok(())
}

fn back_assign<S, T>(
    rel: &'static Relationship,
    source: &mut S,
    values: &mut [T],
    assignments: &[BackAssignment],
) -> Result<()>
where
    S: AssociationAccess<T>,
    T: Clone,
{
    let slot = field_slot::<S, T>(source, rel)?;
    for assignment in assignments {
        if let (Some(saved), Some(target)) = (
            slot.get(assignment.slot_index),
            values.get_mut(assignment.element),
        ) {
            target.clone_from(saved);
            tracing::trace!(
                source = assignment.source,
                argument = assignment.argument,
                element = assignment.element,
                slot = assignment.slot_index,
                "Assigned saved value back"
            );
        }
    }
    Ok(())
}

/// Drop deleted `values` from the association of every source.
///
/// A collection loses matching elements. A matching single value is cleared;
/// without a join table the foreign keys held by the source are zeroed as
/// well. The cleared value itself is dropped untouched.
pub fn prune_deleted<S, T>(
    rel: &'static Relationship,
    sources: &mut [S],
    values: &[T],
) -> Result<()>
where
    S: FieldAccess + AssociationAccess<T>,
    T: FieldAccess,
{
    let key_fields = rel.field_schema.primary_field_names();
    let deleted = IdentitySet::collect(values.iter(), &key_fields);
    if deleted.is_empty() {
        return Ok(());
    }

    for source in sources.iter_mut() {
        let cleared = {
            let mut slot = field_slot::<S, T>(source, rel)?;
            if slot.is_collection() {
                slot.retain(|v| !deleted.contains_entity(v, &key_fields));
                false
            } else if slot
                .get(0)
                .is_some_and(|v| deleted.contains_entity(v, &key_fields))
            {
                slot.clear();
                true
            } else {
                false
            }
        };

        if cleared && rel.join_table.is_none() {
            for reference in rel.references {
                if !reference.own_primary_key && !reference.is_pinned() {
                    source.set(reference.foreign_key, Value::Null)?;
                }
            }
        }
    }
    Ok(())
}
