//! Model traits and the association field slot.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::field::FieldInfo;
use crate::relationship::{ModelSchema, Relationship};
use crate::row::Row;
use crate::value::Value;

/// Trait for types that can be mapped to database tables.
///
/// This trait provides metadata about the table structure and
/// methods for converting between Rust structs and store rows.
///
/// # Example
///
/// ```ignore
/// impl Model for Pet {
///     const TABLE_NAME: &'static str = "pets";
///     const RELATIONSHIPS: &'static [Relationship] = &[Relationship::belongs_to::<Pet, User>(
///         "owner",
///         &[Reference::new("id", "owner_id")],
///     )];
///
///     fn fields() -> &'static [FieldInfo] {
///         static FIELDS: &[FieldInfo] = &[
///             FieldInfo::new("id", "id").primary_key(true).auto_increment(true),
///             FieldInfo::new("name", "name"),
///             FieldInfo::new("owner_id", "owner_id").nullable(true),
///         ];
///         FIELDS
///     }
///     // to_row / from_row ...
/// }
/// ```
pub trait Model: Sized + Clone + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// Relationship metadata for this model.
    ///
    /// Models with no relationships can rely on the default empty slice.
    const RELATIONSHIPS: &'static [Relationship] = &[];

    /// Get field metadata for all columns.
    fn fields() -> &'static [FieldInfo];

    /// Convert this model instance to a row of `(column, value)` pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a store row.
    fn from_row(row: &Row) -> Result<Self>;

    /// Table and field metadata as a relationship endpoint.
    fn schema() -> ModelSchema {
        ModelSchema::of::<Self>()
    }
}

/// Dynamic get/set of a named field on an entity instance.
///
/// Field names are the Rust field names declared in [`FieldInfo::name`],
/// not column names.
pub trait FieldAccess {
    /// Read a field. `None` means the entity has no such field.
    fn get(&self, field: &str) -> Option<Value>;

    /// Write a field. Implementations reject unknown fields and values
    /// that do not convert to the field's type.
    fn set(&mut self, field: &str, value: Value) -> Result<()>;
}

/// Access to the association fields of an entity that hold `T`.
pub trait AssociationAccess<T> {
    /// Borrow the association field called `name`, if this entity has one
    /// holding `T`.
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, T>>;
}

/// Mutable view of an association field, whatever its declared shape.
#[derive(Debug)]
pub enum FieldSlot<'a, T> {
    /// `Option<T>`
    One(&'a mut Option<T>),
    /// `Option<Box<T>>`
    Boxed(&'a mut Option<Box<T>>),
    /// `Vec<T>`
    Many(&'a mut Vec<T>),
    /// `Vec<Box<T>>`
    ManyBoxed(&'a mut Vec<Box<T>>),
}

impl<T> FieldSlot<'_, T> {
    /// Whether the field holds a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self, FieldSlot::Many(_) | FieldSlot::ManyBoxed(_))
    }

    /// Human-readable shape, used in type errors.
    pub fn shape(&self) -> &'static str {
        match self {
            FieldSlot::One(_) => "single value",
            FieldSlot::Boxed(_) => "boxed value",
            FieldSlot::Many(_) => "collection",
            FieldSlot::ManyBoxed(_) => "boxed collection",
        }
    }

    /// Number of related values currently held.
    pub fn len(&self) -> usize {
        match self {
            FieldSlot::One(v) => usize::from(v.is_some()),
            FieldSlot::Boxed(v) => usize::from(v.is_some()),
            FieldSlot::Many(v) => v.len(),
            FieldSlot::ManyBoxed(v) => v.len(),
        }
    }

    /// Whether the field holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset the field to its empty value.
    pub fn clear(&mut self) {
        match self {
            FieldSlot::One(v) => **v = None,
            FieldSlot::Boxed(v) => **v = None,
            FieldSlot::Many(v) => v.clear(),
            FieldSlot::ManyBoxed(v) => v.clear(),
        }
    }

    /// Borrow the value at `index`. A to-one field only has index 0.
    pub fn get(&self, index: usize) -> Option<&T> {
        match self {
            FieldSlot::One(v) if index == 0 => v.as_ref(),
            FieldSlot::Boxed(v) if index == 0 => v.as_deref(),
            FieldSlot::Many(v) => v.get(index),
            FieldSlot::ManyBoxed(v) => v.get(index).map(|b| &**b),
            _ => None,
        }
    }

    /// Mutably borrow the value at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        match self {
            FieldSlot::One(v) if index == 0 => v.as_mut(),
            FieldSlot::Boxed(v) if index == 0 => v.as_deref_mut(),
            FieldSlot::Many(v) => v.get_mut(index),
            FieldSlot::ManyBoxed(v) => v.get_mut(index).map(|b| &mut **b),
            _ => None,
        }
    }

    /// All values currently held, in field order.
    pub fn values(&self) -> Vec<&T> {
        match self {
            FieldSlot::One(v) => v.iter().collect(),
            FieldSlot::Boxed(v) => v.iter().map(|b| &**b).collect(),
            FieldSlot::Many(v) => v.iter().collect(),
            FieldSlot::ManyBoxed(v) => v.iter().map(|b| &**b).collect(),
        }
    }

    /// Store a single related value in a to-one field.
    pub fn set_one(&mut self, value: T, relation: &'static str) -> Result<()> {
        match self {
            FieldSlot::One(v) => **v = Some(value),
            FieldSlot::Boxed(v) => **v = Some(Box::new(value)),
            _ => return Err(self.shape_error("single value", relation)),
        }
        Ok(())
    }

    /// Append to a collection field, returning the index of the new element.
    pub fn push(&mut self, value: T, relation: &'static str) -> Result<usize> {
        match self {
            FieldSlot::Many(v) => {
                v.push(value);
                Ok(v.len() - 1)
            }
            FieldSlot::ManyBoxed(v) => {
                v.push(Box::new(value));
                Ok(v.len() - 1)
            }
            _ => Err(self.shape_error("collection", relation)),
        }
    }

    /// Keep only the values for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        match self {
            FieldSlot::One(v) => {
                if v.as_ref().is_some_and(|x| !keep(x)) {
                    **v = None;
                }
            }
            FieldSlot::Boxed(v) => {
                if v.as_deref().is_some_and(|x| !keep(x)) {
                    **v = None;
                }
            }
            FieldSlot::Many(v) => v.retain(|x| keep(x)),
            FieldSlot::ManyBoxed(v) => v.retain(|x| keep(x)),
        }
    }

    fn shape_error(&self, expected: &'static str, relation: &'static str) -> Error {
        Error::Type(TypeError {
            expected,
            actual: self.shape().to_string(),
            column: None,
            relation: Some(relation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(i64);

    #[test]
    fn test_to_one_slots() {
        let mut field: Option<Tag> = None;
        let mut slot = FieldSlot::One(&mut field);
        assert!(slot.is_empty());
        slot.set_one(Tag(1), "tag").unwrap();
        slot.set_one(Tag(2), "tag").unwrap();
        assert_eq!(slot.len(), 1);
        assert!(slot.push(Tag(3), "tag").is_err());
        slot.retain(|t| t.0 != 2);
        assert!(slot.is_empty());

        let mut boxed: Option<Box<Tag>> = None;
        let mut slot = FieldSlot::Boxed(&mut boxed);
        slot.set_one(Tag(7), "tag").unwrap();
        slot.get_mut(0).unwrap().0 = 8;
        assert_eq!(slot.get(0), Some(&Tag(8)));
        assert_eq!(boxed, Some(Box::new(Tag(8))));
    }

    #[test]
    fn test_collection_slots() {
        let mut tags = vec![Tag(1)];
        let mut slot = FieldSlot::Many(&mut tags);
        assert_eq!(slot.push(Tag(2), "tags").unwrap(), 1);
        assert_eq!(slot.values(), vec![&Tag(1), &Tag(2)]);
        match slot.set_one(Tag(3), "tags") {
            Err(Error::Type(te)) => {
                assert_eq!(te.expected, "single value");
                assert_eq!(te.actual, "collection");
                assert_eq!(te.relation, Some("tags"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        slot.retain(|t| t.0 == 2);
        assert_eq!(tags, vec![Tag(2)]);

        let mut boxed = vec![Box::new(Tag(4))];
        let mut slot = FieldSlot::ManyBoxed(&mut boxed);
        assert!(slot.is_collection());
        slot.clear();
        assert!(boxed.is_empty());
    }
}
