//! Identity tuples collected from entities.
//!
//! An identity is the ordered list of values of some key fields. Tuples whose
//! values are all zero are "unassigned" and never collected; duplicates are
//! dropped while keeping first-seen order.

use crate::model::FieldAccess;
use crate::value::Value;
use std::collections::HashSet;

/// Read `fields` from `entity`. Unknown fields read as NULL.
///
/// Returns `None` when every value is zero.
pub fn identity_of<E: FieldAccess + ?Sized>(entity: &E, fields: &[&str]) -> Option<Vec<Value>> {
    let values: Vec<Value> = fields
        .iter()
        .map(|f| entity.get(f).unwrap_or(Value::Null))
        .collect();
    if values.iter().all(Value::is_zero) {
        None
    } else {
        Some(values)
    }
}

/// Key string used to compare identity tuples.
pub fn identity_key(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::key_fragment)
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// De-duplicated identity tuples in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct IdentitySet {
    keys: HashSet<String>,
    tuples: Vec<Vec<Value>>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the identities of `entities` over `fields`.
    pub fn collect<'e, E, I>(entities: I, fields: &[&str]) -> Self
    where
        E: FieldAccess + ?Sized + 'e,
        I: IntoIterator<Item = &'e E>,
    {
        let mut set = Self::new();
        if fields.is_empty() {
            return set;
        }
        for entity in entities {
            if let Some(tuple) = identity_of(entity, fields) {
                set.insert(tuple);
            }
        }
        set
    }

    /// Add a tuple. Returns false if it was already present.
    pub fn insert(&mut self, tuple: Vec<Value>) -> bool {
        if self.keys.insert(identity_key(&tuple)) {
            self.tuples.push(tuple);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, tuple: &[Value]) -> bool {
        self.keys.contains(&identity_key(tuple))
    }

    /// Whether `entity`'s identity over `fields` is in the set.
    pub fn contains_entity<E: FieldAccess + ?Sized>(&self, entity: &E, fields: &[&str]) -> bool {
        identity_of(entity, fields).is_some_and(|t| self.contains(&t))
    }

    pub fn tuples(&self) -> &[Vec<Value>] {
        &self.tuples
    }

    pub fn into_tuples(self) -> Vec<Vec<Value>> {
        self.tuples
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}
