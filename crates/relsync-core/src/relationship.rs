//! Relationship metadata.
//!
//! Relationships are declared as static metadata on each `Model` and are
//! read-only afterwards, so every association handle can share them.
//! References name *fields* (see [`FieldInfo::name`]); column names are
//! resolved through the endpoint's [`ModelSchema`].

use crate::Result;
use crate::error::{Error, SchemaErrorKind};
use crate::field::FieldInfo;
use crate::model::Model;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// The owning entity stores the foreign key: `Pet` belongs to `User`.
    BelongsTo,
    /// The related entity stores the foreign key, at most one of them.
    HasOne,
    /// The related entity stores the foreign key: `User` has many `Pet`s.
    HasMany,
    /// Both sides are linked through a join table.
    Many2Many,
}

impl RelationshipKind {
    /// Whether the association field holds a collection.
    pub const fn is_to_many(self) -> bool {
        matches!(self, RelationshipKind::HasMany | RelationshipKind::Many2Many)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::BelongsTo => "belongs_to",
            RelationshipKind::HasOne => "has_one",
            RelationshipKind::HasMany => "has_many",
            RelationshipKind::Many2Many => "many2many",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table and field metadata of one relationship endpoint.
#[derive(Clone, Copy)]
pub struct ModelSchema {
    /// Table name.
    pub table: &'static str,
    fields: fn() -> &'static [FieldInfo],
}

impl ModelSchema {
    /// Describe a table by name and field list.
    ///
    /// Join tables have no Rust type, so they are described this way.
    pub const fn new(table: &'static str, fields: fn() -> &'static [FieldInfo]) -> Self {
        Self { table, fields }
    }

    /// Schema of a model type.
    pub const fn of<M: Model>() -> Self {
        Self::new(M::TABLE_NAME, M::fields)
    }

    /// All fields, in declaration order.
    pub fn fields(&self) -> &'static [FieldInfo] {
        (self.fields)()
    }

    /// Look up a field by its Rust name.
    pub fn field(&self, name: &str) -> Option<&'static FieldInfo> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Primary key fields, in declaration order.
    pub fn primary_fields(&self) -> Vec<&'static FieldInfo> {
        self.fields().iter().filter(|f| f.primary_key).collect()
    }

    /// Names of the primary key fields.
    pub fn primary_field_names(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name)
            .collect()
    }

    /// Column names of the primary key fields.
    pub fn primary_columns(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.column_name)
            .collect()
    }

    /// Resolve a field name to its column name.
    pub fn column(&self, field: &str) -> Result<&'static str> {
        self.field(field).map(|f| f.column_name).ok_or_else(|| {
            Error::schema(
                SchemaErrorKind::ColumnNotFound,
                format!("field '{}' not found on '{}'", field, self.table),
            )
        })
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("table", &self.table)
            .field("fields", &self.fields().len())
            .finish()
    }
}

/// One foreign-key binding of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// Field on the primary side. `None` for pinned references.
    pub primary_key: Option<&'static str>,
    /// Field on the foreign side.
    pub foreign_key: &'static str,
    /// Whether the primary key lives on the owning entity.
    pub own_primary_key: bool,
    /// Constant the foreign key is pinned to instead of a primary key.
    pub primary_value: Option<&'static str>,
}

impl Reference {
    /// The other side's `primary_key` feeds the owning side's `foreign_key`.
    pub const fn new(primary_key: &'static str, foreign_key: &'static str) -> Self {
        Self {
            primary_key: Some(primary_key),
            foreign_key,
            own_primary_key: false,
            primary_value: None,
        }
    }

    /// The owning side's `primary_key` feeds the foreign table's `foreign_key`.
    pub const fn owned(primary_key: &'static str, foreign_key: &'static str) -> Self {
        Self {
            primary_key: Some(primary_key),
            foreign_key,
            own_primary_key: true,
            primary_value: None,
        }
    }

    /// `foreign_key` always holds `value` (polymorphic type columns).
    pub const fn pinned(foreign_key: &'static str, value: &'static str) -> Self {
        Self {
            primary_key: None,
            foreign_key,
            own_primary_key: false,
            primary_value: Some(value),
        }
    }

    pub const fn is_pinned(&self) -> bool {
        self.primary_value.is_some()
    }
}

/// Default filter applied to a join table when querying through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinFilter {
    IsNull(&'static str),
    IsNotNull(&'static str),
    /// Column equals a text constant.
    Equals(&'static str, &'static str),
    /// Column equals an integer constant.
    EqualsInt(&'static str, i64),
}

impl JoinFilter {
    pub const fn column(&self) -> &'static str {
        match self {
            JoinFilter::IsNull(c)
            | JoinFilter::IsNotNull(c)
            | JoinFilter::Equals(c, _)
            | JoinFilter::EqualsInt(c, _) => c,
        }
    }
}

/// Join table of a many-to-many relationship.
#[derive(Debug, Clone, Copy)]
pub struct JoinTable {
    pub schema: ModelSchema,
    /// Filters added to Find/Count unless the session is unscoped.
    pub filters: &'static [JoinFilter],
}

impl JoinTable {
    pub const fn new(schema: ModelSchema) -> Self {
        Self {
            schema,
            filters: &[],
        }
    }

    /// Set the default filters (builder pattern).
    pub const fn with_filters(mut self, filters: &'static [JoinFilter]) -> Self {
        self.filters = filters;
        self
    }
}

/// Metadata about a relationship between models.
#[derive(Debug, Clone, Copy)]
pub struct Relationship {
    /// Name of the association field on the owning entity.
    pub name: &'static str,
    pub kind: RelationshipKind,
    /// The owning entity.
    pub schema: ModelSchema,
    /// The related entity.
    pub field_schema: ModelSchema,
    pub references: &'static [Reference],
    pub join_table: Option<JoinTable>,
}

/// References split by which side feeds the foreign table.
#[derive(Debug, Default)]
pub struct ReferenceSets<'r> {
    /// Owning-side primary keys feed the foreign table.
    pub own: Vec<&'r Reference>,
    /// Related-side primary keys feed the foreign table.
    pub related: Vec<&'r Reference>,
    /// Foreign key pinned to a constant.
    pub pinned: Vec<&'r Reference>,
}

impl Relationship {
    /// Create a relationship with no join table.
    pub const fn new(
        name: &'static str,
        kind: RelationshipKind,
        schema: ModelSchema,
        field_schema: ModelSchema,
        references: &'static [Reference],
    ) -> Self {
        Self {
            name,
            kind,
            schema,
            field_schema,
            references,
            join_table: None,
        }
    }

    /// `S` stores the foreign key(s) pointing at `T`.
    pub const fn belongs_to<S: Model, T: Model>(
        name: &'static str,
        references: &'static [Reference],
    ) -> Self {
        Self::new(
            name,
            RelationshipKind::BelongsTo,
            ModelSchema::of::<S>(),
            ModelSchema::of::<T>(),
            references,
        )
    }

    /// `T` stores the foreign key(s) pointing at `S`; at most one `T`.
    pub const fn has_one<S: Model, T: Model>(
        name: &'static str,
        references: &'static [Reference],
    ) -> Self {
        Self::new(
            name,
            RelationshipKind::HasOne,
            ModelSchema::of::<S>(),
            ModelSchema::of::<T>(),
            references,
        )
    }

    /// `T` stores the foreign key(s) pointing at `S`.
    pub const fn has_many<S: Model, T: Model>(
        name: &'static str,
        references: &'static [Reference],
    ) -> Self {
        Self::new(
            name,
            RelationshipKind::HasMany,
            ModelSchema::of::<S>(),
            ModelSchema::of::<T>(),
            references,
        )
    }

    /// `S` and `T` are linked through `join_table`.
    pub const fn many_to_many<S: Model, T: Model>(
        name: &'static str,
        join_table: JoinTable,
        references: &'static [Reference],
    ) -> Self {
        Self::new(
            name,
            RelationshipKind::Many2Many,
            ModelSchema::of::<S>(),
            ModelSchema::of::<T>(),
            references,
        )
        .join_table(join_table)
    }

    /// Set the join table.
    pub const fn join_table(mut self, join_table: JoinTable) -> Self {
        self.join_table = Some(join_table);
        self
    }

    /// Schema holding the reference's primary key.
    pub fn primary_schema(&self, reference: &Reference) -> &ModelSchema {
        if reference.own_primary_key {
            &self.schema
        } else {
            &self.field_schema
        }
    }

    /// Schema holding the reference's foreign key.
    pub fn foreign_schema(&self, reference: &Reference) -> &ModelSchema {
        match &self.join_table {
            Some(jt) => &jt.schema,
            None if reference.own_primary_key || reference.is_pinned() => &self.field_schema,
            None => &self.schema,
        }
    }

    /// Column name of the reference's foreign key.
    pub fn foreign_column(&self, reference: &Reference) -> Result<&'static str> {
        self.foreign_schema(reference).column(reference.foreign_key)
    }

    /// Column name of the reference's primary key.
    pub fn primary_column(&self, reference: &Reference) -> Result<&'static str> {
        let field = reference.primary_key.ok_or_else(|| {
            Error::schema(
                SchemaErrorKind::Invalid,
                format!(
                    "pinned reference '{}' of '{}' has no primary key",
                    reference.foreign_key, self.name
                ),
            )
        })?;
        self.primary_schema(reference).column(field)
    }

    /// Split references into own, related and pinned.
    pub fn partition(&self) -> ReferenceSets<'_> {
        let mut sets = ReferenceSets::default();
        for reference in self.references {
            if reference.is_pinned() {
                sets.pinned.push(reference);
            } else if reference.own_primary_key {
                sets.own.push(reference);
            } else {
                sets.related.push(reference);
            }
        }
        sets
    }

    /// Check that kind, references and join table agree and that every
    /// referenced field exists.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Error::schema(SchemaErrorKind::Invalid, msg);

        match (self.kind, &self.join_table) {
            (RelationshipKind::Many2Many, None) => {
                return Err(invalid(format!(
                    "many2many relationship '{}' has no join table",
                    self.name
                )));
            }
            (kind, Some(_)) if kind != RelationshipKind::Many2Many => {
                return Err(invalid(format!(
                    "{} relationship '{}' cannot have a join table",
                    kind, self.name
                )));
            }
            _ => {}
        }
        if self.references.is_empty() {
            return Err(invalid(format!(
                "relationship '{}' has no references",
                self.name
            )));
        }

        check_identifier(self.schema.table)?;
        check_identifier(self.field_schema.table)?;
        if let Some(jt) = &self.join_table {
            check_identifier(jt.schema.table)?;
            for filter in jt.filters {
                jt.schema
                    .fields()
                    .iter()
                    .find(|f| f.column_name == filter.column())
                    .ok_or_else(|| {
                        Error::schema(
                            SchemaErrorKind::ColumnNotFound,
                            format!(
                                "join filter column '{}' not found on '{}'",
                                filter.column(),
                                jt.schema.table
                            ),
                        )
                    })?;
            }
        }

        for reference in self.references {
            match (reference.primary_key, reference.primary_value) {
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "reference '{}' of '{}' is both pinned and keyed",
                        reference.foreign_key, self.name
                    )));
                }
                (None, None) => {
                    return Err(invalid(format!(
                        "reference '{}' of '{}' has neither a primary key nor a value",
                        reference.foreign_key, self.name
                    )));
                }
                (Some(_), None) => {
                    check_identifier(self.primary_column(reference)?)?;
                }
                (None, Some(_)) => {}
            }
            check_identifier(self.foreign_column(reference)?)?;
        }

        let sets = self.partition();
        match self.kind {
            RelationshipKind::BelongsTo
                if !sets.own.is_empty() || sets.related.is_empty() || !sets.pinned.is_empty() =>
            {
                Err(invalid(format!(
                    "belongs_to relationship '{}' must be keyed by the related primary key",
                    self.name
                )))
            }
            RelationshipKind::HasOne | RelationshipKind::HasMany
                if !sets.related.is_empty() || sets.own.is_empty() =>
            {
                Err(invalid(format!(
                    "{} relationship '{}' must be keyed by the owning primary key",
                    self.kind, self.name
                )))
            }
            RelationshipKind::Many2Many if sets.own.is_empty() || sets.related.is_empty() => {
                Err(invalid(format!(
                    "many2many relationship '{}' needs keys from both sides",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Compiled identifier pattern, cached for the lifetime of the program.
fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$") {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "Identifier pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Table and column names must be plain SQL identifiers.
pub fn check_identifier(name: &str) -> Result<()> {
    if identifier_pattern().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(Error::schema(
            SchemaErrorKind::Identifier,
            format!("'{}' is not a valid identifier", name),
        ))
    }
}

/// Find a relationship by association name on a model.
pub fn find_relationship<M: Model>(name: &str) -> Option<&'static Relationship> {
    M::RELATIONSHIPS.iter().find(|r| r.name == name)
}
