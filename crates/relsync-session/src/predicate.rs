//! Predicate synthesis from relationship references.
//!
//! Each reference of a relationship contributes one of:
//!
//! - an **own** key: the foreign table's FK column matched against the
//!   sources' primary keys;
//! - a **pinned** constant: equality of the FK column with the constant;
//! - a **related** key without join table (belongs-to): the related table's
//!   PK column matched against the sources' FK values;
//! - a **related** key with join table: `join.fk = related.pk`.
//!
//! Keys are collected across every source into one membership predicate. An
//! empty identity set yields a membership that never matches.

use relsync_core::{FieldAccess, IdentitySet, Relationship, Result};
use relsync_query::Expr;

/// Derive the WHERE (or join ON) conditions selecting the sources' related rows.
pub fn query_conditions<S: FieldAccess>(rel: &Relationship, sources: &[S]) -> Result<Vec<Expr>> {
    let table = rel
        .join_table
        .as_ref()
        .map_or(rel.field_schema.table, |jt| jt.schema.table);

    let mut conds = Vec::new();
    let mut source_fields = Vec::new();
    let mut key_columns = Vec::new();

    for reference in rel.references {
        if reference.own_primary_key {
            if let Some(primary_key) = reference.primary_key {
                source_fields.push(primary_key);
                key_columns.push(rel.foreign_column(reference)?);
            }
        } else if let Some(value) = reference.primary_value {
            conds.push(Expr::qualified(table, rel.foreign_column(reference)?).eq(value));
        } else if rel.join_table.is_some() {
            conds.push(
                Expr::qualified(table, rel.foreign_column(reference)?).eq(Expr::qualified(
                    rel.field_schema.table,
                    rel.primary_column(reference)?,
                )),
            );
        } else {
            source_fields.push(reference.foreign_key);
            key_columns.push(rel.primary_column(reference)?);
        }
    }

    if !key_columns.is_empty() {
        let identities = IdentitySet::collect(sources.iter(), &source_fields);
        conds.push(Expr::membership(table, &key_columns, identities.into_tuples()));
    }
    Ok(conds)
}

/// Membership of `columns` of `table` in the identities of `entities` over
/// `fields`. `None` when no entity carries a non-zero identity.
pub(crate) fn membership<'e, E>(
    table: &str,
    columns: &[&str],
    entities: impl IntoIterator<Item = &'e E>,
    fields: &[&str],
) -> Option<Expr>
where
    E: FieldAccess + 'e,
{
    let identities = IdentitySet::collect(entities, fields);
    if identities.is_empty() {
        None
    } else {
        Some(Expr::membership(table, columns, identities.into_tuples()))
    }
}

/// Like [`membership`], but an empty identity set gives a membership that
/// never matches.
pub(crate) fn membership_or_none<'e, E>(
    table: &str,
    columns: &[&str],
    entities: impl IntoIterator<Item = &'e E>,
    fields: &[&str],
) -> Expr
where
    E: FieldAccess + 'e,
{
    membership(table, columns, entities, fields)
        .unwrap_or_else(|| Expr::membership(table, columns, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_core::{
        FieldInfo, JoinTable, Model, ModelSchema, Reference, RelationshipKind, Row, Value,
    };

    #[derive(Debug, Clone, Default)]
    struct Owner {
        id: Option<i64>,
        code: Option<String>,
        team_id: Option<i64>,
    }

    #[derive(Debug, Clone, Default)]
    struct Item {
        id: Option<i64>,
    }

    impl FieldAccess for Owner {
        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "id" => Some(self.id.into()),
                "code" => Some(self.code.clone().into()),
                "team_id" => Some(self.team_id.into()),
                _ => None,
            }
        }

        fn set(&mut self, _field: &str, _value: Value) -> Result<()> {
            Ok(())
        }
    }

    impl Model for Owner {
        const TABLE_NAME: &'static str = "owners";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id").primary_key(true),
                FieldInfo::new("code", "code"),
                FieldInfo::new("team_id", "team_id").nullable(true),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Self::default())
        }
    }

    impl Model for Item {
        const TABLE_NAME: &'static str = "items";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id").primary_key(true),
                FieldInfo::new("owner_id", "owner_id"),
                FieldInfo::new("owner_type", "owner_type"),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into())]
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Self::default())
        }
    }

    fn link_fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("owner_id", "owner_id"),
            FieldInfo::new("item_id", "item_id"),
        ];
        FIELDS
    }

    fn render(exprs: &[Expr]) -> Vec<String> {
        exprs
            .iter()
            .map(|e| {
                let mut params = Vec::new();
                e.build(&mut params, 0)
            })
            .collect()
    }

    fn owners(ids: &[Option<i64>]) -> Vec<Owner> {
        ids.iter()
            .map(|id| Owner {
                id: *id,
                ..Owner::default()
            })
            .collect()
    }

    #[test]
    fn test_own_and_pinned_references() {
        const REL: Relationship = Relationship::has_many::<Owner, Item>(
            "items",
            &[
                Reference::owned("id", "owner_id"),
                Reference::pinned("owner_type", "owners"),
            ],
        );
        let conds = query_conditions(&REL, &owners(&[Some(1), Some(2), Some(1), None])).unwrap();
        assert_eq!(
            render(&conds),
            vec![
                "\"items\".\"owner_type\" = $1",
                "\"items\".\"owner_id\" IN ($1, $2)"
            ]
        );
        match &conds[1] {
            Expr::In { values, .. } => assert_eq!(values.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_belongs_to_matches_related_primary_key() {
        const REL: Relationship =
            Relationship::belongs_to::<Owner, Item>("team", &[Reference::new("id", "team_id")]);
        let source = Owner {
            id: Some(1),
            team_id: Some(9),
            ..Owner::default()
        };
        let conds = query_conditions(&REL, &[source]).unwrap();
        assert_eq!(conds.len(), 1);
        assert_eq!(
            conds[0],
            Expr::membership("items", &["id"], vec![vec![Value::BigInt(9)]])
        );
    }

    #[test]
    fn test_join_table_conditions() {
        const REL: Relationship = Relationship::many_to_many::<Owner, Item>(
            "items",
            JoinTable::new(ModelSchema::new("owner_items", link_fields)),
            &[
                Reference::owned("id", "owner_id"),
                Reference::new("id", "item_id"),
            ],
        );
        let conds = query_conditions(&REL, &owners(&[Some(4)])).unwrap();
        assert_eq!(
            render(&conds),
            vec![
                "\"owner_items\".\"item_id\" = \"items\".\"id\"",
                "\"owner_items\".\"owner_id\" IN ($1)"
            ]
        );
    }

    #[test]
    fn test_unkeyed_sources_never_match() {
        const REL: Relationship = Relationship::has_many::<Owner, Item>(
            "items",
            &[Reference::owned("id", "owner_id")],
        );
        let conds = query_conditions(&REL, &owners(&[None, Some(0)])).unwrap();
        assert_eq!(render(&conds), vec!["1 = 0"]);
        assert_eq!(REL.kind, RelationshipKind::HasMany);
    }

    #[test]
    fn test_membership_helpers() {
        let sources = owners(&[None]);
        assert!(membership("owners", &["id"], sources.iter(), &["id"]).is_none());
        let expr = membership_or_none("owners", &["id"], sources.iter(), &["id"]);
        assert_eq!(expr, Expr::membership("owners", &["id"], Vec::new()));
    }
}
