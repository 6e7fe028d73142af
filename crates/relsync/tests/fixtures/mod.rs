//! Models shared by the integration tests.
//!
//! `User` carries one relationship of every kind:
//!
//! - `company`: belongs-to `Company` through `users.company_id`
//! - `account`: has-one `Account` through `accounts.user_id` (boxed field)
//! - `pets`: has-many `Pet` through `pets.user_id`
//! - `languages`: many-to-many `Language` through `user_languages`, whose
//!   rows with a `deleted_at` are hidden unless unscoped
//! - `toys`: polymorphic has-many `Toy` pinned to `owner_type = 'users'`
//! - `team`: self-referencing has-many `User` through `users.manager_id`

#![allow(dead_code)]

use relsync::prelude::*;
use relsync::{JoinFilter, ModelSchema, TypeError};

fn unknown_field(table: &'static str, field: &str) -> Error {
    Error::Type(TypeError {
        expected: "declared field",
        actual: format!("no field '{field}' on '{table}'"),
        column: Some(field.to_string()),
        relation: None,
    })
}

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub company_id: Option<i64>,
    pub manager_id: Option<i64>,
    pub company: Option<Company>,
    pub account: Option<Box<Account>>,
    pub pets: Vec<Pet>,
    pub languages: Vec<Language>,
    pub toys: Vec<Toy>,
    pub team: Vec<User>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

fn user_language_fields() -> &'static [FieldInfo] {
    static FIELDS: &[FieldInfo] = &[
        FieldInfo::new("user_id", "user_id").primary_key(true),
        FieldInfo::new("language_code", "language_code").primary_key(true),
        FieldInfo::new("deleted_at", "deleted_at").nullable(true),
    ];
    FIELDS
}

pub const USER_LANGUAGES: ModelSchema = ModelSchema::new("user_languages", user_language_fields);

impl Model for User {
    const TABLE_NAME: &'static str = "users";
    const RELATIONSHIPS: &'static [Relationship] = &[
        Relationship::belongs_to::<User, Company>(
            "company",
            &[Reference::new("id", "company_id")],
        ),
        Relationship::has_one::<User, Account>("account", &[Reference::owned("id", "user_id")]),
        Relationship::has_many::<User, Pet>("pets", &[Reference::owned("id", "user_id")]),
        Relationship::many_to_many::<User, Language>(
            "languages",
            JoinTable::new(USER_LANGUAGES).with_filters(&[JoinFilter::IsNull("deleted_at")]),
            &[
                Reference::owned("id", "user_id"),
                Reference::new("code", "language_code"),
            ],
        ),
        Relationship::has_many::<User, Toy>(
            "toys",
            &[
                Reference::owned("id", "owner_id"),
                Reference::pinned("owner_type", "users"),
            ],
        ),
        Relationship::has_many::<User, User>("team", &[Reference::owned("id", "manager_id")]),
    ];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true).auto_increment(true),
            FieldInfo::new("name", "name"),
            FieldInfo::new("company_id", "company_id").nullable(true),
            FieldInfo::new("manager_id", "manager_id").nullable(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("company_id", self.company_id.into()),
            ("manager_id", self.manager_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            company_id: row.get_named("company_id")?,
            manager_id: row.get_named("manager_id")?,
            ..Self::default()
        })
    }
}

impl FieldAccess for User {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "company_id" => Some(self.company_id.into()),
            "manager_id" => Some(self.manager_id.into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            "company_id" => self.company_id = value.try_into()?,
            "manager_id" => self.manager_id = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

impl AssociationAccess<Company> for User {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, Company>> {
        match name {
            "company" => Some(FieldSlot::One(&mut self.company)),
            _ => None,
        }
    }
}

impl AssociationAccess<Account> for User {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, Account>> {
        match name {
            "account" => Some(FieldSlot::Boxed(&mut self.account)),
            _ => None,
        }
    }
}

impl AssociationAccess<Pet> for User {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, Pet>> {
        match name {
            "pets" => Some(FieldSlot::Many(&mut self.pets)),
            _ => None,
        }
    }
}

impl AssociationAccess<Language> for User {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, Language>> {
        match name {
            "languages" => Some(FieldSlot::Many(&mut self.languages)),
            _ => None,
        }
    }
}

impl AssociationAccess<Toy> for User {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, Toy>> {
        match name {
            "toys" => Some(FieldSlot::Many(&mut self.toys)),
            _ => None,
        }
    }
}

impl AssociationAccess<User> for User {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, User>> {
        match name {
            "team" => Some(FieldSlot::Many(&mut self.team)),
            _ => None,
        }
    }
}

// ============================================================================
// Company
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Company {
    pub id: Option<i64>,
    pub name: String,
}

impl Company {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

impl Model for Company {
    const TABLE_NAME: &'static str = "companies";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true).auto_increment(true),
            FieldInfo::new("name", "name"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }
}

impl FieldAccess for Company {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: Option<i64>,
    pub number: String,
    pub user_id: Option<i64>,
}

impl Account {
    pub fn new(number: &str) -> Self {
        Self {
            number: number.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Account {
    const TABLE_NAME: &'static str = "accounts";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true).auto_increment(true),
            FieldInfo::new("number", "number"),
            FieldInfo::new("user_id", "user_id").nullable(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("number", self.number.clone().into()),
            ("user_id", self.user_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            number: row.get_named("number")?,
            user_id: row.get_named("user_id")?,
        })
    }
}

impl FieldAccess for Account {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "number" => Some(self.number.clone().into()),
            "user_id" => Some(self.user_id.into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "number" => self.number = value.try_into()?,
            "user_id" => self.user_id = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

// ============================================================================
// Pet
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pet {
    pub id: Option<i64>,
    pub name: String,
    pub user_id: Option<i64>,
}

impl Pet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Pet {
    const TABLE_NAME: &'static str = "pets";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true).auto_increment(true),
            FieldInfo::new("name", "name"),
            FieldInfo::new("user_id", "user_id").nullable(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("user_id", self.user_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            user_id: row.get_named("user_id")?,
        })
    }
}

impl FieldAccess for Pet {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "user_id" => Some(self.user_id.into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            "user_id" => self.user_id = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

// ============================================================================
// Language
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Language {
    pub code: String,
    pub name: String,
}

impl Language {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

impl Model for Language {
    const TABLE_NAME: &'static str = "languages";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("code", "code").primary_key(true),
            FieldInfo::new("name", "name"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("code", self.code.clone().into()),
            ("name", self.name.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            code: row.get_named("code")?,
            name: row.get_named("name")?,
        })
    }
}

impl FieldAccess for Language {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "code" => Some(self.code.clone().into()),
            "name" => Some(self.name.clone().into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "code" => self.code = value.try_into()?,
            "name" => self.name = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

// ============================================================================
// Toy
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Toy {
    pub id: Option<i64>,
    pub name: String,
    pub owner_id: Option<i64>,
    pub owner_type: Option<String>,
}

impl Toy {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Toy {
    const TABLE_NAME: &'static str = "toys";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true).auto_increment(true),
            FieldInfo::new("name", "name"),
            FieldInfo::new("owner_id", "owner_id").nullable(true),
            FieldInfo::new("owner_type", "owner_type").nullable(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("owner_id", self.owner_id.into()),
            ("owner_type", self.owner_type.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            owner_id: row.get_named("owner_id")?,
            owner_type: row.get_named("owner_type")?,
        })
    }
}

impl FieldAccess for Toy {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "owner_id" => Some(self.owner_id.into()),
            "owner_type" => Some(self.owner_type.clone().into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            "owner_id" => self.owner_id = value.try_into()?,
            "owner_type" => self.owner_type = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

// ============================================================================
// Kennel (association field with the wrong shape)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kennel {
    pub id: Option<i64>,
    pub pets: Option<Pet>,
}

impl Model for Kennel {
    const TABLE_NAME: &'static str = "kennels";
    const RELATIONSHIPS: &'static [Relationship] = &[Relationship::has_many::<Kennel, Pet>(
        "pets",
        &[Reference::owned("id", "user_id")],
    )];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] =
            &[FieldInfo::new("id", "id").primary_key(true).auto_increment(true)];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            pets: None,
        })
    }
}

impl FieldAccess for Kennel {
    fn get(&self, field: &str) -> Option<Value> {
        (field == "id").then(|| self.id.into())
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = value.try_into()?,
            _ => return Err(unknown_field(Self::TABLE_NAME, field)),
        }
        Ok(())
    }
}

impl AssociationAccess<Pet> for Kennel {
    fn association_mut(&mut self, name: &str) -> Option<FieldSlot<'_, Pet>> {
        match name {
            "pets" => Some(FieldSlot::One(&mut self.pets)),
            _ => None,
        }
    }
}

// ============================================================================
// Store helpers
// ============================================================================

/// A store with every fixture table registered.
pub fn store() -> MemoryStore {
    MemoryStore::new()
        .with_model::<User>()
        .with_model::<Company>()
        .with_model::<Account>()
        .with_model::<Pet>()
        .with_model::<Language>()
        .with_model::<Toy>()
        .with_model::<Kennel>()
        .with_table(USER_LANGUAGES)
}

pub fn session() -> Session<MemoryStore> {
    Session::new(store())
}

/// Insert `name` into `users` and return it with its generated key.
pub fn saved_user(session: &mut Session<MemoryStore>, name: &str) -> User {
    let mut user = User::new(name);
    let generated = session
        .store_mut()
        .create(&User::schema(), &user.to_row(), &relsync::OnConflict::DoNothing)
        .unwrap();
    for (column, value) in generated {
        user.set(column, value).unwrap();
    }
    user
}

/// Names of `rows`, sorted.
pub fn names<'a>(rows: impl IntoIterator<Item = &'a Pet>) -> Vec<String> {
    let mut names: Vec<String> = rows.into_iter().map(|p| p.name.clone()).collect();
    names.sort();
    names
}

/// Codes of `languages`, sorted.
pub fn codes<'a>(languages: impl IntoIterator<Item = &'a Language>) -> Vec<String> {
    let mut codes: Vec<String> = languages.into_iter().map(|l| l.code.clone()).collect();
    codes.sort();
    codes
}
