use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use crate::error::ShareError;

/// Number of characters that identify a record; longer ids carry a checksum suffix.
pub const ENTITY_ID_PREFIX_LEN: usize = 15;
/// Length of the checksum-extended identifier form.
pub const ENTITY_ID_EXTENDED_LEN: usize = 18;

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_newtype!(CaseId);
string_newtype!(OwnerId);

/// Compares two record identifiers.
///
/// Identifiers of at least 15 characters are equal when their first 15 characters
/// match, so an 18-character id equals its 15-character form. Anything shorter
/// falls back to exact comparison. Comparison is case-sensitive.
pub fn entity_ref_equals(a: &str, b: &str) -> bool {
    match (id_prefix(a), id_prefix(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn id_prefix(id: &str) -> Option<&str> {
    id.char_indices()
        .nth(ENTITY_ID_PREFIX_LEN)
        .map(|(end, _)| &id[..end])
        .or_else(|| (id.chars().count() == ENTITY_ID_PREFIX_LEN).then_some(id))
}

/// Identifier of a user or group that may hold a share record.
///
/// Equality and hashing follow [`entity_ref_equals`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an identifier that came from the store; no format check.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Validates user input: the identifier must be exactly 15 or 18 characters.
    pub fn parse(input: &str) -> Result<Self, ShareError> {
        let length = input.chars().count();
        if length != ENTITY_ID_PREFIX_LEN && length != ENTITY_ID_EXTENDED_LEN {
            return Err(ShareError::InvalidIdFormat {
                input: input.to_string(),
                length,
            });
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 15-character comparison key, or the whole id when it is shorter.
    pub fn comparison_key(&self) -> &str {
        id_prefix(&self.0).unwrap_or(&self.0)
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        entity_ref_equals(&self.0, &other.0)
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparison_key().hash(state);
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            is_owner: false,
            name: None,
            kind: EntityKind::User,
        }
    }

    pub fn owner(id: impl Into<String>) -> Self {
        Self {
            is_owner: true,
            ..Self::new(id)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }
}

/// The entities currently loaded for one case, in store order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEntitySet {
    pub case_id: CaseId,
    pub entities: Vec<EntityRef>,
}

impl ShareEntitySet {
    pub fn new(case_id: CaseId, entities: Vec<EntityRef>) -> Self {
        Self { case_id, entities }
    }

    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.entities.iter().any(|entity| &entity.id == entity_id)
    }

    pub fn replace(&mut self, entities: Vec<EntityRef>) {
        self.entities = entities;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub id: CaseId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Routing key for bus delivery: the page or context a component lives in.
///
/// `Global` is the wildcard and is compatible with every scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Page(String),
}

impl Scope {
    pub fn page(key: impl Into<String>) -> Self {
        Self::Page(key.into())
    }

    /// A page scope with a freshly generated key.
    pub fn new_page() -> Self {
        Self::Page(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_compatible(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Global, _) | (_, Scope::Global) => true,
            (Scope::Page(a), Scope::Page(b)) => a == b,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("*"),
            Scope::Page(key) => f.write_str(key),
        }
    }
}
