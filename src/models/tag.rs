use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shared label, globally unique by value.
///
/// Tags are reference counted: one with no remaining attachment is removed
/// the moment its last attachment goes away, so an unreferenced tag never
/// survives outside a single detach operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// The five kinds of entities a tag can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TagSubject {
    User(Uuid),
    Group(Uuid),
    Policy(Uuid),
    Element(Uuid),
    Environment(Uuid),
}

impl TagSubject {
    pub fn kind(&self) -> &'static str {
        match self {
            TagSubject::User(_) => "user",
            TagSubject::Group(_) => "group",
            TagSubject::Policy(_) => "policy",
            TagSubject::Element(_) => "element",
            TagSubject::Environment(_) => "environment",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            TagSubject::User(id)
            | TagSubject::Group(id)
            | TagSubject::Policy(id)
            | TagSubject::Element(id)
            | TagSubject::Environment(id) => *id,
        }
    }
}
