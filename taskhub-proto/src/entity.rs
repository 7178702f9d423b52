//! Entities: the humans and agents that claim and work on tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::skill::SkillSet;

/// Unique identifier for an entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of principal an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A human user, authenticated by email and password.
    Human,
    /// An autonomous agent, authenticated by API key.
    Agent,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A principal capable of being assigned tasks.
///
/// Humans and agents share one model; only the credential fields differ.
/// Credential fields never appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Whether this is a human or an agent.
    pub entity_type: EntityType,
    /// Contact email (required for humans, optional for agents).
    pub email: Option<String>,
    /// API key for agent authentication. Not serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Salted password hash for human authentication. Not serialized.
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// Skills this entity can apply to tasks.
    pub skills: SkillSet,
    /// Inactive entities cannot authenticate.
    pub is_active: bool,
    /// When the entity was registered.
    pub created_at: DateTime<Utc>,
}
