//! Credential handling: password hashing, bearer-token sessions, and
//! API-key resolution.
//!
//! Humans register with an email and password and exchange them for a
//! bearer token; agents hold a long-lived API key minted at registration.
//! Either credential resolves to the same [`Entity`] record, and a
//! deactivated entity is rejected regardless of which credential it
//! presents.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use taskhub_proto::entity::{Entity, EntityId};

use crate::error::ApiError;
use crate::store::Store;

/// Hashes a password with a per-entity random salt.
///
/// Format is `salt$hex(sha256(salt + password))`; the salt travels with
/// the hash so verification needs no extra storage.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::now_v7().simple().to_string();
    let digest = salted_digest(&salt, password);
    format!("{salt}${digest}")
}

/// Checks a password against a stored `salt$digest` hash.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once('$') else {
        return false;
    };
    salted_digest(salt, password) == digest
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Mints a fresh API key for an agent registration.
#[must_use]
pub fn mint_api_key() -> String {
    format!("thk_{}", Uuid::now_v7().simple())
}

/// Resolves credentials to entities and manages login sessions.
pub struct Authenticator {
    sessions: RwLock<HashMap<String, EntityId>>,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator {
    /// Creates an authenticator with no live sessions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Verifies an email/password pair and opens a session.
    ///
    /// Returns the bearer token the caller should present on later
    /// requests.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthenticated`] for an unknown email or a
    /// wrong password, and [`ApiError::Inactive`] for a deactivated
    /// entity.
    pub async fn login(
        &self,
        store: &Store,
        email: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let entity = store
            .entity_by_email(email)
            .await
            .ok_or(ApiError::Unauthenticated)?;
        let ok = entity
            .password_hash
            .as_deref()
            .is_some_and(|stored| verify_password(password, stored));
        if !ok {
            return Err(ApiError::Unauthenticated);
        }
        if !entity.is_active {
            return Err(ApiError::Inactive);
        }
        let token = Uuid::now_v7().simple().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), entity.id);
        drop(sessions);
        Ok(token)
    }

    /// Resolves a bearer token to its entity.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthenticated`] for an unknown token or a
    /// session whose entity no longer exists, and [`ApiError::Inactive`]
    /// if the entity was deactivated after login.
    pub async fn entity_for_token(&self, store: &Store, token: &str) -> Result<Entity, ApiError> {
        let sessions = self.sessions.read().await;
        let entity_id = sessions
            .get(token)
            .copied()
            .ok_or(ApiError::Unauthenticated)?;
        drop(sessions);
        let entity = store
            .get_entity(entity_id)
            .await
            .map_err(|_| ApiError::Unauthenticated)?;
        Self::require_active(entity)
    }

    /// Resolves an API key to its entity.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthenticated`] for an unknown key and
    /// [`ApiError::Inactive`] for a deactivated entity.
    pub async fn entity_for_api_key(&self, store: &Store, key: &str) -> Result<Entity, ApiError> {
        let entity = store
            .entity_by_api_key(key)
            .await
            .ok_or(ApiError::Unauthenticated)?;
        Self::require_active(entity)
    }

    fn require_active(entity: Entity) -> Result<Entity, ApiError> {
        if entity.is_active {
            Ok(entity)
        } else {
            Err(ApiError::Inactive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhub_proto::entity::EntityType;
    use taskhub_proto::skill::SkillSet;

    use crate::store::NewEntity;

    async fn human(store: &Store, email: &str, password: &str) -> Entity {
        store
            .create_entity(NewEntity {
                name: "alice".to_string(),
                entity_type: EntityType::Human,
                email: Some(email.to_string()),
                api_key: None,
                password_hash: Some(hash_password(password)),
                skills: SkillSet::new(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "no-separator-here"));
    }

    #[test]
    fn api_keys_are_unique() {
        assert_ne!(mint_api_key(), mint_api_key());
    }

    #[tokio::test]
    async fn login_yields_usable_token() {
        let store = Store::new();
        let auth = Authenticator::new();
        let entity = human(&store, "alice@example.com", "secret").await;

        let token = auth
            .login(&store, "alice@example.com", "secret")
            .await
            .unwrap();
        let resolved = auth.entity_for_token(&store, &token).await.unwrap();
        assert_eq!(resolved.id, entity.id);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let store = Store::new();
        let auth = Authenticator::new();
        human(&store, "alice@example.com", "secret").await;

        let err = auth
            .login(&store, "alice@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn unknown_email_is_rejected() {
        let store = Store::new();
        let auth = Authenticator::new();
        let err = auth
            .login(&store, "nobody@example.com", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let store = Store::new();
        let auth = Authenticator::new();
        let err = auth
            .entity_for_token(&store, "bogus")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn api_key_resolves_agent() {
        let store = Store::new();
        let auth = Authenticator::new();
        let key = mint_api_key();
        let agent = store
            .create_entity(NewEntity {
                name: "bot".to_string(),
                entity_type: EntityType::Agent,
                email: None,
                api_key: Some(key.clone()),
                password_hash: None,
                skills: SkillSet::new(),
            })
            .await
            .unwrap();

        let resolved = auth.entity_for_api_key(&store, &key).await.unwrap();
        assert_eq!(resolved.id, agent.id);

        let err = auth
            .entity_for_api_key(&store, "thk_bogus")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }
}
