//! Security primitives (spec §4.8): users, credentials, sessions, roles,
//! and permissions, all expressed as shape rules over ordinary entities —
//! there is no separate auth engine bolted onto the side of the store.

use crate::entity::{Entity, EntityId, NewEntity};
use crate::error::{CoreError, CoreResult};
use crate::relationship::Relationship;
use crate::repository::{now_nanos, Repository};
use uuid::Uuid;

/// Tag body marking a user entity.
pub const TAG_TYPE_USER: &str = "type:user";
/// Tag body marking a credential entity.
pub const TAG_TYPE_CREDENTIAL: &str = "type:credential";
/// Tag body marking a session entity.
pub const TAG_TYPE_SESSION: &str = "type:session";
/// Tag body marking a role entity.
pub const TAG_TYPE_ROLE: &str = "type:role";
/// Tag body marking a permission entity.
pub const TAG_TYPE_PERMISSION: &str = "type:permission";
/// Tag body a newly created, enabled user carries.
pub const TAG_STATUS_ACTIVE: &str = "status:active";
/// Relationship kind linking a user to its credential.
pub const RELATIONSHIP_HAS_CREDENTIAL: &str = "has_credential";
/// Relationship kind linking a role to a permission it grants.
pub const RELATIONSHIP_HAS_PERMISSION: &str = "has_permission";

const IDENTITY_USERNAME_PREFIX: &str = "identity:username:";
const IDENTITY_ROLE_PREFIX: &str = "identity:role:";
const RBAC_ROLE_PREFIX: &str = "rbac:role:";
const SALT_PREFIX: &str = "salt:";
const ALGORITHM_BCRYPT: &str = "algorithm:bcrypt";
const USER_PREFIX: &str = "user:";
const EXPIRES_PREFIX: &str = "expires:";
const RESOURCE_PREFIX: &str = "resource:";
const ACTION_PREFIX: &str = "action:";

/// Generic failure message returned for every authentication failure
/// (unknown username, inactive user, missing credential, wrong password)
/// so a caller can't distinguish which check failed from the error alone.
const AUTH_FAILED: &str = "authentication failed";

impl Repository {
    /// Creates a `type:user` entity (spec §4.8 "User entity") with the
    /// given username and initial `rbac:role:` assignments.
    ///
    /// # Errors
    ///
    /// Propagates any [`Repository::create`] error.
    pub fn create_user(&self, username: &str, roles: &[&str]) -> CoreResult<Entity> {
        let mut tags = vec![
            TAG_TYPE_USER.to_string(),
            format!("{IDENTITY_USERNAME_PREFIX}{username}"),
            TAG_STATUS_ACTIVE.to_string(),
        ];
        tags.extend(roles.iter().map(|r| format!("{RBAC_ROLE_PREFIX}{r}")));
        self.create(NewEntity::new(tags, None))
    }

    /// Creates a bcrypt-hashed credential entity for `user_id` and links
    /// it with a `has_credential` relationship (spec §4.8 "Credential
    /// entity"). The stored content is `bcrypt(password ++ salt)`; `salt`
    /// is random per credential and persisted alongside it as a tag, not
    /// derived from bcrypt's own embedded salt.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Invalid`] if bcrypt hashing fails, or
    /// propagates any [`Repository::create`]/[`Repository::create_relationship`]
    /// error.
    pub fn create_credential(&self, user_id: &EntityId, password: &str) -> CoreResult<Entity> {
        let salt = Uuid::new_v4().simple().to_string();
        let hash = hash_password(password, &salt)?;
        let credential = self.create(NewEntity::new(
            vec![
                TAG_TYPE_CREDENTIAL.to_string(),
                ALGORITHM_BCRYPT.to_string(),
                format!("{SALT_PREFIX}{salt}"),
            ],
            Some(hash.into_bytes()),
        ))?;
        self.create_relationship(user_id, &credential.id, RELATIONSHIP_HAS_CREDENTIAL)?;
        Ok(credential)
    }

    /// Authenticates a username/password pair (spec §4.8 "Authentication
    /// algorithm"): finds the active user with this username, follows its
    /// live `has_credential` edge, and bcrypt-verifies `password ++ salt`
    /// against the credential's content.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Invalid`] on any authentication failure; the
    /// message never reveals which step failed.
    pub fn authenticate(&self, username: &str, password: &str) -> CoreResult<Entity> {
        let candidates = self.list_by_tag(&format!("{IDENTITY_USERNAME_PREFIX}{username}"))?;
        let user = candidates
            .into_iter()
            .find(|u| u.has_current_tag(TAG_STATUS_ACTIVE))
            .ok_or_else(|| CoreError::invalid(AUTH_FAILED))?;

        let credential = self
            .get_relationships_by_source_and_kind(&user.id, RELATIONSHIP_HAS_CREDENTIAL)?
            .into_iter()
            .find_map(|r| self.get_by_id(&r.target).ok())
            .ok_or_else(|| CoreError::invalid(AUTH_FAILED))?;

        let salt = credential
            .current_suffixes(SALT_PREFIX)
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::invalid(AUTH_FAILED))?;
        let stored_hash = credential
            .content
            .as_deref()
            .and_then(|c| std::str::from_utf8(c).ok())
            .ok_or_else(|| CoreError::invalid(AUTH_FAILED))?;

        if verify_password(password, &salt, stored_hash)? {
            Ok(user)
        } else {
            Err(CoreError::invalid(AUTH_FAILED))
        }
    }

    /// Issues a session entity for an already-authenticated user (spec
    /// §4.8 "Session entity"). `token_hash` is the caller's own hash of
    /// the bearer token it hands back to its client; the raw token itself
    /// is never persisted.
    ///
    /// # Errors
    ///
    /// Propagates any [`Repository::create`] error.
    pub fn create_session(
        &self,
        user_id: &EntityId,
        token_hash: Vec<u8>,
        ttl_nanos: i64,
    ) -> CoreResult<Entity> {
        let expires = now_nanos() + ttl_nanos;
        self.create(NewEntity::new(
            vec![
                TAG_TYPE_SESSION.to_string(),
                format!("{USER_PREFIX}{user_id}"),
                format!("{EXPIRES_PREFIX}{expires}"),
            ],
            Some(token_hash),
        ))
    }

    /// Returns the session entity if it is live and has not passed its
    /// `expires:` timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the session was deleted,
    /// [`CoreError::Corrupt`] if it has no `expires:` tag, or
    /// [`CoreError::Invalid`] if it has expired.
    pub fn validate_session(&self, session_id: &EntityId) -> CoreResult<Entity> {
        let session = self.get_by_id(session_id)?;
        let expires: i64 = session
            .current_suffixes(EXPIRES_PREFIX)
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::corrupt("expires", "session missing expires tag"))?
            .parse()
            .map_err(|_| CoreError::corrupt("expires", "session expires tag is not numeric"))?;
        if now_nanos() >= expires {
            return Err(CoreError::invalid("session expired"));
        }
        Ok(session)
    }

    /// Creates a `type:role` entity addressable by name via
    /// `identity:role:<name>`.
    ///
    /// # Errors
    ///
    /// Propagates any [`Repository::create`] error.
    pub fn create_role(&self, name: &str) -> CoreResult<Entity> {
        self.create(NewEntity::new(
            vec![TAG_TYPE_ROLE.to_string(), format!("{IDENTITY_ROLE_PREFIX}{name}")],
            None,
        ))
    }

    /// Creates a `type:permission` entity for a `resource`/`action` pair.
    ///
    /// # Errors
    ///
    /// Propagates any [`Repository::create`] error.
    pub fn create_permission(&self, resource: &str, action: &str) -> CoreResult<Entity> {
        self.create(NewEntity::new(
            vec![
                TAG_TYPE_PERMISSION.to_string(),
                format!("{RESOURCE_PREFIX}{resource}"),
                format!("{ACTION_PREFIX}{action}"),
            ],
            None,
        ))
    }

    /// Grants `permission_id` to `role_id` via a `has_permission` edge.
    ///
    /// # Errors
    ///
    /// Propagates any [`Repository::create_relationship`] error.
    pub fn grant_permission(
        &self,
        role_id: &EntityId,
        permission_id: &EntityId,
    ) -> CoreResult<Relationship> {
        self.create_relationship(role_id, permission_id, RELATIONSHIP_HAS_PERMISSION)
    }

    /// Checks whether `user_id` currently has permission to perform
    /// `action` on `resource` (spec §4.8 "Permission check"): true iff the
    /// user carries some `rbac:role:<r>` tag whose `identity:role:<r>`
    /// entity has a live `has_permission` edge to a permission entity
    /// matching both `resource` and `action`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `user_id` does not name a live
    /// entity.
    pub fn user_has_permission(
        &self,
        user_id: &EntityId,
        resource: &str,
        action: &str,
    ) -> CoreResult<bool> {
        let user = self.get_by_id(user_id)?;
        let resource_tag = format!("{RESOURCE_PREFIX}{resource}");
        let action_tag = format!("{ACTION_PREFIX}{action}");

        for role_name in user.current_suffixes(RBAC_ROLE_PREFIX) {
            let roles = self.list_by_tag(&format!("{IDENTITY_ROLE_PREFIX}{role_name}"))?;
            for role in roles {
                let grants = self.get_relationships_by_source_and_kind(&role.id, RELATIONSHIP_HAS_PERMISSION)?;
                for grant in grants {
                    if let Ok(permission) = self.get_by_id(&grant.target) {
                        if permission.has_current_tag(&resource_tag) && permission.has_current_tag(&action_tag) {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Bcrypt-hashes `password ++ salt`.
fn hash_password(password: &str, salt: &str) -> CoreResult<String> {
    bcrypt::hash(format!("{password}{salt}"), bcrypt::DEFAULT_COST)
        .map_err(|err| CoreError::invalid(format!("bcrypt hash failed: {err}")))
}

/// Verifies `password ++ salt` against a stored bcrypt hash. `bcrypt`
/// itself compares digests in constant time (spec §4.8: "Constant-time
/// compare").
fn verify_password(password: &str, salt: &str, stored_hash: &str) -> CoreResult<bool> {
    bcrypt::verify(format!("{password}{salt}"), stored_hash)
        .map_err(|err| CoreError::invalid(format!("bcrypt verify failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use entitydb_storage::{InMemoryBackend, StorageBackend};

    fn open() -> Repository {
        let backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        Repository::open_with_backend(Config::default(), backend).unwrap()
    }

    #[test]
    fn authenticate_succeeds_with_correct_password() {
        let repo = open();
        let user = repo.create_user("admin", &[]).unwrap();
        repo.create_credential(&user.id, "admin").unwrap();

        let authenticated = repo.authenticate("admin", "admin").unwrap();
        assert_eq!(authenticated.id, user.id);
    }

    #[test]
    fn authenticate_fails_with_wrong_password() {
        let repo = open();
        let user = repo.create_user("admin", &[]).unwrap();
        repo.create_credential(&user.id, "admin").unwrap();

        assert!(repo.authenticate("admin", "wrong").is_err());
    }

    #[test]
    fn authenticate_fails_for_unknown_username() {
        let repo = open();
        assert!(repo.authenticate("nobody", "whatever").is_err());
    }

    #[test]
    fn authenticate_fails_for_inactive_user() {
        let repo = open();
        let user = repo
            .create(NewEntity::new(
                vec![
                    TAG_TYPE_USER.to_string(),
                    format!("{IDENTITY_USERNAME_PREFIX}disabled"),
                    "status:suspended".to_string(),
                ],
                None,
            ))
            .unwrap();
        repo.create_credential(&user.id, "pw").unwrap();

        assert!(repo.authenticate("disabled", "pw").is_err());
    }

    #[test]
    fn session_validates_before_expiry_and_fails_after() {
        let repo = open();
        let user = repo.create_user("admin", &[]).unwrap();
        let fresh = repo.create_session(&user.id, b"tok".to_vec(), 1_000_000_000).unwrap();
        assert!(repo.validate_session(&fresh.id).is_ok());

        let expired = repo.create_session(&user.id, b"tok".to_vec(), -1).unwrap();
        assert!(repo.validate_session(&expired.id).is_err());
    }

    #[test]
    fn permission_check_follows_role_to_permission() {
        let repo = open();
        let user = repo.create_user("editor", &["editor"]).unwrap();
        let role = repo.create_role("editor").unwrap();
        let permission = repo.create_permission("documents", "write").unwrap();
        repo.grant_permission(&role.id, &permission.id).unwrap();

        assert!(repo.user_has_permission(&user.id, "documents", "write").unwrap());
        assert!(!repo.user_has_permission(&user.id, "documents", "delete").unwrap());
    }

    #[test]
    fn permission_check_false_without_any_matching_role() {
        let repo = open();
        let user = repo.create_user("viewer", &[]).unwrap();
        assert!(!repo.user_has_permission(&user.id, "documents", "write").unwrap());
    }
}
