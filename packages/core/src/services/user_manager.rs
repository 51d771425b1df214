//! User Manager
//!
//! Owns user accounts: creation, authentication, renaming, password changes
//! and deletion. Deleting a user publishes [`Event::UserDeleted`] and waits
//! for subscribers (the mindmap manager) to remove owned mindmaps before the
//! user row goes.
//!
//! The manager keeps no notion of a current user; sessions do.

use crate::db::UserStore;
use crate::events::{Event, EventBus};
use crate::models::{NewUser, User, UserFilter, UserInfo, UserPatch};
use crate::services::error::ServiceError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;

/// Compare two byte strings without early exit on the first difference
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

pub struct UserManager {
    store: Arc<dyn UserStore>,
    bus: Arc<EventBus>,
}

impl UserManager {
    pub fn new(store: Arc<dyn UserStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// SHA-256 digest stored in place of the password
    pub fn hash_password(password: &str) -> Vec<u8> {
        Sha256::digest(password.as_bytes()).to_vec()
    }

    fn validate_username(username: &str) -> Result<(), ServiceError> {
        if username.trim().is_empty() {
            return Err(ServiceError::invalid_argument("username must not be empty"));
        }
        Ok(())
    }

    /// Create an active user; an empty password is hashed like any other
    #[instrument(skip(self, password))]
    pub async fn user_add(&self, username: &str, password: &str) -> Result<i64, ServiceError> {
        Self::validate_username(username)?;

        if !self.user_get(&UserFilter::by_username(username)).await?.is_empty() {
            return Err(ServiceError::duplicate_key("User", username));
        }

        let id = self
            .store
            .user_add(NewUser {
                username: username.to_string(),
                password_hash: Self::hash_password(password),
                active: true,
            })
            .await?;

        tracing::info!("Created user '{}' (id {})", username, id);
        Ok(id)
    }

    pub async fn user_get(&self, filter: &UserFilter) -> Result<Vec<User>, ServiceError> {
        Ok(self.store.user_get(filter).await?)
    }

    /// Look up one user by name
    pub async fn user_find(&self, username: &str) -> Result<User, ServiceError> {
        self.user_get(&UserFilter::by_username(username))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("User", username))
    }

    /// Check credentials
    ///
    /// `Ok(false)` on a password mismatch or an inactive account,
    /// `NotFound` when the user does not exist.
    #[instrument(skip(self, password))]
    pub async fn user_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, ServiceError> {
        let user = self.user_find(username).await?;
        let matches = constant_time_eq(&user.password_hash, &Self::hash_password(password));
        if !matches {
            tracing::warn!("Authentication failed for '{}'", username);
        }
        Ok(matches && user.active)
    }

    /// Rename and/or change the password of `user`; returns the stored result
    #[instrument(skip(self, user, new_password), fields(username = %user.username))]
    pub async fn user_update(
        &self,
        user: &User,
        new_username: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<User, ServiceError> {
        let mut patch = UserPatch::default();

        if let Some(name) = new_username.filter(|name| *name != user.username) {
            Self::validate_username(name)?;
            if !self.user_get(&UserFilter::by_username(name)).await?.is_empty() {
                return Err(ServiceError::duplicate_key("User", name));
            }
            patch.username = Some(name.to_string());
        }
        if let Some(password) = new_password {
            patch.password_hash = Some(Self::hash_password(password));
        }

        if !patch.is_empty() {
            self.store.user_update(user, &patch).await?;
            tracing::info!("Updated user {}", user.id);
        }

        self.user_get(&UserFilter {
            id: Some(user.id),
            ..Default::default()
        })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::not_found("User", &user.username))
    }

    /// Delete `user` after its mindmaps have been cascaded away
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn user_delete(&self, user: &User) -> Result<(), ServiceError> {
        self.bus
            .publish(Event::UserDeleted(user.clone()))
            .settled()
            .await;

        self.store.user_delete(user).await?;
        tracing::info!("Deleted user '{}'", user.username);
        Ok(())
    }

    pub fn user_to_info(&self, user: &User) -> UserInfo {
        UserInfo::from(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseService, LibsqlStore};
    use crate::services::ErrorKind;
    use tempfile::TempDir;

    async fn create_test_manager() -> (UserManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let store = Arc::new(LibsqlStore::new(db));
        (UserManager::new(store, Arc::new(EventBus::new())), temp_dir)
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[tokio::test]
    async fn test_user_add_and_authenticate() {
        let (manager, _temp_dir) = create_test_manager().await;
        manager.user_add("alice", "pw").await.unwrap();

        assert!(manager.user_authenticate("alice", "pw").await.unwrap());
        assert!(!manager.user_authenticate("alice", "wrong").await.unwrap());

        let missing = manager.user_authenticate("nobody", "pw").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_user_add_rejects_duplicates_and_empty_names() {
        let (manager, _temp_dir) = create_test_manager().await;
        manager.user_add("alice", "").await.unwrap();

        let duplicate = manager.user_add("alice", "other").await.unwrap_err();
        assert_eq!(duplicate.kind(), ErrorKind::DuplicateKey);

        let empty = manager.user_add("  ", "").await.unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_user_update_renames_and_changes_password() {
        let (manager, _temp_dir) = create_test_manager().await;
        manager.user_add("alice", "pw").await.unwrap();
        manager.user_add("bob", "pw").await.unwrap();
        let alice = manager.user_find("alice").await.unwrap();

        let taken = manager.user_update(&alice, Some("bob"), None).await.unwrap_err();
        assert_eq!(taken.kind(), ErrorKind::DuplicateKey);

        let renamed = manager
            .user_update(&alice, Some("alicia"), Some("secret"))
            .await
            .unwrap();
        assert_eq!(renamed.username, "alicia");
        assert!(manager.user_authenticate("alicia", "secret").await.unwrap());
        assert!(manager.user_find("alice").await.is_err());
    }
}
