//! Mindmap Manager
//!
//! Owns mindmap metadata and access control. Node trees are the node
//! manager's business; this manager only announces lifecycle changes:
//!
//! - `mindmap_add` publishes `MindmapAdded` (the root is created in response)
//! - `mindmap_update` publishes `MindmapUpdated` (the root follows renames)
//! - `mindmap_delete` publishes `MindmapDeleted`, waits for the nodes to be
//!   removed, then drops the mindmap and its tables
//!
//! It subscribes to `UserDeleted` (cascade owned mindmaps) and
//! `RootNodeRenamed` (follow root renames).

use crate::db::MindmapStore;
use crate::events::{Event, EventBus, EventKind};
use crate::models::{
    Mindmap, MindmapFilter, MindmapInfo, MindmapPatch, NewMindmap, Permission, User,
};
use crate::services::error::ServiceError;
use std::sync::Arc;
use tracing::instrument;

/// Access `user` holds on `mindmap`
pub fn permission_for(user: &User, mindmap: &Mindmap) -> Permission {
    if mindmap.owner == user.username {
        Permission::Owner
    } else if mindmap.is_public {
        Permission::Read
    } else {
        Permission::None
    }
}

pub struct MindmapManager {
    store: Arc<dyn MindmapStore>,
    bus: Arc<EventBus>,
}

impl MindmapManager {
    pub fn new(store: Arc<dyn MindmapStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Subscribe to peer events
    pub fn register(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::UserDeleted, "MindmapManager", move |event| {
                let manager = weak.upgrade();
                async move {
                    match (manager, event) {
                        (Some(manager), Event::UserDeleted(user)) => {
                            manager.on_user_deleted(&user).await
                        }
                        _ => Ok(()),
                    }
                }
            });

        let weak = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::RootNodeRenamed, "MindmapManager", move |event| {
                let manager = weak.upgrade();
                async move {
                    match (manager, event) {
                        (
                            Some(manager),
                            Event::RootNodeRenamed {
                                mindmap_id,
                                new_name,
                                ..
                            },
                        ) => manager.on_root_renamed(mindmap_id, &new_name).await,
                        _ => Ok(()),
                    }
                }
            });
    }

    fn validate_name(name: &str) -> Result<(), ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::invalid_argument("mindmap name must not be empty"));
        }
        Ok(())
    }

    async fn name_taken(&self, owner: &str, name: &str) -> Result<bool, ServiceError> {
        let existing = self
            .store
            .mindmap_get(&MindmapFilter {
                name: Some(name.to_string()),
                owner: Some(owner.to_string()),
                ..Default::default()
            })
            .await?;
        Ok(!existing.is_empty())
    }

    /// Fail with `DuplicateKey` when `owner` already has a mindmap `name`
    pub async fn mindmap_name_check(&self, owner: &str, name: &str) -> Result<(), ServiceError> {
        Self::validate_name(name)?;
        if self.name_taken(owner, name).await? {
            return Err(ServiceError::duplicate_key("Mindmap", name));
        }
        Ok(())
    }

    /// Create a private mindmap owned by `owner`
    #[instrument(skip(self, owner), fields(owner = %owner.username))]
    pub async fn mindmap_add(&self, owner: &User, name: &str) -> Result<i64, ServiceError> {
        self.mindmap_name_check(&owner.username, name).await?;

        let id = self
            .store
            .mindmap_add(NewMindmap {
                name: name.to_string(),
                owner: owner.username.clone(),
                is_public: false,
            })
            .await?;
        let mindmap = self.mindmap_find(id).await?;

        tracing::info!("Created mindmap '{}' (id {})", name, id);
        // Root creation happens in the node manager's handler
        let dispatch = self.bus.publish(Event::MindmapAdded(mindmap));
        tracing::debug!("MindmapAdded sent to {} handler(s)", dispatch.handler_count());
        Ok(id)
    }

    /// Mindmaps matching `filter` that `user` may read
    pub async fn mindmap_get(
        &self,
        user: &User,
        filter: &MindmapFilter,
    ) -> Result<Vec<Mindmap>, ServiceError> {
        let mindmaps = self.store.mindmap_get(filter).await?;
        Ok(mindmaps
            .into_iter()
            .filter(|mindmap| permission_for(user, mindmap) >= Permission::Read)
            .collect())
    }

    /// Load one mindmap by id, without an access check
    pub async fn mindmap_find(&self, id: i64) -> Result<Mindmap, ServiceError> {
        self.store
            .mindmap_get(&MindmapFilter::by_id(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("Mindmap", id))
    }

    /// Resolve a name for `user`: their own mindmap first, then anyone's
    pub async fn mindmap_resolve(&self, user: &User, name: &str) -> Result<Mindmap, ServiceError> {
        let candidates = self
            .store
            .mindmap_get(&MindmapFilter {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await?;

        let own = candidates
            .iter()
            .position(|mindmap| mindmap.owner == user.username);
        let chosen = match own {
            Some(position) => candidates.into_iter().nth(position),
            None => candidates.into_iter().next(),
        };
        chosen.ok_or_else(|| ServiceError::not_found("Mindmap", name))
    }

    /// Current access level, read fresh from the store
    pub async fn mindmap_permission(
        &self,
        user: &User,
        mindmap_id: i64,
    ) -> Result<Permission, ServiceError> {
        let mindmap = self.mindmap_find(mindmap_id).await?;
        Ok(permission_for(user, &mindmap))
    }

    /// Fail with `PermissionDenied` unless `user` holds at least `required`
    pub async fn mindmap_require(
        &self,
        user: &User,
        mindmap_id: i64,
        required: Permission,
    ) -> Result<Permission, ServiceError> {
        let granted = self.mindmap_permission(user, mindmap_id).await?;
        if granted < required {
            tracing::warn!(
                granted = granted.level(),
                required = required.level(),
                "User '{}' holds {} on mindmap {}, needs {}",
                user.username,
                granted,
                mindmap_id,
                required
            );
            return Err(ServiceError::permission_denied(format!(
                "{} access to mindmap {} required",
                required, mindmap_id
            )));
        }
        Ok(granted)
    }

    /// Rename or change visibility; owner only
    #[instrument(skip(self, user, mindmap, patch), fields(mindmap_id = mindmap.id))]
    pub async fn mindmap_update(
        &self,
        user: &User,
        mindmap: &Mindmap,
        patch: &MindmapPatch,
    ) -> Result<Mindmap, ServiceError> {
        self.mindmap_require(user, mindmap.id, Permission::Owner)
            .await?;

        if let Some(name) = patch.name.as_deref().filter(|name| *name != mindmap.name) {
            self.mindmap_name_check(&mindmap.owner, name).await?;
        }

        self.store.mindmap_update(mindmap, patch).await?;
        let updated = self.mindmap_find(mindmap.id).await?;

        self.bus
            .publish(Event::MindmapUpdated {
                mindmap: updated.clone(),
                old_name: mindmap.name.clone(),
            })
            .settled()
            .await;

        tracing::info!("Updated mindmap {}", mindmap.id);
        Ok(updated)
    }

    /// Delete a mindmap with all its nodes; owner only
    #[instrument(skip(self, user, mindmap), fields(mindmap_id = mindmap.id))]
    pub async fn mindmap_delete(&self, user: &User, mindmap: &Mindmap) -> Result<(), ServiceError> {
        self.mindmap_require(user, mindmap.id, Permission::Owner)
            .await?;
        self.mindmap_remove(mindmap).await
    }

    async fn mindmap_remove(&self, mindmap: &Mindmap) -> Result<(), ServiceError> {
        self.bus
            .publish(Event::MindmapDeleted(mindmap.clone()))
            .settled()
            .await;

        self.store.mindmap_delete(mindmap).await?;
        tracing::info!("Deleted mindmap '{}' (id {})", mindmap.name, mindmap.id);
        Ok(())
    }

    pub fn mindmap_to_info(&self, mindmap: &Mindmap) -> MindmapInfo {
        mindmap.info()
    }

    async fn on_user_deleted(&self, user: &User) -> anyhow::Result<()> {
        let owned = self
            .store
            .mindmap_get(&MindmapFilter::by_owner(&user.username))
            .await?;
        tracing::debug!(
            "Cascading {} mindmap(s) of deleted user '{}'",
            owned.len(),
            user.username
        );
        for mindmap in &owned {
            self.mindmap_remove(mindmap).await?;
        }
        Ok(())
    }

    async fn on_root_renamed(&self, mindmap_id: i64, new_name: &str) -> anyhow::Result<()> {
        let mindmap = self.mindmap_find(mindmap_id).await?;
        if mindmap.name == new_name {
            return Ok(());
        }
        self.store
            .mindmap_update(
                &mindmap,
                &MindmapPatch {
                    name: Some(new_name.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        tracing::debug!("Mindmap {} renamed to follow its root", mindmap_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseService, LibsqlStore, UserStore};
    use crate::models::{NewUser, UserFilter};
    use crate::services::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    async fn create_test_manager() -> (Arc<MindmapManager>, Arc<LibsqlStore>, Arc<EventBus>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let store = Arc::new(LibsqlStore::new(db));
        let bus = Arc::new(EventBus::new());
        let manager = Arc::new(MindmapManager::new(store.clone(), bus.clone()));
        (manager, store, bus, temp_dir)
    }

    async fn create_user(store: &LibsqlStore, name: &str) -> User {
        store
            .user_add(NewUser {
                username: name.to_string(),
                password_hash: Vec::new(),
                active: true,
            })
            .await
            .unwrap();
        store
            .user_get(&UserFilter::by_username(name))
            .await
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_permission_levels() {
        assert_eq!(Permission::None.level(), 0);
        assert_eq!(Permission::Read.level(), 1);
        assert_eq!(Permission::Owner.level(), 2);
        assert!(Permission::Owner > Permission::Read);
    }

    #[tokio::test]
    async fn test_require_reads_current_visibility() {
        let (manager, store, _bus, _temp_dir) = create_test_manager().await;
        let alice = create_user(&store, "alice").await;
        let bob = create_user(&store, "bob").await;
        let id = manager.mindmap_add(&alice, "ideas").await.unwrap();

        let err = manager
            .mindmap_require(&bob, id, Permission::Read)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let mindmap = manager.mindmap_find(id).await.unwrap();
        store
            .mindmap_update(
                &mindmap,
                &MindmapPatch {
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let granted = manager.mindmap_require(&bob, id, Permission::Read).await.unwrap();
        assert_eq!(granted, Permission::Read);
        assert!(manager.mindmap_require(&bob, id, Permission::Owner).await.is_err());
        assert_eq!(
            manager.mindmap_require(&alice, id, Permission::Owner).await.unwrap(),
            Permission::Owner
        );
    }

    #[tokio::test]
    async fn test_add_announces_and_rejects_duplicates() {
        let (manager, store, bus, _temp_dir) = create_test_manager().await;
        let alice = create_user(&store, "alice").await;
        let added = Arc::new(AtomicUsize::new(0));
        let counter = added.clone();
        bus.subscribe(EventKind::MindmapAdded, "test", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        manager.mindmap_add(&alice, "ideas").await.unwrap();
        // delivery is fire-and-forget
        for _ in 0..50 {
            if added.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(added.load(Ordering::SeqCst), 1);

        let err = manager.mindmap_add(&alice, "ideas").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    }
}
