//! Data Manager
//!
//! Composition root of the data layer. Builds the store, the event bus and
//! the three managers, registers their subscriptions, and runs the
//! import/export pipeline on top of them.

use crate::config::Config;
use crate::db::{DatabaseService, LibsqlStore};
use crate::events::EventBus;
use crate::models::{
    Mindmap, MindmapFilter, MindmapPatch, NodeUpdate, Permission, User, ROOT_NODE_ID,
};
use crate::services::error::ServiceError;
use crate::services::file_io::{
    document_read, document_write, DocumentFormat, MindmapDocument, NodeRecord,
};
use crate::services::{MindmapManager, NodeManager, UserManager};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Backend accepted in `Config::database_type`
const SUPPORTED_DATABASE: &str = "sqlite";

pub struct DataManager {
    pub users: Arc<UserManager>,
    pub mindmaps: Arc<MindmapManager>,
    pub nodes: Arc<NodeManager>,
    bus: Arc<EventBus>,
    store: Arc<LibsqlStore>,
}

impl DataManager {
    /// Open the configured database, wire the managers and bootstrap the default user
    pub async fn new(config: &Config) -> Result<Self, ServiceError> {
        if config.database_type != SUPPORTED_DATABASE {
            return Err(ServiceError::initialization(format!(
                "unsupported database type '{}'",
                config.database_type
            )));
        }

        let db = DatabaseService::new(config.database_path()).await?;
        let manager = Self::with_database(Arc::new(db));
        manager.default_user_ensure(config).await?;
        Ok(manager)
    }

    /// Wire managers over an already opened database
    pub fn with_database(db: Arc<DatabaseService>) -> Self {
        let store = Arc::new(LibsqlStore::new(db));
        let bus = Arc::new(EventBus::new());

        let users = Arc::new(UserManager::new(store.clone(), bus.clone()));
        let mindmaps = Arc::new(MindmapManager::new(store.clone(), bus.clone()));
        let nodes = Arc::new(NodeManager::new(store.clone(), store.clone(), bus.clone()));
        mindmaps.register();
        nodes.register();

        tracing::info!("Data manager initialized");
        Self {
            users,
            mindmaps,
            nodes,
            bus,
            store,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<LibsqlStore> {
        &self.store
    }

    async fn default_user_ensure(&self, config: &Config) -> Result<(), ServiceError> {
        if !config.default_user_active || config.default_user.is_empty() {
            return Ok(());
        }
        match self.users.user_find(&config.default_user).await {
            Ok(_) => Ok(()),
            Err(ServiceError::NotFound { .. }) => {
                self.users
                    .user_add(&config.default_user, &config.default_user_password)
                    .await?;
                tracing::info!("Created default user '{}'", config.default_user);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Import a mindmap document as a mindmap owned by `user`
    ///
    /// An existing mindmap of the same name owned by `user` is replaced. On
    /// any failure after creation the partial mindmap is removed again.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn mindmap_import(
        &self,
        user: &User,
        path: &Path,
        format: Option<&str>,
    ) -> Result<Mindmap, ServiceError> {
        let format = DocumentFormat::resolve(path, format)?;
        let document = document_read(path, format).await?;
        let records = document.validate()?;

        let existing = self
            .mindmaps
            .mindmap_get(
                user,
                &MindmapFilter {
                    name: Some(document.name.clone()),
                    owner: Some(user.username.clone()),
                    ..Default::default()
                },
            )
            .await?;
        for mindmap in &existing {
            tracing::info!("Replacing mindmap '{}' (id {})", mindmap.name, mindmap.id);
            self.mindmaps.mindmap_delete(user, mindmap).await?;
        }

        let id = self.mindmaps.mindmap_add(user, &document.name).await?;
        match self.import_populate(user, id, &document, &records).await {
            Ok(mindmap) => {
                tracing::info!(
                    "Imported mindmap '{}' with {} node(s) from {}",
                    mindmap.name,
                    mindmap.nodes.len(),
                    path.display()
                );
                Ok(mindmap)
            }
            Err(e) => {
                tracing::error!("Import of {} failed: {}", path.display(), e);
                match self.mindmaps.mindmap_find(id).await {
                    Ok(partial) => {
                        if let Err(cleanup) = self.mindmaps.mindmap_delete(user, &partial).await {
                            tracing::error!("Failed to remove partial import {}: {}", id, cleanup);
                        }
                    }
                    Err(lookup) => {
                        tracing::error!("Failed to find partial import {}: {}", id, lookup)
                    }
                }
                Err(e)
            }
        }
    }

    async fn import_populate(
        &self,
        user: &User,
        id: i64,
        document: &MindmapDocument,
        records: &[NodeRecord],
    ) -> Result<Mindmap, ServiceError> {
        let mut mindmap = self.mindmaps.mindmap_find(id).await?;
        if document.is_public {
            mindmap = self
                .mindmaps
                .mindmap_update(
                    user,
                    &mindmap,
                    &MindmapPatch {
                        is_public: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
        self.nodes.mindmap_ensure_loaded(&mut mindmap).await?;

        let (root, descendants) = match records.split_first() {
            Some(split) => split,
            None => return Ok(mindmap),
        };
        let root_content: std::collections::BTreeMap<String, String> = root
            .content_map()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();
        if !root_content.is_empty() {
            self.nodes
                .node_update(
                    &mut mindmap,
                    ROOT_NODE_ID,
                    NodeUpdate {
                        content: root_content,
                        ..Default::default()
                    },
                )
                .await?;
        }

        for record in descendants {
            self.nodes
                .node_add(
                    &mut mindmap,
                    record.parent_id,
                    &record.name,
                    record.content_map(),
                    Some(record.id),
                )
                .await?;
        }
        Ok(mindmap)
    }

    /// Write `mindmap` to `path`; requires read access
    #[instrument(skip(self, user, mindmap), fields(mindmap_id = mindmap.id))]
    pub async fn mindmap_export(
        &self,
        user: &User,
        mindmap: &mut Mindmap,
        path: &Path,
        format: Option<&str>,
    ) -> Result<(), ServiceError> {
        let format = DocumentFormat::resolve(path, format)?;
        self.mindmaps
            .mindmap_require(user, mindmap.id, Permission::Read)
            .await?;
        self.nodes.mindmap_ensure_loaded(mindmap).await?;

        let document = MindmapDocument::from_mindmap(mindmap)?;
        document_write(&document, path, format).await
    }
}
