//! LibsqlStore - Store Traits over libsql
//!
//! Implements [`UserStore`], [`MindmapStore`] and [`NodeStore`] on top of a
//! shared [`DatabaseService`]. Each call opens a short-lived connection with
//! the busy timeout configured; multi-statement writes run inside
//! `BEGIN IMMEDIATE` ... `COMMIT` and roll back on the first failure.
//!
//! Dynamic filters are assembled as `column = ?` clauses with positional
//! parameters. Only per-mindmap table names are interpolated, and those are
//! derived from the integer mindmap id.

use crate::db::database::{node_content_table, nodes_table, parse_timestamp, timestamp_now};
use crate::db::store::{MindmapStore, NodeStore, UserStore};
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{
    IndexChange, Mindmap, MindmapFilter, MindmapPatch, NewMindmap, NewNode, NewUser, Node,
    NodeFilter, NodePatch, User, UserFilter, UserPatch,
};
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

/// Store implementation backed by libsql
#[derive(Debug, Clone)]
pub struct LibsqlStore {
    db: Arc<DatabaseService>,
}

/// Accumulates `column = ?` clauses and their positional values
#[derive(Default)]
struct Clauses {
    parts: Vec<String>,
    values: Vec<Value>,
}

impl Clauses {
    fn push(&mut self, column: &str, value: impl Into<Value>) {
        self.parts.push(format!("{} = ?", column));
        self.values.push(value.into());
    }

    fn where_sql(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.parts.join(" AND "))
        }
    }

    fn set_sql(&self) -> String {
        self.parts.join(", ")
    }

    fn into_params(self) -> Params {
        Params::Positional(self.values)
    }
}

fn bool_value(flag: bool) -> i64 {
    i64::from(flag)
}

impl LibsqlStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    /// Run `work` inside a write transaction on a fresh connection
    async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let conn = self.db.connect_with_timeout().await?;
        DatabaseService::begin_transaction(&conn).await?;

        match work(conn.clone()).await {
            Ok(value) => {
                DatabaseService::commit_transaction(&conn).await?;
                Ok(value)
            }
            Err(e) => {
                DatabaseService::rollback_transaction(&conn).await;
                Err(e)
            }
        }
    }

    fn row_to_user(row: &Row) -> Result<User, DatabaseError> {
        let created: String = row.get(4)?;
        let updated: String = row.get(5)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            active: row.get::<i64>(3)? != 0,
            created: parse_timestamp(&created)?,
            updated: parse_timestamp(&updated)?,
        })
    }

    fn row_to_mindmap(row: &Row) -> Result<Mindmap, DatabaseError> {
        let created: String = row.get(4)?;
        let updated: String = row.get(5)?;
        Ok(Mindmap {
            id: row.get(0)?,
            name: row.get(1)?,
            owner: row.get(2)?,
            is_public: row.get::<i64>(3)? != 0,
            created: parse_timestamp(&created)?,
            updated: parse_timestamp(&updated)?,
            nodes: HashMap::new(),
        })
    }

    fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
        let created: String = row.get(5)?;
        let updated: String = row.get(6)?;
        Ok(Node {
            id: row.get(0)?,
            mindmap_id: row.get(1)?,
            parent_id: row.get(2)?,
            name: row.get(3)?,
            index: row.get(4)?,
            content: BTreeMap::new(),
            children: Vec::new(),
            created: parse_timestamp(&created)?,
            updated: parse_timestamp(&updated)?,
        })
    }

    async fn content_insert(
        conn: &Connection,
        mindmap_id: i64,
        node_id: i64,
        content: &BTreeMap<String, String>,
    ) -> Result<(), DatabaseError> {
        let table = node_content_table(mindmap_id);
        for (key, value) in content {
            conn.execute(
                &format!("INSERT INTO {} (node_id, key, value) VALUES (?, ?, ?)", table),
                (node_id, key.as_str(), value.as_str()),
            )
            .await
            .map_err(|e| {
                DatabaseError::from_write(
                    format!("Failed to insert content '{}' of node {}", key, node_id),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for LibsqlStore {
    async fn user_add(&self, user: NewUser) -> Result<i64, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let now = timestamp_now();

        conn.execute(
            "INSERT INTO users (username, password_hash, active, created, updated)
             VALUES (?, ?, ?, ?, ?)",
            (
                user.username.as_str(),
                user.password_hash,
                bool_value(user.active),
                now.as_str(),
                now.as_str(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::from_write(format!("Failed to insert user '{}'", user.username), e))?;

        Ok(conn.last_insert_rowid())
    }

    async fn user_get(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
        let mut clauses = Clauses::default();
        if let Some(id) = filter.id {
            clauses.push("id", id);
        }
        if let Some(username) = &filter.username {
            clauses.push("username", username.clone());
        }
        if let Some(active) = filter.active {
            clauses.push("active", bool_value(active));
        }

        let conn = self.db.connect_with_timeout().await?;
        let sql = format!(
            "SELECT id, username, password_hash, active, created, updated FROM users{} ORDER BY id",
            clauses.where_sql()
        );
        let mut stmt = conn
            .prepare(&sql)
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query users: {}", e)))?;
        let mut rows = stmt.query(clauses.into_params()).await?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(Self::row_to_user(&row)?);
        }
        Ok(users)
    }

    async fn user_update(&self, user: &User, patch: &UserPatch) -> Result<(), DatabaseError> {
        let mut sets = Clauses::default();
        if let Some(username) = &patch.username {
            sets.push("username", username.clone());
        }
        if let Some(hash) = &patch.password_hash {
            sets.push("password_hash", hash.clone());
        }
        if let Some(active) = patch.active {
            sets.push("active", bool_value(active));
        }
        sets.push("updated", timestamp_now());

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.set_sql());
        sets.values.push(Value::from(user.id));

        let conn = self.db.connect_with_timeout().await?;
        let changed = conn
            .execute(&sql, sets.into_params())
            .await
            .map_err(|e| DatabaseError::from_write(format!("Failed to update user {}", user.id), e))?;

        if changed == 0 {
            return Err(DatabaseError::not_found("User", &user.username));
        }
        Ok(())
    }

    async fn user_delete(&self, user: &User) -> Result<(), DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let changed = conn
            .execute("DELETE FROM users WHERE id = ?", [user.id])
            .await
            .map_err(|e| DatabaseError::from_write(format!("Failed to delete user {}", user.id), e))?;

        if changed == 0 {
            return Err(DatabaseError::not_found("User", &user.username));
        }
        Ok(())
    }
}

#[async_trait]
impl MindmapStore for LibsqlStore {
    async fn mindmap_add(&self, mindmap: NewMindmap) -> Result<i64, DatabaseError> {
        self.transaction(|conn| async move {
            let now = timestamp_now();
            conn.execute(
                "INSERT INTO mindmaps (mindmap_name, owner, is_public, created, updated)
                 VALUES (?, ?, ?, ?, ?)",
                (
                    mindmap.name.as_str(),
                    mindmap.owner.as_str(),
                    bool_value(mindmap.is_public),
                    now.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|e| {
                DatabaseError::from_write(
                    format!("Failed to insert mindmap '{}' of {}", mindmap.name, mindmap.owner),
                    e,
                )
            })?;

            let id = conn.last_insert_rowid();
            DatabaseService::create_mindmap_tables(&conn, id).await?;
            Ok(id)
        })
        .await
    }

    async fn mindmap_get(&self, filter: &MindmapFilter) -> Result<Vec<Mindmap>, DatabaseError> {
        let mut clauses = Clauses::default();
        if let Some(id) = filter.id {
            clauses.push("id", id);
        }
        if let Some(name) = &filter.name {
            clauses.push("mindmap_name", name.clone());
        }
        if let Some(owner) = &filter.owner {
            clauses.push("owner", owner.clone());
        }
        if let Some(is_public) = filter.is_public {
            clauses.push("is_public", bool_value(is_public));
        }

        let conn = self.db.connect_with_timeout().await?;
        let sql = format!(
            "SELECT id, mindmap_name, owner, is_public, created, updated FROM mindmaps{} ORDER BY id",
            clauses.where_sql()
        );
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query mindmaps: {}", e))
        })?;
        let mut rows = stmt.query(clauses.into_params()).await?;

        let mut mindmaps = Vec::new();
        while let Some(row) = rows.next().await? {
            mindmaps.push(Self::row_to_mindmap(&row)?);
        }
        Ok(mindmaps)
    }

    async fn mindmap_update(
        &self,
        mindmap: &Mindmap,
        patch: &MindmapPatch,
    ) -> Result<(), DatabaseError> {
        let mut sets = Clauses::default();
        if let Some(name) = &patch.name {
            sets.push("mindmap_name", name.clone());
        }
        if let Some(is_public) = patch.is_public {
            sets.push("is_public", bool_value(is_public));
        }
        sets.push("updated", timestamp_now());

        let sql = format!("UPDATE mindmaps SET {} WHERE id = ?", sets.set_sql());
        sets.values.push(Value::from(mindmap.id));

        let conn = self.db.connect_with_timeout().await?;
        let changed = conn.execute(&sql, sets.into_params()).await.map_err(|e| {
            DatabaseError::from_write(format!("Failed to update mindmap {}", mindmap.id), e)
        })?;

        if changed == 0 {
            return Err(DatabaseError::not_found("Mindmap", &mindmap.name));
        }
        Ok(())
    }

    async fn mindmap_delete(&self, mindmap: &Mindmap) -> Result<(), DatabaseError> {
        let mindmap_id = mindmap.id;
        let name = mindmap.name.clone();
        self.transaction(|conn| async move {
            DatabaseService::drop_mindmap_tables(&conn, mindmap_id).await?;
            let changed = conn
                .execute("DELETE FROM mindmaps WHERE id = ?", [mindmap_id])
                .await
                .map_err(|e| {
                    DatabaseError::from_write(format!("Failed to delete mindmap {}", mindmap_id), e)
                })?;
            if changed == 0 {
                return Err(DatabaseError::not_found("Mindmap", name));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl NodeStore for LibsqlStore {
    async fn node_add(
        &self,
        mindmap_id: i64,
        node: NewNode,
        force_id: Option<i64>,
    ) -> Result<i64, DatabaseError> {
        self.transaction(|conn| async move {
            let table = nodes_table(mindmap_id);
            let now = timestamp_now();
            let context = format!("Failed to insert node '{}' into {}", node.name, table);

            let id = match force_id {
                Some(id) => {
                    conn.execute(
                        &format!(
                            "INSERT INTO {} (id, mindmap_id, parent_id, node_name, index_value, created, updated)
                             VALUES (?, ?, ?, ?, ?, ?, ?)",
                            table
                        ),
                        (
                            id,
                            mindmap_id,
                            node.parent_id,
                            node.name.as_str(),
                            node.index.as_str(),
                            now.as_str(),
                            now.as_str(),
                        ),
                    )
                    .await
                    .map_err(|e| DatabaseError::from_write(context, e))?;
                    id
                }
                None => {
                    conn.execute(
                        &format!(
                            "INSERT INTO {} (mindmap_id, parent_id, node_name, index_value, created, updated)
                             VALUES (?, ?, ?, ?, ?, ?)",
                            table
                        ),
                        (
                            mindmap_id,
                            node.parent_id,
                            node.name.as_str(),
                            node.index.as_str(),
                            now.as_str(),
                            now.as_str(),
                        ),
                    )
                    .await
                    .map_err(|e| DatabaseError::from_write(context, e))?;
                    conn.last_insert_rowid()
                }
            };

            Self::content_insert(&conn, mindmap_id, id, &node.content).await?;
            Ok(id)
        })
        .await
    }

    async fn node_get(
        &self,
        mindmap_id: i64,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, DatabaseError> {
        let mut clauses = Clauses::default();
        if let Some(id) = filter.id {
            clauses.push("id", id);
        }
        if let Some(parent_id) = filter.parent_id {
            clauses.push("parent_id", parent_id);
        }
        if let Some(name) = &filter.name {
            clauses.push("node_name", name.clone());
        }
        if let Some(index) = &filter.index {
            clauses.push("index_value", index.clone());
        }

        let conn = self.db.connect_with_timeout().await?;
        let sql = format!(
            "SELECT id, mindmap_id, parent_id, node_name, index_value, created, updated FROM {}{} ORDER BY id",
            nodes_table(mindmap_id),
            clauses.where_sql()
        );
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query nodes of mindmap {}: {}", mindmap_id, e))
        })?;
        let mut rows = stmt.query(clauses.into_params()).await?;

        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(Self::row_to_node(&row)?);
        }
        if nodes.is_empty() {
            return Ok(nodes);
        }

        let placeholders = vec!["?"; nodes.len()].join(", ");
        let ids: Vec<Value> = nodes.iter().map(|node| Value::from(node.id)).collect();
        let sql = format!(
            "SELECT node_id, key, value FROM {} WHERE node_id IN ({})",
            node_content_table(mindmap_id),
            placeholders
        );
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query node content: {}", e))
        })?;
        let mut rows = stmt.query(Params::Positional(ids)).await?;

        let mut content: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
        while let Some(row) = rows.next().await? {
            let node_id: i64 = row.get(0)?;
            content
                .entry(node_id)
                .or_default()
                .insert(row.get(1)?, row.get(2)?);
        }
        for node in &mut nodes {
            if let Some(entries) = content.remove(&node.id) {
                node.content = entries;
            }
        }
        Ok(nodes)
    }

    async fn node_update(
        &self,
        mindmap_id: i64,
        node_id: i64,
        patch: &NodePatch,
    ) -> Result<(), DatabaseError> {
        let patch = patch.clone();
        self.transaction(|conn| async move {
            let table = nodes_table(mindmap_id);
            let mut sets = Clauses::default();
            if let Some(name) = patch.name {
                sets.push("node_name", name);
            }
            if let Some(parent_id) = patch.parent_id {
                sets.push("parent_id", parent_id);
            }
            if let Some(index) = patch.index {
                sets.push("index_value", index);
            }
            sets.push("updated", timestamp_now());

            let sql = format!("UPDATE {} SET {} WHERE id = ?", table, sets.set_sql());
            sets.values.push(Value::from(node_id));
            let changed = conn.execute(&sql, sets.into_params()).await.map_err(|e| {
                DatabaseError::from_write(format!("Failed to update node {} in {}", node_id, table), e)
            })?;
            if changed == 0 {
                return Err(DatabaseError::not_found("Node", node_id));
            }

            if let Some(content) = patch.content {
                conn.execute(
                    &format!("DELETE FROM {} WHERE node_id = ?", node_content_table(mindmap_id)),
                    [node_id],
                )
                .await
                .map_err(|e| {
                    DatabaseError::from_write(format!("Failed to clear content of node {}", node_id), e)
                })?;
                Self::content_insert(&conn, mindmap_id, node_id, &content).await?;
            }
            Ok(())
        })
        .await
    }

    async fn node_reindex(
        &self,
        mindmap_id: i64,
        changes: &[IndexChange],
    ) -> Result<(), DatabaseError> {
        if changes.is_empty() {
            return Ok(());
        }
        let changes = changes.to_vec();
        self.transaction(|conn| async move {
            let table = nodes_table(mindmap_id);
            let now = timestamp_now();
            for change in &changes {
                let result = match change.parent_id {
                    Some(parent_id) => {
                        conn.execute(
                            &format!(
                                "UPDATE {} SET index_value = ?, parent_id = ?, updated = ? WHERE id = ?",
                                table
                            ),
                            (change.index.as_str(), parent_id, now.as_str(), change.id),
                        )
                        .await
                    }
                    None => {
                        conn.execute(
                            &format!(
                                "UPDATE {} SET index_value = ?, updated = ? WHERE id = ?",
                                table
                            ),
                            (change.index.as_str(), now.as_str(), change.id),
                        )
                        .await
                    }
                };
                let changed = result.map_err(|e| {
                    DatabaseError::from_write(format!("Failed to reindex node {}", change.id), e)
                })?;
                if changed == 0 {
                    return Err(DatabaseError::not_found("Node", change.id));
                }
            }
            Ok(())
        })
        .await
    }

    async fn node_delete(&self, mindmap_id: i64, node_ids: &[i64]) -> Result<(), DatabaseError> {
        if node_ids.is_empty() {
            return Ok(());
        }
        let node_ids = node_ids.to_vec();
        self.transaction(|conn| async move {
            let content = node_content_table(mindmap_id);
            let nodes = nodes_table(mindmap_id);
            for node_id in &node_ids {
                conn.execute(&format!("DELETE FROM {} WHERE node_id = ?", content), [*node_id])
                    .await
                    .map_err(|e| {
                        DatabaseError::from_write(format!("Failed to delete content of node {}", node_id), e)
                    })?;
                let changed = conn
                    .execute(&format!("DELETE FROM {} WHERE id = ?", nodes), [*node_id])
                    .await
                    .map_err(|e| {
                        DatabaseError::from_write(format!("Failed to delete node {}", node_id), e)
                    })?;
                if changed == 0 {
                    return Err(DatabaseError::not_found("Node", node_id));
                }
            }
            Ok(())
        })
        .await
    }

    async fn node_delete_all(&self, mindmap_id: i64) -> Result<(), DatabaseError> {
        if !self.db.mindmap_tables_exist(mindmap_id).await? {
            tracing::debug!("Node tables of mindmap {} already dropped", mindmap_id);
            return Ok(());
        }
        self.transaction(|conn| async move {
            for table in [node_content_table(mindmap_id), nodes_table(mindmap_id)] {
                conn.execute(&format!("DELETE FROM {}", table), ())
                    .await
                    .map_err(|e| {
                        DatabaseError::from_write(format!("Failed to clear {}", table), e)
                    })?;
            }
            Ok(())
        })
        .await
    }
}
