//! `mindmap` scope handlers

use super::{Args, Handler, HandlerResult, HandlerTable};
use crate::events::Event;
use crate::models::{CommandOutput, Mindmap, MindmapFilter, MindmapPatch, Permission, ROOT_NODE_ID};
use crate::services::permission_for;
use crate::session::catalog::SCOPE_MINDMAP;
use crate::session::error::SessionError;
use crate::session::Session;
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(super) fn register(table: &mut HandlerTable) {
    let operations = table.entry(SCOPE_MINDMAP).or_default();
    operations.insert("add", mindmap_add as Handler);
    operations.insert("update", mindmap_update as Handler);
    operations.insert("delete", mindmap_delete as Handler);
    operations.insert("permission", mindmap_permission as Handler);
    operations.insert("import", mindmap_import as Handler);
    operations.insert("export", mindmap_export as Handler);
    operations.insert("select", mindmap_select as Handler);
    operations.insert("list", mindmap_list as Handler);
    operations.insert("view", mindmap_view as Handler);
}

async fn current_id(session: &Session) -> Option<i64> {
    match &session.mindmap {
        Some(shared) => Some(shared.lock().await.id),
        None => None,
    }
}

/// The named mindmap, or the selected one when no name is given
async fn target(session: &Session, name: Option<&str>) -> Result<Mindmap, SessionError> {
    let user = session.require_user()?;
    match name {
        Some(name) => Ok(session.data.mindmaps.mindmap_resolve(&user, name).await?),
        None => {
            let shared = session.require_mindmap()?;
            let id = shared.lock().await.id;
            Ok(session.data.mindmaps.mindmap_find(id).await?)
        }
    }
}

fn mindmap_add(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let name = args.required(0, "mindmap name")?;
        let user = session.require_user()?;

        let id = session.data.mindmaps.mindmap_add(&user, name).await?;
        Ok(CommandOutput::Id(id))
    })
}

fn mindmap_update(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = session.require_user()?;
        let mindmap = target(session, Some(args.required(0, "mindmap name")?)).await?;
        let new_name = args.required(1, "new mindmap name")?;

        let updated = session
            .data
            .mindmaps
            .mindmap_update(
                &user,
                &mindmap,
                &MindmapPatch {
                    name: Some(new_name.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(shared) = &session.mindmap {
            let mut current = shared.lock().await;
            if current.id == updated.id {
                current.name = updated.name.clone();
                if let Some(root) = current.nodes.get_mut(&ROOT_NODE_ID) {
                    root.name = updated.name.clone();
                }
            }
        }
        Ok(CommandOutput::Mindmap(updated.info()))
    })
}

fn mindmap_delete(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = session.require_user()?;
        let mindmap = target(session, args.get(0)).await?;

        session.data.mindmaps.mindmap_delete(&user, &mindmap).await?;
        if current_id(session).await == Some(mindmap.id) {
            session.mindmap_set(None);
        }
        Ok(CommandOutput::Done)
    })
}

fn mindmap_permission(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = session.require_user()?;
        let mindmap = target(session, Some(args.required(0, "mindmap name")?)).await?;

        let is_public = match args.get(1) {
            None => {
                if permission_for(&user, &mindmap) < Permission::Read {
                    return Err(SessionError::permission_denied(format!(
                        "cannot read mindmap '{}'",
                        mindmap.name
                    )));
                }
                mindmap.is_public
            }
            Some(keyword) => {
                let patch = MindmapPatch {
                    is_public: Some(keyword == "public"),
                    ..Default::default()
                };
                let updated = session
                    .data
                    .mindmaps
                    .mindmap_update(&user, &mindmap, &patch)
                    .await?;
                if let Some(shared) = &session.mindmap {
                    let mut current = shared.lock().await;
                    if current.id == updated.id {
                        current.is_public = updated.is_public;
                    }
                }
                updated.is_public
            }
        };
        Ok(CommandOutput::Public(is_public))
    })
}

fn mindmap_import(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = session.require_user()?;
        let path = Path::new(args.required(0, "file")?);

        let mindmap = session
            .data
            .mindmap_import(&user, path, args.get(1))
            .await?;
        let info = mindmap.info();
        session.mindmap_set(Some(Arc::new(Mutex::new(mindmap))));
        Ok(CommandOutput::Mindmap(info))
    })
}

fn mindmap_export(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = session.require_user()?;
        let shared = session.require_mindmap()?;
        let path = Path::new(args.required(0, "file")?);

        let mut mindmap = shared.lock().await;
        session
            .data
            .mindmap_export(&user, &mut mindmap, path, args.get(1))
            .await?;
        Ok(CommandOutput::Done)
    })
}

fn mindmap_select(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let name = match args.get(0) {
            Some(name) => name,
            None => {
                session.mindmap_set(None);
                return Ok(CommandOutput::Done);
            }
        };
        let user = session.require_user()?;
        let mindmap = session.data.mindmaps.mindmap_resolve(&user, name).await?;
        let readable = permission_for(&user, &mindmap) >= Permission::Read;

        let shared = Arc::new(Mutex::new(mindmap));
        session.mindmap_set(Some(shared.clone()));
        if readable {
            session
                .data
                .bus()
                .publish(Event::MindmapSelected(shared.clone()))
                .settled()
                .await;
        } else {
            tracing::warn!(
                "User '{}' selected mindmap '{}' without read access",
                user.username,
                name
            );
        }

        let info = shared.lock().await.info();
        Ok(CommandOutput::Mindmap(info))
    })
}

fn mindmap_list(session: &mut Session, _args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let user = session.require_user()?;
        let mindmaps = session
            .data
            .mindmaps
            .mindmap_get(&user, &MindmapFilter::default())
            .await?;
        Ok(CommandOutput::Mindmaps(
            mindmaps.iter().map(Mindmap::info).collect(),
        ))
    })
}

fn mindmap_view(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = session.require_user()?;
        let shared = session.require_mindmap()?;
        let data = &session.data;

        let mut mindmap = shared.lock().await;
        data.mindmaps
            .mindmap_require(&user, mindmap.id, Permission::Read)
            .await?;
        data.nodes.mindmap_ensure_loaded(&mut mindmap).await?;

        let start = match args.get(0) {
            Some(index) => data.nodes.node_resolve(&mindmap, index, false)?,
            None => ROOT_NODE_ID,
        };
        Ok(CommandOutput::Text(mindmap.render(start, args.by_id)))
    })
}
