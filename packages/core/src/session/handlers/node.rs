//! `node` scope handlers
//!
//! Node identifiers are dotted indices, or numeric ids when `--id` is given.
//! Writes need owner permission, `find` needs read permission; both are
//! checked against the store on every command. Successful add, update, move
//! and delete are recorded in the session history for `undo`/`redo`.

use super::{content_parse, Args, Handler, HandlerResult, HandlerTable};
use crate::models::{
    CommandOutput, FindFields, Node, NodeUpdate, Permission, SharedMindmap, User, ROOT_NODE_ID,
};
use crate::session::catalog::SCOPE_NODE;
use crate::session::error::SessionError;
use crate::session::history::{NodeEdit, Revision};
use crate::session::Session;
use futures::future::BoxFuture;

pub(super) fn register(table: &mut HandlerTable) {
    let operations = table.entry(SCOPE_NODE).or_default();
    operations.insert("add", node_add as Handler);
    operations.insert("update", node_update as Handler);
    operations.insert("move", node_move as Handler);
    operations.insert("delete", node_delete as Handler);
    operations.insert("find", node_find as Handler);
    operations.insert("sort", node_sort as Handler);
    operations.insert("undo", node_undo as Handler);
    operations.insert("redo", node_redo as Handler);
}

/// Selected user and mindmap, after checking `required` access
async fn context(
    session: &Session,
    required: Permission,
) -> Result<(User, SharedMindmap), SessionError> {
    let user = session.require_user()?;
    let shared = session.require_mindmap()?;
    let id = shared.lock().await.id;
    session
        .data
        .mindmaps
        .mindmap_require(&user, id, required)
        .await?;
    Ok((user, shared))
}

fn node_add(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let (_, shared) = context(session, Permission::Owner).await?;
        let nodes = &session.data.nodes;
        let parent = args.required(0, "parent node")?;
        let name = args.required(1, "node name")?;
        let content = content_parse(args.rest(2))?;

        let mut mindmap = shared.lock().await;
        nodes.mindmap_ensure_loaded(&mut mindmap).await?;
        let parent_id = nodes.node_resolve(&mindmap, parent, args.by_id)?;
        let id = nodes
            .node_add(&mut mindmap, parent_id, name, content, None)
            .await?;
        let added = nodes.node_get(&mut mindmap, id).await?;
        session.history.record(NodeEdit::Add(added));
        Ok(CommandOutput::Id(id))
    })
}

fn node_update(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let (_, shared) = context(session, Permission::Owner).await?;
        let data = &session.data;
        let target = args.required(0, "node")?;
        let name = args.required(1, "node name")?;
        let content = content_parse(args.rest(2))?;

        let mut mindmap = shared.lock().await;
        data.nodes.mindmap_ensure_loaded(&mut mindmap).await?;
        let node_id = data.nodes.node_resolve(&mindmap, target, args.by_id)?;

        // The root carries the mindmap name, which is unique per owner
        if node_id == ROOT_NODE_ID && name != mindmap.name {
            data.mindmaps
                .mindmap_name_check(&mindmap.owner, name)
                .await?;
        }

        let before = Revision::from(&data.nodes.node_get(&mut mindmap, node_id).await?);
        let update = NodeUpdate {
            name: Some(name.to_string()),
            content,
            parent_id: None,
        };
        data.nodes.node_update(&mut mindmap, node_id, update).await?;
        let after = Revision::from(&data.nodes.node_get(&mut mindmap, node_id).await?);
        session.history.record(NodeEdit::Update {
            node_id,
            before,
            after,
        });
        Ok(CommandOutput::Done)
    })
}

fn node_move(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let (_, shared) = context(session, Permission::Owner).await?;
        let nodes = &session.data.nodes;

        let mut mindmap = shared.lock().await;
        nodes.mindmap_ensure_loaded(&mut mindmap).await?;
        let source = nodes.node_resolve(&mindmap, args.required(0, "node")?, args.by_id)?;
        let target = nodes.node_resolve(&mindmap, args.required(1, "target")?, args.by_id)?;
        let from = nodes.node_get(&mut mindmap, source).await?.parent_id;
        nodes.node_move(&mut mindmap, source, target).await?;
        session.history.record(NodeEdit::Move {
            node_id: source,
            from,
            to: target,
        });
        Ok(CommandOutput::Done)
    })
}

fn node_delete(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let (_, shared) = context(session, Permission::Owner).await?;
        let nodes = &session.data.nodes;

        let mut mindmap = shared.lock().await;
        nodes.mindmap_ensure_loaded(&mut mindmap).await?;
        let node_id = nodes.node_resolve(&mindmap, args.required(0, "node")?, args.by_id)?;
        let subtree: Vec<Node> = mindmap
            .preorder_from(node_id)
            .into_iter()
            .filter_map(|id| mindmap.node(id).cloned())
            .collect();
        nodes.node_delete(&mut mindmap, node_id).await?;
        session.history.record(NodeEdit::Delete(subtree));
        Ok(CommandOutput::Done)
    })
}

fn node_find(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let (_, shared) = context(session, Permission::Read).await?;
        let query = args.required(0, "query")?;

        let mut mindmap = shared.lock().await;
        let found = session
            .data
            .nodes
            .node_find(&mut mindmap, FindFields::default(), query)
            .await?;
        Ok(CommandOutput::Nodes(found))
    })
}

fn node_sort(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let (_, shared) = context(session, Permission::Owner).await?;
        let nodes = &session.data.nodes;

        let mut mindmap = shared.lock().await;
        nodes.mindmap_ensure_loaded(&mut mindmap).await?;
        let node_id = match args.get(0) {
            Some(identifier) => nodes.node_resolve(&mindmap, identifier, args.by_id)?,
            None => ROOT_NODE_ID,
        };
        let field = args.get(1).unwrap_or("");
        nodes
            .node_sort(&mut mindmap, node_id, field, args.reverse)
            .await?;
        Ok(CommandOutput::Done)
    })
}

fn node_undo(session: &mut Session, _args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let (_, shared) = context(session, Permission::Owner).await?;
        let mut mindmap = shared.lock().await;
        session.history.undo(&session.data.nodes, &mut mindmap).await?;
        Ok(CommandOutput::Done)
    })
}

fn node_redo(session: &mut Session, _args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let (_, shared) = context(session, Permission::Owner).await?;
        let mut mindmap = shared.lock().await;
        session.history.redo(&session.data.nodes, &mut mindmap).await?;
        Ok(CommandOutput::Done)
    })
}
