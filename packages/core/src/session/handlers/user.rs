//! `user` scope handlers

use super::{Args, Handler, HandlerResult, HandlerTable};
use crate::models::{CommandOutput, UserInfo};
use crate::session::catalog::SCOPE_USER;
use crate::session::error::SessionError;
use crate::session::Session;
use futures::future::BoxFuture;

pub(super) fn register(table: &mut HandlerTable) {
    let operations = table.entry(SCOPE_USER).or_default();
    operations.insert("add", user_add as Handler);
    operations.insert("update", user_update as Handler);
    operations.insert("delete", user_delete as Handler);
    operations.insert("select", user_select as Handler);
}

/// The named user must be the one logged in
fn require_self(session: &Session, name: &str) -> Result<crate::models::User, SessionError> {
    let user = session.require_user()?;
    if user.username != name {
        return Err(SessionError::permission_denied(format!(
            "'{}' is not the selected user",
            name
        )));
    }
    Ok(user)
}

fn user_add(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let name = args.required(0, "user name")?;
        let password = args.get(1).unwrap_or("");

        let id = session.data.users.user_add(name, password).await?;
        Ok(CommandOutput::Id(id))
    })
}

fn user_update(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = require_self(session, args.required(0, "user name")?)?;
        let new_name = args.get(1).filter(|name| !name.is_empty());
        let new_password = args.get(2);

        let updated = session
            .data
            .users
            .user_update(&user, new_name, new_password)
            .await?;

        if updated.username != user.username {
            if let Some(shared) = &session.mindmap {
                let mut mindmap = shared.lock().await;
                if mindmap.owner == user.username {
                    mindmap.owner = updated.username.clone();
                }
            }
        }
        session.user = Some(updated);
        Ok(CommandOutput::Done)
    })
}

fn user_delete(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let user = require_self(session, args.required(0, "user name")?)?;

        session.data.users.user_delete(&user).await?;
        session.user = None;
        session.mindmap_set(None);
        Ok(CommandOutput::Done)
    })
}

fn user_select(session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let name = match args.get(0) {
            Some(name) => name,
            None => {
                session.user = None;
                session.mindmap_set(None);
                return Ok(CommandOutput::Done);
            }
        };
        let password = args.get(1).unwrap_or("");

        let users = &session.data.users;
        if !users.user_authenticate(name, password).await? {
            return Err(SessionError::permission_denied(format!(
                "invalid credentials for '{}'",
                name
            )));
        }
        let user = users.user_find(name).await?;
        let info = UserInfo::from(&user);

        tracing::info!("Session {} logged in as '{}'", session.id(), user.username);
        session.user = Some(user);
        session.mindmap_set(None);
        Ok(CommandOutput::User(info))
    })
}
