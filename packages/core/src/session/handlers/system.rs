//! `system` and `help` scope handlers

use super::{Args, Handler, HandlerResult, HandlerTable};
use crate::models::CommandOutput;
use crate::session::catalog::{help_text, SCOPE_HELP, SCOPE_SYSTEM};
use crate::session::error::SessionError;
use crate::session::Session;
use futures::future::BoxFuture;

pub(super) fn register(table: &mut HandlerTable) {
    let operations = table.entry(SCOPE_SYSTEM).or_default();
    operations.insert("exit", system_exit as Handler);
    operations.insert("quit", system_exit as Handler);
    operations.insert("help", help as Handler);

    table.entry(SCOPE_HELP).or_default().insert("help", help as Handler);
}

fn system_exit(session: &mut Session, _args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        tracing::info!("Session {} requested exit", session.id());
        Err(SessionError::Exit)
    })
}

fn help(_session: &mut Session, args: Vec<String>) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let args = Args::parse(args);
        let text = help_text(args.get(0), args.get(1))?;
        Ok(CommandOutput::Text(text))
    })
}
