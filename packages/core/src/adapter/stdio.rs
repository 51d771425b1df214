//! Line-oriented stdio adapter
//!
//! Reads one command per line and writes one rendered result per command.
//! Source and presenter are generic over tokio readers and writers, so the
//! same loop serves the terminal and in-memory buffers.

use crate::adapter::{Adapter, AdapterManager};
use crate::models::{Command, CommandOutput};
use crate::session::SessionError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Notify;

/// Connection id the stdio adapter runs under
pub const STDIO_CONNECTION: &str = "stdio";

/// Yields parsed commands until the input ends
#[async_trait]
pub trait CommandSource: Send {
    async fn command_next(&mut self) -> std::io::Result<Option<Command>>;
}

/// Receives the outcome of every command
#[async_trait]
pub trait Presenter: Send {
    async fn present(&mut self, result: &Result<CommandOutput, SessionError>)
        -> std::io::Result<()>;
}

pub struct LineSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> CommandSource for LineSource<R> {
    async fn command_next(&mut self) -> std::io::Result<Option<Command>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(command) = Command::parse(&line) {
                return Ok(Some(command));
            }
        }
        Ok(None)
    }
}

pub struct TextPresenter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> TextPresenter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Text form of a command outcome
pub fn render(result: &Result<CommandOutput, SessionError>) -> String {
    match result {
        Ok(output) => output.to_string(),
        Err(SessionError::Exit) => "bye".to_string(),
        Err(e) => match e.kind() {
            Some(kind) => format!("error [{}]: {}", kind, e),
            None => format!("error: {}", e),
        },
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Presenter for TextPresenter<W> {
    async fn present(
        &mut self,
        result: &Result<CommandOutput, SessionError>,
    ) -> std::io::Result<()> {
        let text = render(result);
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[derive(Default)]
pub struct StdioAdapter {
    stop: Notify,
}

impl StdioAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `source` through `manager` into `presenter` until EOF, exit or stop
    pub async fn serve<S, P>(
        &self,
        manager: &AdapterManager,
        mut source: S,
        mut presenter: P,
    ) -> anyhow::Result<()>
    where
        S: CommandSource,
        P: Presenter,
    {
        tracing::info!("Stdio adapter started");
        loop {
            let command = tokio::select! {
                _ = self.stop.notified() => {
                    tracing::info!("Stdio adapter stopped");
                    break;
                }
                next = source.command_next() => match next? {
                    Some(command) => command,
                    None => {
                        tracing::info!("Stdio input closed");
                        break;
                    }
                },
            };

            let result = manager.command_run(STDIO_CONNECTION, command).await;
            presenter.present(&result).await?;
            if matches!(result, Err(SessionError::Exit)) {
                return Ok(());
            }
        }
        manager.connection_close(STDIO_CONNECTION).await;
        Ok(())
    }
}

#[async_trait]
impl Adapter for StdioAdapter {
    fn kind(&self) -> &'static str {
        "stdio"
    }

    async fn run(&self, manager: Arc<AdapterManager>) -> anyhow::Result<()> {
        let source = LineSource::new(BufReader::new(tokio::io::stdin()));
        let presenter = TextPresenter::new(tokio::io::stdout());
        self.serve(&manager, source, presenter).await
    }

    fn stop(&self) {
        self.stop.notify_one();
    }
}
