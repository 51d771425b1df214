//! Commands and Results
//!
//! A [`Command`] is the uniform unit of work every adapter produces:
//! `scope operation [args...] [--flag...]`. A [`CommandOutput`] is the
//! structured result handed back to the adapter's presenter.

use crate::models::mindmap::MindmapInfo;
use crate::models::node::NodeInfo;
use crate::models::user::UserInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flag selecting numeric ids instead of dotted indices
pub const FLAG_ID: &str = "--id";

/// Flag inverting sort order
pub const FLAG_REVERSE: &str = "--reverse";

/// One parsed command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub scope: String,
    pub operation: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new<S: Into<String>>(scope: S, operation: S, args: Vec<String>) -> Self {
        Self {
            scope: scope.into(),
            operation: operation.into(),
            args,
        }
    }

    /// Parse a command line
    ///
    /// Words are split on whitespace; double quotes group words into one
    /// argument. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = split_words(line).into_iter();
        let scope = words.next()?;
        let operation = words.next().unwrap_or_default();
        Some(Self {
            scope,
            operation,
            args: words.collect(),
        })
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope)?;
        if !self.operation.is_empty() {
            write!(f, " {}", self.operation)?;
        }
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        words.push(current);
    }
    words
}

/// Structured result of a successful command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandOutput {
    /// Completed with nothing to report
    Done,
    /// Identifier of a created entity
    Id(i64),
    /// Visibility of a mindmap after `mindmap permission`
    Public(bool),
    /// Human-readable status line
    Message(String),
    /// Preformatted block (help text, tree views)
    Text(String),
    User(UserInfo),
    Mindmap(MindmapInfo),
    Mindmaps(Vec<MindmapInfo>),
    Nodes(Vec<NodeInfo>),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Done => write!(f, "ok"),
            CommandOutput::Id(id) => write!(f, "{}", id),
            CommandOutput::Public(is_public) => {
                write!(f, "{}", if *is_public { "public" } else { "private" })
            }
            CommandOutput::Message(message) | CommandOutput::Text(message) => {
                write!(f, "{}", message)
            }
            CommandOutput::User(user) => write!(f, "{}", user),
            CommandOutput::Mindmap(mindmap) => write!(f, "{}", mindmap),
            CommandOutput::Mindmaps(mindmaps) => {
                if mindmaps.is_empty() {
                    return write!(f, "no mindmaps");
                }
                let lines: Vec<String> = mindmaps.iter().map(|m| m.to_string()).collect();
                write!(f, "{}", lines.join("\n"))
            }
            CommandOutput::Nodes(nodes) => {
                if nodes.is_empty() {
                    return write!(f, "no nodes");
                }
                let lines: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
                write!(f, "{}", lines.join("\n"))
            }
        }
    }
}
