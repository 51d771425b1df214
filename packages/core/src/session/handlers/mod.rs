//! Command handlers
//!
//! One file per scope. Every handler receives the session and the raw
//! argument list (flags included) and returns a boxed future, so all of them
//! share the [`Handler`] pointer type and fit in one dispatch table.

mod mindmap;
mod node;
mod system;
mod user;

use crate::models::{CommandOutput, FLAG_ID, FLAG_REVERSE};
use crate::session::error::SessionError;
use crate::session::Session;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};

pub(crate) type HandlerResult = Result<CommandOutput, SessionError>;

pub(crate) type Handler = for<'a> fn(&'a mut Session, Vec<String>) -> BoxFuture<'a, HandlerResult>;

/// scope -> operation -> handler
pub(crate) type HandlerTable = HashMap<&'static str, HashMap<&'static str, Handler>>;

pub(crate) fn table() -> HandlerTable {
    let mut table = HandlerTable::new();
    user::register(&mut table);
    mindmap::register(&mut table);
    node::register(&mut table);
    system::register(&mut table);
    table
}

/// Arguments split into positionals and recognised flags
pub(crate) struct Args {
    positional: Vec<String>,
    pub by_id: bool,
    pub reverse: bool,
}

impl Args {
    pub fn parse(raw: Vec<String>) -> Self {
        let mut args = Args {
            positional: Vec::with_capacity(raw.len()),
            by_id: false,
            reverse: false,
        };
        for arg in raw {
            match arg.as_str() {
                FLAG_ID => args.by_id = true,
                FLAG_REVERSE => args.reverse = true,
                _ => args.positional.push(arg),
            }
        }
        args
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.positional.get(position).map(String::as_str)
    }

    pub fn required(&self, position: usize, what: &str) -> Result<&str, SessionError> {
        self.get(position)
            .ok_or_else(|| SessionError::invalid_argument(format!("missing {}", what)))
    }

    pub fn rest(&self, from: usize) -> &[String] {
        self.positional.get(from..).unwrap_or(&[])
    }
}

/// Parse `key:value` pairs; the value may be empty
pub(crate) fn content_parse(pairs: &[String]) -> Result<BTreeMap<String, String>, SessionError> {
    let mut content = BTreeMap::new();
    for pair in pairs {
        match pair.split_once(':') {
            Some((key, value)) if !key.is_empty() => {
                content.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(SessionError::invalid_argument(format!(
                    "expected key:value, got '{}'",
                    pair
                )))
            }
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_split_flags() {
        let args = Args::parse(vec!["0".into(), "--id".into(), "name".into(), "--reverse".into()]);
        assert!(args.by_id);
        assert!(args.reverse);
        assert_eq!(args.get(0), Some("0"));
        assert_eq!(args.get(1), Some("name"));
        assert!(args.rest(2).is_empty());
    }

    #[test]
    fn test_content_pairs() {
        let content = content_parse(&["a:1".into(), "b:x:y".into(), "c:".into()]).unwrap();
        assert_eq!(content.get("a").map(String::as_str), Some("1"));
        assert_eq!(content.get("b").map(String::as_str), Some("x:y"));
        assert_eq!(content.get("c").map(String::as_str), Some(""));

        assert!(content_parse(&["novalue".into()]).is_err());
        assert!(content_parse(&[":v".into()]).is_err());
    }
}
