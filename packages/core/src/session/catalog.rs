//! Command catalogue
//!
//! Static description of every command: aliases, argument bounds, accepted
//! flags, usage and summary. Validation and the help text both read it.

use crate::models::{FLAG_ID, FLAG_REVERSE};
use crate::session::error::SessionError;

pub const SCOPE_USER: &str = "user";
pub const SCOPE_MINDMAP: &str = "mindmap";
pub const SCOPE_NODE: &str = "node";
pub const SCOPE_SYSTEM: &str = "system";
pub const SCOPE_HELP: &str = "help";

/// Scope names with their one-letter aliases
pub const SCOPES: &[(&str, &str)] = &[
    (SCOPE_SYSTEM, "s"),
    (SCOPE_USER, "u"),
    (SCOPE_MINDMAP, "m"),
    (SCOPE_NODE, "n"),
    (SCOPE_HELP, "h"),
];

pub struct CommandSpec {
    pub scope: &'static str,
    pub operation: &'static str,
    pub alias: &'static str,
    /// Bounds on positional arguments; flags are counted separately
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub flags: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
}

const NO_FLAGS: &[&str] = &[];
const ID_FLAG: &[&str] = &[FLAG_ID];
const SORT_FLAGS: &[&str] = &[FLAG_REVERSE, FLAG_ID];

macro_rules! spec {
    ($scope:expr, $op:expr, $alias:expr, $min:expr, $max:expr, $flags:expr, $usage:expr, $summary:expr) => {
        CommandSpec {
            scope: $scope,
            operation: $op,
            alias: $alias,
            min_args: $min,
            max_args: $max,
            flags: $flags,
            usage: $usage,
            summary: $summary,
        }
    };
}

pub static COMMANDS: &[CommandSpec] = &[
    spec!(SCOPE_USER, "add", "a", 1, Some(2), NO_FLAGS,
        "user add <name> [password]", "Create a user"),
    spec!(SCOPE_USER, "update", "u", 1, Some(3), NO_FLAGS,
        "user update <name> [newname] [newpassword]", "Rename the selected user or change its password"),
    spec!(SCOPE_USER, "delete", "d", 1, Some(1), NO_FLAGS,
        "user delete <name>", "Delete the selected user and all its mindmaps"),
    spec!(SCOPE_USER, "select", "s", 0, Some(2), NO_FLAGS,
        "user select [name] [password]", "Log in as a user; no name logs out"),
    spec!(SCOPE_MINDMAP, "add", "a", 1, Some(1), NO_FLAGS,
        "mindmap add <name>", "Create a private mindmap"),
    spec!(SCOPE_MINDMAP, "update", "u", 2, Some(2), NO_FLAGS,
        "mindmap update <name> <newname>", "Rename a mindmap and its root node"),
    spec!(SCOPE_MINDMAP, "delete", "d", 0, Some(1), NO_FLAGS,
        "mindmap delete [name]", "Delete the named or the selected mindmap"),
    spec!(SCOPE_MINDMAP, "permission", "p", 1, Some(2), NO_FLAGS,
        "mindmap permission <name> [public|private]", "Show or set mindmap visibility"),
    spec!(SCOPE_MINDMAP, "import", "i", 1, Some(2), NO_FLAGS,
        "mindmap import <file> [json|xml]", "Import a mindmap file and select it"),
    spec!(SCOPE_MINDMAP, "export", "e", 1, Some(2), NO_FLAGS,
        "mindmap export <file> [json|xml]", "Export the selected mindmap"),
    spec!(SCOPE_MINDMAP, "select", "s", 0, Some(1), NO_FLAGS,
        "mindmap select [name]", "Select a mindmap; no name deselects"),
    spec!(SCOPE_MINDMAP, "list", "l", 0, Some(0), NO_FLAGS,
        "mindmap list", "List readable mindmaps"),
    spec!(SCOPE_MINDMAP, "view", "v", 0, Some(1), ID_FLAG,
        "mindmap view [index] [--id]", "Show the tree, optionally from a node"),
    spec!(SCOPE_NODE, "add", "a", 2, None, ID_FLAG,
        "node add <parent> <name> [key:value]... [--id]", "Add a child node"),
    spec!(SCOPE_NODE, "update", "u", 2, None, ID_FLAG,
        "node update <node> <name> [key:value]... [--id]", "Rename a node and edit its content; an empty value removes a key"),
    spec!(SCOPE_NODE, "move", "m", 2, Some(2), ID_FLAG,
        "node move <node> <target> [--id]", "Move a node under a new parent"),
    spec!(SCOPE_NODE, "delete", "d", 1, Some(1), ID_FLAG,
        "node delete <node> [--id]", "Delete a node and its subtree"),
    spec!(SCOPE_NODE, "find", "f", 1, Some(1), ID_FLAG,
        "node find <query> [--id]", "Search names and content"),
    spec!(SCOPE_NODE, "sort", "s", 0, Some(2), SORT_FLAGS,
        "node sort [node] [field] [--reverse] [--id]", "Sort a subtree by name or a content field"),
    spec!(SCOPE_NODE, "undo", "", 0, Some(0), NO_FLAGS,
        "node undo", "Revert the last node edit of this session"),
    spec!(SCOPE_NODE, "redo", "", 0, Some(0), NO_FLAGS,
        "node redo", "Reapply the last undone node edit"),
    spec!(SCOPE_SYSTEM, "exit", "e", 0, Some(0), NO_FLAGS,
        "system exit", "Close the session"),
    spec!(SCOPE_SYSTEM, "quit", "q", 0, Some(0), NO_FLAGS,
        "system quit", "Close the session"),
    spec!(SCOPE_SYSTEM, "help", "h", 0, Some(2), NO_FLAGS,
        "system help [scope [operation]]", "Show help"),
    spec!(SCOPE_HELP, "help", "", 0, Some(2), NO_FLAGS,
        "help [scope [operation]]", "Show help"),
];

/// Canonical scope name for `word`
pub fn scope_resolve(word: &str) -> Option<&'static str> {
    SCOPES
        .iter()
        .find(|(name, alias)| *name == word || *alias == word)
        .map(|(name, _)| *name)
}

/// Catalogue entry for `operation` (or its alias) within canonical `scope`
pub fn command_lookup(scope: &str, operation: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| {
        spec.scope == scope
            && (spec.operation == operation || (!spec.alias.is_empty() && spec.alias == operation))
    })
}

/// Help text for everything, a scope, or one command
pub fn help_text(scope: Option<&str>, operation: Option<&str>) -> Result<String, SessionError> {
    let scope = match scope {
        None => {
            let mut lines = vec!["Commands (scope operation [args]):".to_string()];
            lines.extend(COMMANDS.iter().map(help_line));
            lines.push("Scope aliases: s=system u=user m=mindmap n=node h=help".to_string());
            return Ok(lines.join("\n"));
        }
        Some(word) => {
            scope_resolve(word).ok_or_else(|| SessionError::InvalidScope(word.to_string()))?
        }
    };

    match operation {
        None => {
            let lines: Vec<String> = COMMANDS
                .iter()
                .filter(|spec| spec.scope == scope)
                .map(help_line)
                .collect();
            Ok(lines.join("\n"))
        }
        Some(operation) => {
            let spec = command_lookup(scope, operation).ok_or_else(|| {
                SessionError::InvalidOperation {
                    scope: scope.to_string(),
                    operation: operation.to_string(),
                }
            })?;
            let mut text = format!("{}\n  {}", spec.usage, spec.summary);
            if !spec.alias.is_empty() {
                text.push_str(&format!("\n  alias: {}", spec.alias));
            }
            Ok(text)
        }
    }
}

fn help_line(spec: &CommandSpec) -> String {
    format!("  {:<50} {}", spec.usage, spec.summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve() {
        assert_eq!(scope_resolve("n"), Some(SCOPE_NODE));
        assert_eq!(scope_resolve("mindmap"), Some(SCOPE_MINDMAP));
        assert_eq!(scope_resolve("x"), None);
        assert_eq!(command_lookup(SCOPE_MINDMAP, "p").map(|s| s.operation), Some("permission"));
        assert_eq!(command_lookup(SCOPE_NODE, "f").map(|s| s.operation), Some("find"));
        assert!(command_lookup(SCOPE_USER, "list").is_none());
    }

    #[test]
    fn test_help_for_one_command() {
        let text = help_text(Some("n"), Some("move")).unwrap();
        assert!(text.starts_with("node move <node> <target>"));
        assert!(text.contains("alias: m"));

        assert!(matches!(
            help_text(Some("node"), Some("fly")),
            Err(SessionError::InvalidOperation { .. })
        ));
        assert!(matches!(help_text(Some("zz"), None), Err(SessionError::InvalidScope(_))));
    }

    #[test]
    fn test_full_help_lists_every_command() {
        let text = help_text(None, None).unwrap();
        for spec in COMMANDS {
            assert!(text.contains(spec.usage));
        }
    }
}
