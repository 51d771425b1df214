//! Command normalisation and validation
//!
//! Runs before a command reaches the executor: expands scope and operation
//! aliases, folds every help form into `help help [scope [operation]]`, and
//! checks argument counts, flags and keywords against the catalogue.

use crate::models::Command;
use crate::session::catalog::{
    command_lookup, scope_resolve, SCOPE_HELP, SCOPE_MINDMAP, SCOPE_SYSTEM,
};
use crate::session::error::SessionError;

const HELP_OPERATION: &str = "help";

/// Expand aliases and validate `command`
pub fn command_prepare(command: Command) -> Result<Command, SessionError> {
    // `exit` and `quit` also work without their scope
    let command = match command.scope.as_str() {
        "exit" | "quit" if command.operation.is_empty() => {
            Command::new(SCOPE_SYSTEM.to_string(), command.scope, command.args)
        }
        _ => command,
    };

    let scope = scope_resolve(&command.scope)
        .ok_or_else(|| SessionError::InvalidScope(command.scope.clone()))?;

    if scope == SCOPE_HELP {
        let mut args = Vec::with_capacity(command.args.len() + 1);
        if !command.operation.is_empty() {
            args.push(command.operation);
        }
        args.extend(command.args);
        return help_prepare(args);
    }

    let spec = command_lookup(scope, &command.operation).ok_or_else(|| {
        SessionError::InvalidOperation {
            scope: scope.to_string(),
            operation: command.operation.clone(),
        }
    })?;

    if scope == SCOPE_SYSTEM && spec.operation == HELP_OPERATION {
        return help_prepare(command.args);
    }

    let mut positional = 0;
    for arg in &command.args {
        if arg.starts_with("--") && arg.len() > 2 {
            if !spec.flags.contains(&arg.as_str()) {
                return Err(SessionError::invalid_argument(format!(
                    "'{}' does not accept {}",
                    spec.usage, arg
                )));
            }
        } else {
            positional += 1;
        }
    }

    let too_many = spec.max_args.map(|max| positional > max).unwrap_or(false);
    if positional < spec.min_args || too_many {
        return Err(SessionError::invalid_argument(format!(
            "usage: {}",
            spec.usage
        )));
    }

    if spec.scope == SCOPE_MINDMAP && spec.operation == "permission" {
        if let Some(keyword) = command.args.get(1) {
            if keyword != "public" && keyword != "private" {
                return Err(SessionError::invalid_argument(format!(
                    "expected public or private, got '{}'",
                    keyword
                )));
            }
        }
    }

    Ok(Command::new(scope, spec.operation, command.args))
}

fn help_prepare(mut args: Vec<String>) -> Result<Command, SessionError> {
    if args.len() > 2 {
        return Err(SessionError::invalid_argument(
            "usage: help [scope [operation]]",
        ));
    }
    if let Some(scope) = args.first() {
        let canonical =
            scope_resolve(scope).ok_or_else(|| SessionError::InvalidScope(scope.clone()))?;
        if let Some(operation) = args.get(1) {
            let spec = command_lookup(canonical, operation).ok_or_else(|| {
                SessionError::InvalidOperation {
                    scope: canonical.to_string(),
                    operation: operation.clone(),
                }
            })?;
            args[1] = spec.operation.to_string();
        }
        args[0] = canonical.to_string();
    }
    Ok(Command::new(SCOPE_HELP, HELP_OPERATION, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ErrorKind;

    fn prepare(line: &str) -> Result<Command, SessionError> {
        command_prepare(Command::parse(line).unwrap())
    }

    #[test]
    fn test_aliases_expand() {
        let command = prepare("n m 1.1 2").unwrap();
        assert_eq!(command.scope, "node");
        assert_eq!(command.operation, "move");
        assert_eq!(command.args, vec!["1.1", "2"]);

        let command = prepare("m p ideas public").unwrap();
        assert_eq!(command.operation, "permission");
    }

    #[test]
    fn test_help_forms_normalise() {
        for line in ["help", "h", "system help", "s h"] {
            let command = prepare(line).unwrap();
            assert_eq!((command.scope.as_str(), command.operation.as_str()), ("help", "help"));
            assert!(command.args.is_empty());
        }
        let command = prepare("help n a").unwrap();
        assert_eq!(command.args, vec!["node", "add"]);
    }

    #[test]
    fn test_bare_exit_is_system_exit() {
        let command = prepare("quit").unwrap();
        assert_eq!((command.scope.as_str(), command.operation.as_str()), ("system", "quit"));
        assert!(prepare("exit now").is_err());
    }

    #[test]
    fn test_unknown_scope_and_operation() {
        let err = prepare("zap add").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidScope));
        let err = prepare("node fly").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
    }

    #[test]
    fn test_argument_counts_and_flags() {
        assert!(prepare("node add 0 first priority:1 --id").is_ok());
        assert!(prepare("node sort --reverse").is_ok());
        assert!(prepare("node sort 0 priority --reverse --id").is_ok());

        for line in [
            "node add 0",
            "node move 1 2 3",
            "mindmap list extra",
            "user delete",
            "user add bob pw --id",
            "node delete 1 --reverse",
            "mindmap permission ideas shared",
        ] {
            let err = prepare(line).unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument), "{}", line);
        }
    }
}
