//! Command registry error types.

use thiserror::Error;

/// Errors surfaced by command registration.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The name is protected: owned by a core plugin or on the restricted
    /// deny-list. The existing registration is left untouched.
    #[error("command '{command}' already exists and cannot be overridden")]
    AlreadyExists { plugin: String, command: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_names_the_command() {
        let err = CommandError::AlreadyExists {
            plugin: "Rogue".to_string(),
            command: "quit".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command 'quit' already exists and cannot be overridden"
        );
    }
}
