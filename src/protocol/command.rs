use std::fmt;

use super::response::{ProtocolError, ProtocolErrorCode};

/// One parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate the box by its identifier
    Login { identifier: String },
    /// Select a voter by the configured key discriminator
    Lookup { key: String },
    /// Ask whether the selected voter may participate in a voting
    Check { voting_id: i64 },
    /// Queue votes for the selected voter; no ids means every open voting
    Queue {
        letters: String,
        voting_ids: Vec<i64>,
    },
    Commit,
    Cancel,
    Status,
    Quit,
}

impl Command {
    /// Parse `<verb> [args...]`, verbs are case-insensitive
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| invalid("empty command"))?
            .to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        let command = match (verb.as_str(), args.as_slice()) {
            ("login", [identifier]) => Self::Login {
                identifier: identifier.to_string(),
            },
            ("lookup", [key]) => Self::Lookup {
                key: key.to_string(),
            },
            ("check", [voting_id]) => Self::Check {
                voting_id: parse_id(voting_id)?,
            },
            ("queue", [letters, ids @ ..]) => Self::Queue {
                letters: letters.to_string(),
                voting_ids: ids.iter().map(|id| parse_id(id)).collect::<Result<_, _>>()?,
            },
            ("commit", []) => Self::Commit,
            ("cancel", []) => Self::Cancel,
            ("status", []) => Self::Status,
            ("quit", []) => Self::Quit,
            ("login" | "lookup" | "check" | "queue" | "commit" | "cancel" | "status" | "quit", _) => {
                return Err(invalid(format!("wrong number of arguments for {verb}")));
            }
            _ => return Err(invalid(format!("unknown command {verb}"))),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Lookup { .. } => "lookup",
            Self::Check { .. } => "check",
            Self::Queue { .. } => "queue",
            Self::Commit => "commit",
            Self::Cancel => "cancel",
            Self::Status => "status",
            Self::Quit => "quit",
        }
    }

    /// Whether the box must be logged in first
    pub fn requires_login(&self) -> bool {
        !matches!(self, Self::Login { .. } | Self::Status | Self::Quit)
    }

    /// Whether the command reads or mutates vote state
    pub fn touches_votes(&self) -> bool {
        matches!(
            self,
            Self::Lookup { .. } | Self::Check { .. } | Self::Queue { .. } | Self::Commit | Self::Cancel
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn invalid(message: impl Into<String>) -> ProtocolError {
    ProtocolError::with_message(ProtocolErrorCode::InvalidCommand, message)
}

fn parse_id(raw: &str) -> Result<i64, ProtocolError> {
    raw.parse()
        .map_err(|_| invalid(format!("invalid voting id {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("LOGIN B1").unwrap(),
            Command::Login {
                identifier: "B1".to_string()
            }
        );
        assert_eq!(
            Command::parse("queue Al 3 4").unwrap(),
            Command::Queue {
                letters: "Al".to_string(),
                voting_ids: vec![3, 4]
            }
        );
        assert_eq!(
            Command::parse("queue al").unwrap(),
            Command::Queue {
                letters: "al".to_string(),
                voting_ids: vec![]
            }
        );
        assert_eq!(Command::parse("  commit  ").unwrap(), Command::Commit);
    }

    #[test]
    fn test_invalid_commands() {
        for line in ["", "vote 1", "check", "check x", "commit now", "queue"] {
            let error = Command::parse(line).unwrap_err();
            assert_eq!(error.code, ProtocolErrorCode::InvalidCommand, "{line}");
        }
    }

    #[test]
    fn test_command_classification() {
        assert!(!Command::Status.requires_login());
        assert!(Command::Commit.requires_login());
        assert!(Command::Commit.touches_votes());
        assert!(!Command::Quit.touches_votes());
    }
}
