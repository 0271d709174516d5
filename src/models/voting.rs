use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a voting's discriminator values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminationMode {
    /// Only voters whose value is listed may participate
    #[default]
    Allow,
    /// Voters whose value is listed may not participate
    Deny,
}

impl fmt::Display for DiscriminationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

impl std::str::FromStr for DiscriminationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(format!("Invalid discrimination mode: {s}")),
        }
    }
}

/// Optional grouping of votings shown together to a voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingGroup {
    pub voting_group_id: i64,
    pub election_id: i64,
    pub name: String,
}

/// A single ballot within an election
/// Maps to `votings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voting {
    pub voting_id: i64,
    pub election_id: i64,
    pub voting_group_id: Option<i64>,
    pub name: String,
    /// Name of the voter discriminator this voting is scoped by, if any
    pub discriminator: Option<String>,
    pub discrimination_mode: DiscriminationMode,
    pub discriminator_values: BTreeSet<String>,
}

/// New Voting for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVoting {
    pub election_id: i64,
    pub voting_group_id: Option<i64>,
    pub name: String,
    pub discriminator: Option<String>,
    pub discrimination_mode: DiscriminationMode,
    pub discriminator_values: BTreeSet<String>,
}

impl NewVoting {
    /// Voting open to every voter of the election
    pub fn unrestricted(election_id: i64, name: impl Into<String>) -> Self {
        Self {
            election_id,
            voting_group_id: None,
            name: name.into(),
            discriminator: None,
            discrimination_mode: DiscriminationMode::Allow,
            discriminator_values: BTreeSet::new(),
        }
    }

    pub fn scoped(
        election_id: i64,
        name: impl Into<String>,
        discriminator: impl Into<String>,
        mode: DiscriminationMode,
        values: &[&str],
    ) -> Self {
        Self {
            election_id,
            voting_group_id: None,
            name: name.into(),
            discriminator: Some(discriminator.into()),
            discrimination_mode: mode,
            discriminator_values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Voting {
    /// Whether a discriminator value passes this voting's allow/deny list
    pub fn admits_value(&self, value: &str) -> bool {
        let listed = self.discriminator_values.contains(value);
        match self.discrimination_mode {
            DiscriminationMode::Allow => listed,
            DiscriminationMode::Deny => !listed,
        }
    }
}
