use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

impl MutationOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOperation::Create => "create",
            MutationOperation::Update => "update",
            MutationOperation::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "create" => Ok(MutationOperation::Create),
            "update" => Ok(MutationOperation::Update),
            "delete" => Ok(MutationOperation::Delete),
            other => Err(format!("Unknown mutation operation: {other}")),
        }
    }
}

impl fmt::Display for MutationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationStatus {
    Pending,
    InFlight,
    Failed,
    Applied,
    Unknown(String),
}

impl MutationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::InFlight => "in_flight",
            MutationStatus::Failed => "failed",
            MutationStatus::Applied => "applied",
            MutationStatus::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationStatus::Applied)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for MutationStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => MutationStatus::Pending,
            "in_flight" => MutationStatus::InFlight,
            "failed" => MutationStatus::Failed,
            "applied" => MutationStatus::Applied,
            other => MutationStatus::Unknown(other.to_string()),
        }
    }
}
