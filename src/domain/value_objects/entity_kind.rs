use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// 同期対象のドメインコレクション。テーブル名と API パスの両方を導出する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Clients,
    Quotes,
    WorkOrders,
    Checklists,
    Charges,
}

impl EntityKind {
    pub const fn all() -> [EntityKind; 5] {
        [
            EntityKind::Clients,
            EntityKind::Quotes,
            EntityKind::WorkOrders,
            EntityKind::Checklists,
            EntityKind::Charges,
        ]
    }

    /// Canonical snake_case name, also the local table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Clients => "clients",
            EntityKind::Quotes => "quotes",
            EntityKind::WorkOrders => "work_orders",
            EntityKind::Checklists => "checklists",
            EntityKind::Charges => "charges",
        }
    }

    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    /// Kebab-case URL segment used by the remote boundary.
    pub fn route(&self) -> &'static str {
        match self {
            EntityKind::Clients => "clients",
            EntityKind::Quotes => "quotes",
            EntityKind::WorkOrders => "work-orders",
            EntityKind::Checklists => "checklists",
            EntityKind::Charges => "charges",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "clients" => Ok(EntityKind::Clients),
            "quotes" => Ok(EntityKind::Quotes),
            "work_orders" | "work-orders" => Ok(EntityKind::WorkOrders),
            "checklists" => Ok(EntityKind::Checklists),
            "charges" => Ok(EntityKind::Charges),
            other => Err(format!("Unknown entity kind: {other}")),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
