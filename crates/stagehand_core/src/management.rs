use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a workload's management interface lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// e.g. `http://127.0.0.1:49153`
    pub base_url: String,
    /// Database the workload serves.
    pub database: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// An authenticated management session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub endpoint: Endpoint,
    pub uid: i64,
    pub password: String,
}

/// Installation state of an extension inside the workload's registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionState {
    Uninstalled,
    Installed,
    ToInstall,
    ToUpgrade,
    ToRemove,
    Uninstallable,
    Other(String),
}

impl ExtensionState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "uninstalled" => Self::Uninstalled,
            "installed" => Self::Installed,
            "to install" => Self::ToInstall,
            "to upgrade" => Self::ToUpgrade,
            "to remove" => Self::ToRemove,
            "uninstallable" => Self::Uninstallable,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninstalled => f.write_str("uninstalled"),
            Self::Installed => f.write_str("installed"),
            Self::ToInstall => f.write_str("to install"),
            Self::ToUpgrade => f.write_str("to upgrade"),
            Self::ToRemove => f.write_str("to remove"),
            Self::Uninstallable => f.write_str("uninstallable"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// An extension as known to the workload's registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub id: i64,
    pub name: String,
    pub state: ExtensionState,
}
