use serde::{Deserialize, Serialize};

/// Settings shared by every binary in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

/// How summary writes resolve against a record another producer already wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Apply every write; whichever lands last wins for the fields it touches.
    #[default]
    LastWriteWins,
    /// Skip a write whose `pushed_at` is older than the stored record's.
    PushedAtGuard,
}
