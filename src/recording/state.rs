use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-source lifecycle as seen by the supervisor.
///
/// Every source starts `Idle` when a process starts; the state is always
/// re-derived from the session table, never carried in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Idle,
    Starting,
    Recording,
}

impl Default for SourceState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SourceState {
    pub fn from_tracking(has_session: bool) -> Self {
        if has_session {
            SourceState::Recording
        } else {
            SourceState::Idle
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceState::Idle => "idle",
            SourceState::Starting => "starting",
            SourceState::Recording => "recording",
        };
        f.write_str(label)
    }
}
