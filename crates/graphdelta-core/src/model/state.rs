use serde::{Deserialize, Serialize};

/// Relation of a node to its last known persisted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl TrackingState {
    /// True for every state except `Unchanged`
    pub fn is_changed(self) -> bool {
        self != TrackingState::Unchanged
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackingState::Unchanged => "unchanged",
            TrackingState::Added => "added",
            TrackingState::Modified => "modified",
            TrackingState::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
