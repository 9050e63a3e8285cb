use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime status of a node in a built DAG
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Waiting for dependencies or for a free execution slot
    #[default]
    Pending,
    /// Handler is running
    Processing,
    /// Handler returned successfully
    Completed,
    /// Handler returned an error
    Failed,
    /// Never launched (upstream failure or cancellation)
    Skipped,
}

impl NodeStatus {
    /// All statuses in category order.
    pub const ALL: [NodeStatus; 5] = [
        NodeStatus::Pending,
        NodeStatus::Processing,
        NodeStatus::Completed,
        NodeStatus::Failed,
        NodeStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Processing => "processing",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }

    /// Stable category index used by the graph exporters.
    pub fn category(&self) -> usize {
        match self {
            NodeStatus::Pending => 0,
            NodeStatus::Processing => 1,
            NodeStatus::Completed => 2,
            NodeStatus::Failed => 3,
            NodeStatus::Skipped => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
