use std::fmt;

/// Sync state of the node, recomputed at most once per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Not computed in the current round yet.
    #[default]
    NotCalculated,

    /// Behind the network, on a fork, or disconnected. The sync loop keeps
    /// requesting and executing blocks.
    NotSynchronized,

    /// Holding the highest known block with no fork. The node may take part
    /// in consensus.
    Synchronized,
}

impl NodeState {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, NodeState::Synchronized)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::NotCalculated => "not calculated",
            NodeState::NotSynchronized => "not synchronized",
            NodeState::Synchronized => "synchronized",
        };
        f.write_str(name)
    }
}
