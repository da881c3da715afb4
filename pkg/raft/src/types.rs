use serde::{Deserialize, Serialize};

/// Identifies a single node in the cluster. Assigned by configuration, not by the protocol.
pub type ServerId = String;

/// A logical election epoch; monotonic across the cluster.
pub type Term = u64;

/// A dense, 1-based position in a node's log.
pub type LogIndex = u64;

/// Persistent per-node state: survives restarts (when the log is file-backed; lost otherwise).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    pub current_term: Term,
    pub voted_for: Option<ServerId>,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            current_term: 0,
            voted_for: None,
        }
    }
}

/// A command applied to the replicated state machine. Carried as an opaque JSON payload on the
/// wire (see [`crate::state_machine::Command`] for the decoded shape) so the consensus layer
/// never needs to understand booking semantics.
pub type CommandPayload = Vec<u8>;

/// A single entry in the replicated log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub command: CommandPayload,
}
