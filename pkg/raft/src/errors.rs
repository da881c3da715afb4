use thiserror::Error;

use crate::types::{LogIndex, ServerId};

/// Errors surfaced by the consensus layer. Booking-level errors (`UnknownShow`, `SeatTaken`, ...)
/// live in the `booking` crate and wrap these where a proposal crosses the consensus boundary.
#[derive(Debug, Error)]
pub enum RaftError {
    #[error("log append at index {attempted} is not dense (expected {expected})")]
    InconsistentAppend { expected: LogIndex, attempted: LogIndex },

    #[error("this node is not the Raft leader{}", .leader_hint.as_ref().map(|l| format!(" (last known leader: {l})")).unwrap_or_default())]
    NotLeader { leader_hint: Option<ServerId> },

    #[error("leadership was lost while this proposal was pending")]
    LeadershipLost,

    #[error("proposal timed out waiting for commit and apply")]
    ProposalTimeout,

    #[error("peer {0} is unreachable")]
    PeerUnavailable(ServerId),

    #[error("internal consensus error: {0}")]
    Internal(String),
}

pub type RaftResult<T> = Result<T, RaftError>;
