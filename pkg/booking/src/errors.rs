use raft::RaftError;
use thiserror::Error;

/// Error kinds surfaced by the reservation coordinator. Each variant names
/// the status an HTTP handler maps it to; the mapping itself lives in `http.rs`.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("session is invalid or expired")]
    Unauthenticated,

    #[error("this operation requires the administrator account")]
    PermissionDenied,

    #[error(transparent)]
    NotLeader(#[from] NotLeaderError),

    #[error("unknown show")]
    UnknownShow,

    #[error("seat is out of range for this show")]
    SeatOutOfRange,

    #[error("seat is already reserved")]
    SeatTaken,

    #[error("payment declined: {0}")]
    PaymentFailed(String),

    #[error("leadership was lost while this request was pending")]
    LeadershipLost,

    #[error("request timed out waiting for consensus")]
    ProposalTimeout,

    #[error("peer {0} is unreachable")]
    PeerUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
#[error("this node is not the Raft leader{}", .leader_hint.as_ref().map(|l| format!(" (last known leader: {l})")).unwrap_or_default())]
pub struct NotLeaderError {
    pub leader_hint: Option<String>,
}

impl From<RaftError> for BookingError {
    fn from(e: RaftError) -> Self {
        match e {
            RaftError::NotLeader { leader_hint } => BookingError::NotLeader(NotLeaderError { leader_hint }),
            RaftError::LeadershipLost => BookingError::LeadershipLost,
            RaftError::ProposalTimeout => BookingError::ProposalTimeout,
            RaftError::PeerUnavailable(peer) => BookingError::PeerUnavailable(peer),
            RaftError::InconsistentAppend { .. } | RaftError::Internal(_) => BookingError::Internal(e.to_string()),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
