//! Wire types and transport seam for the two peer RPCs. The consensus module is
//! transport-agnostic: it depends only on [`RaftTransport`], so the HTTP client used to actually
//! reach peers lives in the `booking` crate, next to the HTTP server that receives these calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RaftResult;
use crate::types::{LogEntry, LogIndex, ServerId, Term};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    /// The highest log index present locally after processing this request — lets the leader
    /// catch up a lagging follower faster than decrementing `next_index` one at a time.
    pub match_index_hint: LogIndex,
}

/// Outbound peer RPC client, implemented by the booking crate over HTTP. Errors from this trait
/// are always treated as `PeerUnavailable` by the consensus driver — they never propagate to
/// clients.
#[async_trait]
pub trait RaftTransport: Send + Sync {
    async fn request_vote(&self, peer: &ServerId, request: RequestVoteRequest) -> RaftResult<RequestVoteResponse>;

    async fn append_entries(&self, peer: &ServerId, request: AppendEntriesRequest) -> RaftResult<AppendEntriesResponse>;
}
