//! Outbound peer RPC client. Implements [`raft::RaftTransport`] over plain
//! HTTP/JSON `reqwest` calls to each peer's consensus endpoints. Any transport-level failure
//! (connection refused, timeout, non-2xx, malformed body) collapses to `RaftError::PeerUnavailable`
//! — the consensus driver never distinguishes the failure mode further.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use raft::rpc::{AppendEntriesRequest, AppendEntriesResponse, RaftTransport, RequestVoteRequest, RequestVoteResponse};
use raft::{RaftError, RaftResult, ServerId};

pub struct PeerClient {
    client: reqwest::Client,
    peers: HashMap<ServerId, SocketAddr>,
}

impl PeerClient {
    pub fn new(peers: HashMap<ServerId, SocketAddr>) -> Self {
        PeerClient { client: reqwest::Client::new(), peers }
    }

    fn base_url(&self, peer: &ServerId) -> RaftResult<String> {
        self.peers
            .get(peer)
            .map(|addr| format!("http://{addr}"))
            .ok_or_else(|| RaftError::PeerUnavailable(peer.clone()))
    }
}

#[async_trait]
impl RaftTransport for PeerClient {
    async fn request_vote(&self, peer: &ServerId, request: RequestVoteRequest) -> RaftResult<RequestVoteResponse> {
        let url = format!("{}/raft/request_vote", self.base_url(peer)?);
        self.client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|_| RaftError::PeerUnavailable(peer.clone()))?
            .json::<RequestVoteResponse>()
            .await
            .map_err(|_| RaftError::PeerUnavailable(peer.clone()))
    }

    async fn append_entries(&self, peer: &ServerId, request: AppendEntriesRequest) -> RaftResult<AppendEntriesResponse> {
        let url = format!("{}/raft/append_entries", self.base_url(peer)?);
        self.client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|_| RaftError::PeerUnavailable(peer.clone()))?
            .json::<AppendEntriesResponse>()
            .await
            .map_err(|_| RaftError::PeerUnavailable(peer.clone()))
    }
}
