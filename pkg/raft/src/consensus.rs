//! The consensus node: role state, the request-vote / append-entries protocol, election,
//! replication, commitment, and the client-facing `propose` call.
//!
//! Concurrency model: every mutation to role/term/vote/log/commit_index/apply_index/
//! next_index/match_index happens while holding `Inner::state`, a single `tokio::sync::Mutex`
//! per node. Outbound peer RPCs are dispatched as spawned tasks that never hold the lock across
//! an `.await` on the network — each one reads what it needs, drops the lock, makes the call,
//! then re-locks to fold the result back in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::errors::{RaftError, RaftResult};
use crate::log::Log;
use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse, RaftTransport, RequestVoteRequest, RequestVoteResponse};
use crate::state_machine::{Command, SeatQuery, SeatRecord, ShowSummary, StateMachine};
use crate::types::{LogEntry, LogIndex, Metadata, ServerId, Term};

#[derive(Clone)]
pub struct ConsensusConfig {
    pub id: ServerId,
    pub peers: Vec<ServerId>,
    pub heartbeat_interval: Duration,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub proposal_timeout: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            id: String::new(),
            peers: Vec::new(),
            heartbeat_interval: Duration::from_millis(50),
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            proposal_timeout: Duration::from_secs(2),
        }
    }
}

enum Role {
    Follower,
    Candidate { votes_received: HashSet<ServerId> },
    Leader { next_index: HashMap<ServerId, LogIndex>, match_index: HashMap<ServerId, LogIndex> },
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate { .. } => "candidate",
            Role::Leader { .. } => "leader",
        }
    }
}

struct State {
    meta: Metadata,
    log: Box<dyn Log>,
    commit_index: LogIndex,
    apply_index: LogIndex,
    role: Role,
    leader_id: Option<ServerId>,
    election_deadline: Instant,
    last_heartbeat_sent: Instant,
    state_machine: StateMachine,
    waiters: HashMap<LogIndex, oneshot::Sender<Result<(), RaftError>>>,
}

struct Inner {
    id: ServerId,
    peers: Vec<ServerId>,
    config: ConsensusConfig,
    transport: Arc<dyn RaftTransport>,
    state: Mutex<State>,
}

/// A cheaply-cloneable handle to one node's consensus state. Cloning shares the same underlying
/// node (via `Arc`); it does not create a second replica.
#[derive(Clone)]
pub struct ConsensusNode(Arc<Inner>);

impl ConsensusNode {
    pub fn new(
        config: ConsensusConfig,
        log: Box<dyn Log>,
        state_machine: StateMachine,
        transport: Arc<dyn RaftTransport>,
    ) -> Self {
        let apply_index = state_machine.apply_index();
        let state = State {
            meta: Metadata::default(),
            log,
            commit_index: 0,
            apply_index,
            role: Role::Follower,
            leader_id: None,
            election_deadline: Instant::now() + random_timeout(&config),
            last_heartbeat_sent: Instant::now(),
            state_machine,
            waiters: HashMap::new(),
        };

        ConsensusNode(Arc::new(Inner {
            id: config.id.clone(),
            peers: config.peers.clone(),
            config,
            transport,
            state: Mutex::new(state),
        }))
    }

    pub fn id(&self) -> &ServerId {
        &self.0.id
    }

    fn majority(&self) -> usize {
        (self.0.peers.len() + 1) / 2 + 1
    }

    fn random_election_timeout(&self) -> Duration {
        random_timeout(&self.0.config)
    }

    /// Spawns the background driver task: applies committed entries, sends heartbeats on
    /// schedule, and starts elections on timeout. One call per node; the returned handle is
    /// aborted when dropped if the caller doesn't otherwise keep the process alive.
    pub fn spawn_driver(&self) -> tokio::task::JoinHandle<()> {
        let node = self.clone();
        tokio::spawn(async move {
            loop {
                node.tick().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    }

    async fn tick(&self) {
        self.apply_committed().await;

        let now = Instant::now();
        let mut should_replicate = false;
        let mut should_start_election = false;

        {
            let mut state = self.0.state.lock().await;
            match &state.role {
                Role::Leader { .. } => {
                    if now.duration_since(state.last_heartbeat_sent) >= self.0.config.heartbeat_interval {
                        state.last_heartbeat_sent = now;
                        should_replicate = true;
                    }
                }
                Role::Follower | Role::Candidate { .. } => {
                    if now >= state.election_deadline {
                        should_start_election = true;
                    }
                }
            }
        }

        if should_replicate {
            self.replicate_to_all().await;
        }
        if should_start_election {
            self.start_election().await;
        }
    }

    // ----------------------------------------------------------------- election

    async fn start_election(&self) {
        let (term, last_log_index, last_log_term) = {
            let mut state = self.0.state.lock().await;
            state.meta.current_term += 1;
            state.meta.voted_for = Some(self.0.id.clone());
            let mut votes_received = HashSet::new();
            votes_received.insert(self.0.id.clone());
            state.role = Role::Candidate { votes_received };
            state.leader_id = None;
            state.election_deadline = Instant::now() + self.random_election_timeout();

            tracing::info!(term = state.meta.current_term, id = %self.0.id, "starting election");
            (state.meta.current_term, state.log.last_index(), state.log.last_term())
        };

        if self.0.peers.is_empty() {
            // Single-node cluster: we are trivially our own majority.
            let mut state = self.0.state.lock().await;
            if matches!(state.role, Role::Candidate { .. }) && state.meta.current_term == term {
                self.become_leader(&mut state);
                drop(state);
                self.replicate_to_all().await;
            }
            return;
        }

        for peer in self.0.peers.clone() {
            let node = self.clone();
            let request = RequestVoteRequest {
                term,
                candidate_id: self.0.id.clone(),
                last_log_index,
                last_log_term,
            };
            tokio::spawn(async move {
                let deadline = node.0.config.election_timeout_min / 2;
                let outcome = tokio::time::timeout(deadline, node.0.transport.request_vote(&peer, request)).await;
                if let Ok(Ok(response)) = outcome {
                    node.handle_request_vote_response(term, peer, response).await;
                }
                // Timeout or transport error: treated as `PeerUnavailable` locally, no vote
                // counted, no state mutation.
            });
        }
    }

    async fn handle_request_vote_response(&self, req_term: Term, peer: ServerId, response: RequestVoteResponse) {
        let became_leader = {
            let mut state = self.0.state.lock().await;

            if response.term > state.meta.current_term {
                self.step_down(&mut state, response.term);
                false
            } else if req_term != state.meta.current_term {
                // Stale response for an election we've since moved past.
                false
            } else if let Role::Candidate { votes_received } = &mut state.role {
                if response.vote_granted {
                    votes_received.insert(peer);
                }
                let got_majority = votes_received.len() >= self.majority();
                if got_majority {
                    self.become_leader(&mut state);
                }
                got_majority
            } else {
                false
            }
        };

        if became_leader {
            self.replicate_to_all().await;
        }
    }

    fn become_leader(&self, state: &mut State) {
        let last_index = state.log.last_index();
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in &self.0.peers {
            next_index.insert(peer.clone(), last_index + 1);
            match_index.insert(peer.clone(), 0);
        }
        state.role = Role::Leader { next_index, match_index };
        state.leader_id = Some(self.0.id.clone());
        state.last_heartbeat_sent = Instant::now() - self.0.config.heartbeat_interval;
        tracing::info!(term = state.meta.current_term, id = %self.0.id, "became leader");
    }

    /// Steps down to follower. If we were leader, every pending proposal waiter is resolved
    /// immediately with `LeadershipLost` rather than left to time out.
    fn step_down(&self, state: &mut State, new_term: Term) {
        if new_term > state.meta.current_term {
            state.meta.current_term = new_term;
            state.meta.voted_for = None;
        }

        if matches!(state.role, Role::Leader { .. }) {
            for (_, tx) in state.waiters.drain() {
                let _ = tx.send(Err(RaftError::LeadershipLost));
            }
        }

        state.role = Role::Follower;
        state.election_deadline = Instant::now() + self.random_election_timeout();
        tracing::info!(term = state.meta.current_term, id = %self.0.id, "stepped down to follower");
    }

    // ----------------------------------------------------------------- replication

    async fn replicate_to_all(&self) {
        for peer in self.0.peers.clone() {
            let node = self.clone();
            tokio::spawn(async move {
                node.replicate_to_peer(&peer).await;
            });
        }
    }

    async fn replicate_to_peer(&self, peer: &ServerId) {
        let (term, request) = {
            let state = self.0.state.lock().await;
            let Role::Leader { next_index, .. } = &state.role else { return };
            let Some(&next_idx) = next_index.get(peer) else { return };
            let prev_log_index = next_idx.saturating_sub(1);
            let prev_log_term = state.log.term(prev_log_index).unwrap_or(0);
            let entries = state.log.entries_from(next_idx);
            let request = AppendEntriesRequest {
                term: state.meta.current_term,
                leader_id: self.0.id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit: state.commit_index,
            };
            (state.meta.current_term, request)
        };

        let outcome = tokio::time::timeout(
            self.0.config.heartbeat_interval,
            self.0.transport.append_entries(peer, request.clone()),
        )
        .await;

        if let Ok(Ok(response)) = outcome {
            self.handle_append_entries_response(term, peer, &request, response).await;
        }
        // Timeout or transport error: `PeerUnavailable`, retried on the next heartbeat tick.
    }

    async fn handle_append_entries_response(
        &self,
        req_term: Term,
        peer: &ServerId,
        request: &AppendEntriesRequest,
        response: AppendEntriesResponse,
    ) {
        let mut state = self.0.state.lock().await;

        if response.term > state.meta.current_term {
            self.step_down(&mut state, response.term);
            return;
        }
        if req_term != state.meta.current_term {
            return;
        }

        let retry = {
            let Role::Leader { next_index, match_index } = &mut state.role else { return };

            if response.success {
                let new_match = request.prev_log_index + request.entries.len() as LogIndex;
                let slot = match_index.entry(peer.clone()).or_insert(0);
                if new_match > *slot {
                    *slot = new_match;
                }
                next_index.insert(peer.clone(), new_match + 1);
                false
            } else {
                let current = next_index.get(peer).copied().unwrap_or(1);
                let by_hint = response.match_index_hint + 1;
                let decremented = current.saturating_sub(1).max(1);
                let new_next = if by_hint < decremented { by_hint.max(1) } else { decremented };
                next_index.insert(peer.clone(), new_next);
                true
            }
        };

        if !response.success {
            drop(state);
            if retry {
                self.replicate_to_peer(peer).await;
            }
            return;
        }

        self.advance_commit_index(&mut state);
    }

    /// Commit rule: the largest N > commit_index such that a majority (including self)
    /// has match_index ≥ N and the entry at N was written in the leader's current term. Because
    /// match_index is monotonic, any N satisfying both conditions also guarantees every earlier
    /// index is already replicated to the same majority — so the first (highest) N found while
    /// scanning down from the end of the log is the answer; no further scanning is needed.
    fn advance_commit_index(&self, state: &mut State) {
        let Role::Leader { match_index, .. } = &state.role else { return };
        let current_term = state.meta.current_term;
        let majority = self.majority();

        let mut candidate = state.log.last_index();
        while candidate > state.commit_index {
            if state.log.term(candidate) == Some(current_term) {
                let mut count = 1;
                for &m in match_index.values() {
                    if m >= candidate {
                        count += 1;
                    }
                }
                if count >= majority {
                    break;
                }
            }
            candidate -= 1;
        }

        if candidate > state.commit_index {
            state.commit_index = candidate;
            tracing::info!(index = candidate, term = current_term, "advanced commit index");
        }
    }

    // ----------------------------------------------------------------- apply

    async fn apply_committed(&self) {
        loop {
            let waiter = {
                let mut state = self.0.state.lock().await;
                if state.apply_index >= state.commit_index {
                    break;
                }
                let idx = state.apply_index + 1;
                let Some(entry) = state.log.get(idx) else {
                    tracing::error!(index = idx, "commit index references a missing log entry");
                    panic!("corrupted log: committed index {idx} is missing locally");
                };

                match serde_json::from_slice::<Command>(&entry.command) {
                    Ok(command) => state.state_machine.apply(&command, idx),
                    Err(e) => tracing::error!(index = idx, error = %e, "failed to decode committed command; skipping apply"),
                }
                state.apply_index = idx;
                state.waiters.remove(&idx)
            };

            if let Some(tx) = waiter {
                let _ = tx.send(Ok(()));
            }
        }
    }

    // ----------------------------------------------------------------- client-facing RPCs

    pub async fn handle_request_vote(&self, request: RequestVoteRequest) -> RequestVoteResponse {
        let mut state = self.0.state.lock().await;

        if request.term < state.meta.current_term {
            return RequestVoteResponse { term: state.meta.current_term, vote_granted: false };
        }
        if request.term > state.meta.current_term {
            self.step_down(&mut state, request.term);
        }

        let can_vote = match &state.meta.voted_for {
            None => true,
            Some(v) => v == &request.candidate_id,
        };
        let last_log_term = state.log.last_term();
        let last_log_index = state.log.last_index();
        let log_up_to_date = request.last_log_term > last_log_term
            || (request.last_log_term == last_log_term && request.last_log_index >= last_log_index);

        let vote_granted = can_vote && log_up_to_date;
        if vote_granted {
            state.meta.voted_for = Some(request.candidate_id.clone());
            state.election_deadline = Instant::now() + self.random_election_timeout();
            tracing::info!(candidate = %request.candidate_id, term = state.meta.current_term, "vote granted");
        }

        RequestVoteResponse { term: state.meta.current_term, vote_granted }
    }

    pub async fn handle_append_entries(&self, request: AppendEntriesRequest) -> AppendEntriesResponse {
        let mut state = self.0.state.lock().await;

        if request.term < state.meta.current_term {
            return AppendEntriesResponse {
                term: state.meta.current_term,
                success: false,
                match_index_hint: state.log.last_index(),
            };
        }

        if request.term > state.meta.current_term {
            self.step_down(&mut state, request.term);
        } else if !matches!(state.role, Role::Follower) {
            state.role = Role::Follower;
        }
        state.leader_id = Some(request.leader_id.clone());
        state.election_deadline = Instant::now() + self.random_election_timeout();

        if request.prev_log_index > 0 {
            let matches_prev = state.log.term(request.prev_log_index) == Some(request.prev_log_term);
            if !matches_prev {
                return AppendEntriesResponse {
                    term: state.meta.current_term,
                    success: false,
                    match_index_hint: state.log.last_index(),
                };
            }
        }

        for entry in request.entries {
            if let Err(e) = state.log.append(entry) {
                tracing::error!(error = %e, "append-entries: local append rejected");
                return AppendEntriesResponse {
                    term: state.meta.current_term,
                    success: false,
                    match_index_hint: state.log.last_index(),
                };
            }
        }

        if request.leader_commit > state.commit_index {
            state.commit_index = request.leader_commit.min(state.log.last_index());
        }

        AppendEntriesResponse { term: state.meta.current_term, success: true, match_index_hint: state.log.last_index() }
    }

    /// Proposes a command to be replicated and applied. Only valid on the current leader.
    /// Resolves once the entry has been *applied* (not merely committed).
    pub async fn propose(&self, command: Vec<u8>) -> RaftResult<LogIndex> {
        let (index, rx) = {
            let mut state = self.0.state.lock().await;
            if !matches!(state.role, Role::Leader { .. }) {
                return Err(RaftError::NotLeader { leader_hint: state.leader_id.clone() });
            }

            let index = state.log.last_index() + 1;
            let term = state.meta.current_term;
            state.log.append(LogEntry { index, term, command })?;

            let (tx, rx) = oneshot::channel();
            state.waiters.insert(index, tx);
            (index, rx)
        };

        self.replicate_to_all().await;

        match tokio::time::timeout(self.0.config.proposal_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(index),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(RaftError::Internal("proposal waiter dropped without a result".into())),
            Err(_) => {
                let mut state = self.0.state.lock().await;
                state.waiters.remove(&index);
                Err(RaftError::ProposalTimeout)
            }
        }
    }

    // ----------------------------------------------------------------- read-only queries

    pub async fn is_leader(&self) -> bool {
        matches!(self.0.state.lock().await.role, Role::Leader { .. })
    }

    pub async fn leader_hint(&self) -> Option<ServerId> {
        self.0.state.lock().await.leader_id.clone()
    }

    pub async fn current_term(&self) -> Term {
        self.0.state.lock().await.meta.current_term
    }

    pub async fn role_name(&self) -> &'static str {
        self.0.state.lock().await.role.name()
    }

    pub async fn query_seat(&self, show_id: &str, seat_id: u32) -> SeatQuery {
        self.0.state.lock().await.state_machine.query(show_id, seat_id)
    }

    pub async fn price_cents(&self, show_id: &str) -> Option<u64> {
        self.0.state.lock().await.state_machine.price_cents(show_id)
    }

    pub async fn list_seats(&self, show_id: &str, page_size: u32, page_token: u32) -> (Vec<SeatRecord>, u32) {
        self.0.state.lock().await.state_machine.list_seats(show_id, page_size, page_token)
    }

    pub async fn list_shows(&self) -> Vec<ShowSummary> {
        self.0.state.lock().await.state_machine.list_shows()
    }
}

fn random_timeout(config: &ConsensusConfig) -> Duration {
    let min = config.election_timeout_min.as_millis() as u64;
    let max = config.election_timeout_max.as_millis().max(min as u128 + 1) as u64;
    let millis = rand::thread_rng().gen_range(min..=max);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl RaftTransport for NullTransport {
        async fn request_vote(&self, peer: &ServerId, _request: RequestVoteRequest) -> RaftResult<RequestVoteResponse> {
            Err(RaftError::PeerUnavailable(peer.clone()))
        }
        async fn append_entries(&self, peer: &ServerId, _request: AppendEntriesRequest) -> RaftResult<AppendEntriesResponse> {
            Err(RaftError::PeerUnavailable(peer.clone()))
        }
    }

    fn test_node(id: &str, peers: &[&str]) -> ConsensusNode {
        let config = ConsensusConfig {
            id: id.to_string(),
            peers: peers.iter().map(|s| s.to_string()).collect(),
            ..ConsensusConfig::default()
        };
        ConsensusNode::new(config, Box::new(MemoryLog::new()), StateMachine::new(), Arc::new(NullTransport))
    }

    #[tokio::test]
    async fn grants_vote_to_up_to_date_candidate() {
        let node = test_node("n1", &["n2", "n3"]);
        let response = node
            .handle_request_vote(RequestVoteRequest { term: 1, candidate_id: "n2".into(), last_log_index: 0, last_log_term: 0 })
            .await;
        assert!(response.vote_granted);
        assert_eq!(response.term, 1);
    }

    #[tokio::test]
    async fn rejects_vote_for_stale_term() {
        let node = test_node("n1", &["n2"]);
        node.handle_request_vote(RequestVoteRequest { term: 5, candidate_id: "n2".into(), last_log_index: 0, last_log_term: 0 }).await;

        let response = node
            .handle_request_vote(RequestVoteRequest { term: 3, candidate_id: "n3".into(), last_log_index: 0, last_log_term: 0 })
            .await;
        assert!(!response.vote_granted);
        assert_eq!(response.term, 5);
    }

    #[tokio::test]
    async fn does_not_grant_second_vote_in_same_term() {
        let node = test_node("n1", &["n2", "n3"]);
        let r1 = node
            .handle_request_vote(RequestVoteRequest { term: 1, candidate_id: "n2".into(), last_log_index: 0, last_log_term: 0 })
            .await;
        assert!(r1.vote_granted);

        let r2 = node
            .handle_request_vote(RequestVoteRequest { term: 1, candidate_id: "n3".into(), last_log_index: 0, last_log_term: 0 })
            .await;
        assert!(!r2.vote_granted);
    }

    #[tokio::test]
    async fn append_entries_rejects_on_log_mismatch() {
        let node = test_node("n1", &["n2"]);
        let response = node
            .handle_append_entries(AppendEntriesRequest {
                term: 1,
                leader_id: "n2".into(),
                prev_log_index: 5,
                prev_log_term: 1,
                entries: vec![],
                leader_commit: 0,
            })
            .await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn append_entries_accepts_and_advances_commit() {
        let node = test_node("n1", &["n2"]);
        let entry = LogEntry {
            index: 1,
            term: 1,
            command: serde_json::to_vec(&Command::AddShow { show_id: "s1".into(), total_seats: 10, price_cents: 100 }).unwrap(),
        };

        let response = node
            .handle_append_entries(AppendEntriesRequest {
                term: 1,
                leader_id: "n2".into(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![entry],
                leader_commit: 1,
            })
            .await;
        assert!(response.success);
        assert_eq!(response.match_index_hint, 1);

        node.apply_committed().await;
        assert_eq!(node.price_cents("s1").await, Some(100));
    }

    #[tokio::test]
    async fn proposing_on_a_follower_is_rejected() {
        let node = test_node("n1", &[]);
        let err = node.propose(vec![]).await.unwrap_err();
        assert!(matches!(err, RaftError::NotLeader { .. }));
    }

    #[tokio::test]
    async fn single_node_cluster_elects_itself_and_applies_proposals() {
        let node = test_node("solo", &[]);
        node.start_election().await;
        assert!(node.is_leader().await);

        let command = serde_json::to_vec(&Command::AddShow { show_id: "s1".into(), total_seats: 5, price_cents: 500 }).unwrap();
        let index = node.propose(command).await.unwrap();
        assert_eq!(index, 1);
        assert_eq!(node.price_cents("s1").await, Some(500));
    }
}
