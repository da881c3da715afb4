//! In-process integration harness: several `ConsensusNode`s wired directly to each other through
//! an `async_trait` transport that dispatches straight into the peer's handler methods, with no
//! sockets involved. Exercises election, replication, commit, and apply end-to-end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use raft::rpc::{AppendEntriesRequest, AppendEntriesResponse, RaftTransport, RequestVoteRequest, RequestVoteResponse};
use raft::{Command, ConsensusConfig, ConsensusNode, MemoryLog, RaftResult, ServerId, StateMachine};
use tokio::sync::RwLock;

/// Routes RPCs to other in-process nodes by id. Registered after construction since every node
/// needs a handle to every other node, including itself in the map for simplicity.
struct InProcessTransport {
    nodes: RwLock<HashMap<ServerId, ConsensusNode>>,
}

impl InProcessTransport {
    fn new() -> Arc<Self> {
        Arc::new(InProcessTransport { nodes: RwLock::new(HashMap::new()) })
    }

    async fn register(&self, id: ServerId, node: ConsensusNode) {
        self.nodes.write().await.insert(id, node);
    }
}

#[async_trait]
impl RaftTransport for InProcessTransport {
    async fn request_vote(&self, peer: &ServerId, request: RequestVoteRequest) -> RaftResult<RequestVoteResponse> {
        let nodes = self.nodes.read().await;
        let peer_node = nodes.get(peer).expect("peer registered").clone();
        drop(nodes);
        Ok(peer_node.handle_request_vote(request).await)
    }

    async fn append_entries(&self, peer: &ServerId, request: AppendEntriesRequest) -> RaftResult<AppendEntriesResponse> {
        let nodes = self.nodes.read().await;
        let peer_node = nodes.get(peer).expect("peer registered").clone();
        drop(nodes);
        Ok(peer_node.handle_append_entries(request).await)
    }
}

async fn build_cluster(ids: &[&str]) -> (Vec<ConsensusNode>, Arc<InProcessTransport>) {
    let transport = InProcessTransport::new();
    let mut nodes = Vec::new();

    for &id in ids {
        let peers: Vec<ServerId> = ids.iter().filter(|&&p| p != id).map(|s| s.to_string()).collect();
        let config = ConsensusConfig {
            id: id.to_string(),
            peers,
            heartbeat_interval: Duration::from_millis(20),
            election_timeout_min: Duration::from_millis(60),
            election_timeout_max: Duration::from_millis(120),
            proposal_timeout: Duration::from_secs(2),
        };
        let node = ConsensusNode::new(config, Box::new(MemoryLog::new()), StateMachine::new(), transport.clone());
        transport.register(id.to_string(), node.clone()).await;
        nodes.push(node);
    }

    for node in &nodes {
        node.spawn_driver();
    }

    (nodes, transport)
}

async fn wait_for_leader(nodes: &[ConsensusNode]) -> ConsensusNode {
    for _ in 0..200 {
        for node in nodes {
            if node.is_leader().await {
                return node.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no leader elected within the deadline");
}

#[tokio::test]
async fn cluster_elects_exactly_one_leader() {
    let (nodes, _transport) = build_cluster(&["n1", "n2", "n3"]).await;
    let leader = wait_for_leader(&nodes).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut leader_count = 0;
    for node in &nodes {
        if node.is_leader().await {
            leader_count += 1;
        }
    }
    assert_eq!(leader_count, 1);
    assert!(leader.is_leader().await);
}

#[tokio::test]
async fn proposal_replicates_and_applies_on_every_node() {
    let (nodes, _transport) = build_cluster(&["n1", "n2", "n3"]).await;
    let leader = wait_for_leader(&nodes).await;

    let command = serde_json::to_vec(&Command::AddShow { show_id: "s1".into(), total_seats: 20, price_cents: 1500 }).unwrap();
    leader.propose(command).await.expect("leader accepts proposal");

    // Give followers a couple of heartbeat intervals to catch up and apply.
    tokio::time::sleep(Duration::from_millis(150)).await;

    for node in &nodes {
        assert_eq!(node.price_cents("s1").await, Some(1500), "node {} should have applied the command", node.id());
    }
}

#[tokio::test]
async fn reservation_is_exclusive_across_concurrent_proposals() {
    let (nodes, _transport) = build_cluster(&["n1", "n2", "n3"]).await;
    let leader = wait_for_leader(&nodes).await;

    let add_show = serde_json::to_vec(&Command::AddShow { show_id: "s1".into(), total_seats: 1, price_cents: 1000 }).unwrap();
    leader.propose(add_show).await.unwrap();

    let reserve_a = serde_json::to_vec(&Command::Reserve {
        show_id: "s1".into(),
        seat_id: 1,
        user_id: "alice".into(),
        booking_id: "bk-a".into(),
    })
    .unwrap();
    let reserve_b = serde_json::to_vec(&Command::Reserve {
        show_id: "s1".into(),
        seat_id: 1,
        user_id: "bob".into(),
        booking_id: "bk-b".into(),
    })
    .unwrap();

    let leader_a = leader.clone();
    let leader_b = leader.clone();
    let (result_a, result_b) = tokio::join!(leader_a.propose(reserve_a), leader_b.propose(reserve_b));
    assert!(result_a.is_ok());
    assert!(result_b.is_ok());

    tokio::time::sleep(Duration::from_millis(100)).await;

    for node in &nodes {
        let query = node.query_seat("s1", 1).await;
        assert!(query.reserved);
    }

    let winner = leader.query_seat("s1", 1).await.user_id;
    for node in &nodes {
        assert_eq!(node.query_seat("s1", 1).await.user_id, winner, "every replica must agree on the winner");
    }
}
