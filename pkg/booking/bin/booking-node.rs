use std::sync::Arc;

use clap::Parser;

use booking::{config, coordinator::ReservationCoordinator, peer_client::PeerClient};
use raft::{ConsensusConfig, ConsensusNode, FileLog, StateMachine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = config::Args::parse();
    let cfg = config::load(&args)?;

    let log = FileLog::open(cfg.log_path())?;
    let state_machine = StateMachine::open(cfg.snapshot_path())?;
    let transport = Arc::new(PeerClient::new(cfg.peer_addresses()));

    let consensus_config = ConsensusConfig {
        id: cfg.node_id.clone(),
        peers: cfg.peers.iter().map(|p| p.id.clone()).collect(),
        heartbeat_interval: cfg.heartbeat_interval(),
        election_timeout_min: cfg.election_timeout_min(),
        election_timeout_max: cfg.election_timeout_max(),
        proposal_timeout: cfg.proposal_timeout(),
    };

    let node = ConsensusNode::new(consensus_config, Box::new(log), state_machine, transport);
    node.spawn_driver();

    let coordinator = Arc::new(ReservationCoordinator::new(node, cfg.auth_base_url.clone(), cfg.payment_base_url.clone()));

    tracing::info!(node_id = %cfg.node_id, addr = %cfg.listen_addr, "starting booking node");
    booking::http::serve(cfg.listen_addr, coordinator).await?;
    Ok(())
}
