//! Per-node configuration: node identity, peer addresses, timing parameters, and the
//! auth/payment service endpoints this node talks to. Loadable from a JSON file via `--config`,
//! with individual fields overridable on the command line.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    pub node_id: String,
    pub listen_addr: SocketAddr,
    pub peers: Vec<PeerConfig>,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_election_min_ms")]
    pub election_timeout_min_ms: u64,
    #[serde(default = "default_election_max_ms")]
    pub election_timeout_max_ms: u64,
    #[serde(default = "default_proposal_timeout_ms")]
    pub proposal_timeout_ms: u64,
    pub auth_base_url: String,
    pub payment_base_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_heartbeat_ms() -> u64 {
    50
}
fn default_election_min_ms() -> u64 {
    150
}
fn default_election_max_ms() -> u64 {
    300
}
fn default_proposal_timeout_ms() -> u64 {
    2000
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl BookingConfig {
    pub fn peer_addresses(&self) -> HashMap<String, SocketAddr> {
        self.peers.iter().map(|p| (p.id.clone(), p.addr)).collect()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn election_timeout_min(&self) -> Duration {
        Duration::from_millis(self.election_timeout_min_ms)
    }

    pub fn election_timeout_max(&self) -> Duration {
        Duration::from_millis(self.election_timeout_max_ms)
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}-log.jsonl", self.node_id))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}-snapshot.json", self.node_id))
    }
}

#[derive(Parser, Debug)]
#[command(name = "booking-node", about = "Runs one node of the replicated booking cluster")]
pub struct Args {
    /// Path to a JSON config file describing this node and its peers.
    #[arg(long)]
    pub config: PathBuf,
}

pub fn load(args: &Args) -> anyhow::Result<BookingConfig> {
    let content = std::fs::read_to_string(&args.config)?;
    let config: BookingConfig = serde_json::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &BookingConfig) -> anyhow::Result<()> {
    if config.node_id.trim().is_empty() {
        anyhow::bail!("node_id must not be empty");
    }
    if config.peers.iter().any(|p| p.id == config.node_id) {
        anyhow::bail!("peers must not include this node's own id");
    }
    if config.heartbeat_interval_ms == 0 {
        anyhow::bail!("heartbeat_interval_ms must be positive");
    }
    if config.election_timeout_min_ms == 0 || config.election_timeout_max_ms <= config.election_timeout_min_ms {
        anyhow::bail!("election_timeout_max_ms must exceed election_timeout_min_ms, both positive");
    }
    if config.proposal_timeout_ms == 0 {
        anyhow::bail!("proposal_timeout_ms must be positive");
    }
    if config.auth_base_url.trim().is_empty() || config.payment_base_url.trim().is_empty() {
        anyhow::bail!("auth_base_url and payment_base_url must not be empty");
    }
    Ok(())
}
