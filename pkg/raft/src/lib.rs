//! A from-scratch Raft-style consensus implementation (leader election, log replication, and a
//! pluggable deterministic state machine) used by the `booking` crate to replicate the show/seat
//! catalog across a cluster of booking nodes. Transport is abstracted behind [`rpc::RaftTransport`]
//! so this crate has no knowledge of HTTP, sockets, or any other wire format.

pub mod consensus;
pub mod errors;
pub mod log;
pub mod rpc;
pub mod state_machine;
pub mod types;

pub use consensus::{ConsensusConfig, ConsensusNode};
pub use errors::{RaftError, RaftResult};
pub use log::{FileLog, Log, MemoryLog};
pub use rpc::RaftTransport;
pub use state_machine::{Command, SeatQuery, SeatRecord, ShowSummary, StateMachine};
pub use types::{LogEntry, LogIndex, Metadata, ServerId, Term};
