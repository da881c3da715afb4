//! The replicated booking node: wires a Raft [`raft::ConsensusNode`], a reservation coordinator,
//! and the HTTP surface that exposes both to peers and to clients.

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod http;
pub mod peer_client;

pub use coordinator::{BookSeatResult, ReservationCoordinator};
pub use errors::{BookingError, BookingResult};
pub use peer_client::PeerClient;
