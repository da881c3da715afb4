//! The external payment façade: deterministic charge attempts on a sentinel card, and
//! transaction queries. Out of scope for the consensus-replicated core; consumed by the
//! `booking` crate only through [`service::PaymentService`]'s two operations.

pub mod errors;
pub mod http;
pub mod service;
pub mod store;

pub use errors::{PaymentError, PaymentResult};
pub use service::{PaymentResponse, PaymentService, QueryStatus, QueryTransactionResponse};
pub use store::{Transaction, TransactionStatus, TransactionStore};
