//! The external authentication façade: session issuance and validation, with a reserved
//! administrator identity. Out of scope for the consensus-replicated core; consumed by the
//! `booking` crate only through [`service::AuthService`]'s three operations.

pub mod errors;
pub mod http;
pub mod service;
pub mod store;

pub use errors::{AuthError, AuthResult};
pub use service::{AuthService, LoginResponse, RegisterResponse, Session, ValidateSessionResponse};
pub use store::AuthStore;
