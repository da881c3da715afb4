use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,

    #[error("invalid email format. Please use a standard email address (e.g., user@example.com)")]
    InvalidEmailFormat,

    #[error("cannot register admin email")]
    AdminEmailReserved,

    #[error("user already exists")]
    UserExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("failed to read auth store at {path}: {source}")]
    Load { path: String, #[source] source: std::io::Error },

    #[error("failed to persist auth store at {path}: {source}")]
    Save { path: String, #[source] source: std::io::Error },

    #[error("corrupt auth store: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
