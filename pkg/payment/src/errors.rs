use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("failed to read transaction store at {path}: {source}")]
    Load { path: String, #[source] source: std::io::Error },

    #[error("failed to persist transaction store at {path}: {source}")]
    Save { path: String, #[source] source: std::io::Error },

    #[error("corrupt transaction store: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type PaymentResult<T> = Result<T, PaymentError>;
