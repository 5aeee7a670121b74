use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Transfer incomplete: expected {expected}, actual {actual}")]
    Incomplete {
        expected: u64,
        actual: u64,
    },

    #[error("Server reported offset {reported} behind local offset {local}")]
    OffsetRegression {
        reported: u64,
        local: u64,
    },

    #[error("Param error: {0}")]
    Param(String),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Transfer was cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    /// Whether another attempt against the same session can succeed.
    /// Client-side protocol errors and cancellation are final.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Http(_) | TransferError::Io(_) => true,
            TransferError::Server { status_code, .. } => {
                *status_code >= 500 || *status_code == 429
            }
            _ => false,
        }
    }
}

/// Error alias
pub type Result<T, E = TransferError> = std::result::Result<T, E>;
