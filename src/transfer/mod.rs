mod client;
mod errors;
mod progress;

pub use client::{DEFAULT_CHUNK_SIZE, SessionMeta, TransferClient};
pub use errors::{Result, TransferError};
pub use progress::{ProgressSender, ProgressStream, TransferProgress};
