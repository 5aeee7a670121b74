pub mod retry;

pub use retry::{RetryStrategy, retry_with};
