/// Mirrors the taxonomy the rest of the system branches on: connection
/// trouble is retried with backoff, auth trouble tears the bot down,
/// transient/message errors are per-call failures, fatal errors stop the
/// provider outright.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("transient send failure: {0}")]
    Transient(String),
    #[error("message error: {0}")]
    Message(String),
    #[error("fatal protocol error: {0}")]
    Fatal(String),
}
