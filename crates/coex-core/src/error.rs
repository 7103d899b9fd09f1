use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CoexError {
    /// The engine worker has shut down; the operation was not applied.
    #[error("coex engine has stopped")]
    Stopped,
    #[error("invalid coex configuration: {0}")]
    Config(String),
}

/// Delivery to a remote subscriber failed; the subscriber is dropped.
#[derive(Debug, Error)]
#[error("remote coex callback unreachable: {0}")]
pub struct RemoteError(pub String);
