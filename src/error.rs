use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Contract violation while building a row change.
    #[error("invalid row change: {0}")]
    InvalidChange(String),

    /// No snapshot exists even after an on-demand refresh.
    #[error("odds not ready")]
    NotReady,

    #[error("default provider '{0}' is not registered")]
    UnknownDefaultProvider(String),

    #[error("refresh failed: {0:#}")]
    Refresh(#[from] anyhow::Error),
}
