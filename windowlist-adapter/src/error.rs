use thiserror::Error;
use windowlist::WindowError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a [`crate::DataSource`] could not produce a window.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("data source failed: {0}")]
    Source(#[source] BoxError),

    /// The source assembled a window that violates the tile invariants.
    #[error("data source returned an invalid window: {0}")]
    InvalidWindow(#[from] WindowError),

    #[error("fetch was cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Source(err.into())
    }
}

/// Errors surfaced by [`crate::ViewportController`].
///
/// Fetch failures and timeouts are not errors here: the controller keeps the last good state
/// and schedules a retry on its own.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("invalid window: {0}")]
    InvalidWindow(WindowError),

    #[error("controller event loop is gone")]
    Closed,
}
