//! Error taxonomy for the harvesting pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while driving the browser or persisting harvested records.
///
/// Only `Storage` and `Cancelled` are meant to travel far. The other kinds are
/// absorbed by the lowest component that can pick a safe default.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("expected node not found: {0}")]
    NodeNotFound(String),
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },
    #[error("text does not match the expected pattern: {0}")]
    ParseMismatch(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("harvest cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Wrap a store error, keeping its full context chain in the message.
    #[must_use]
    pub fn storage(err: &anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    #[must_use]
    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser(err.to_string())
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
