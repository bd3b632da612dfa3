//! People-search sources.
//!
//! This crate provides:
//! - [`PersonSearchSource`]: the session-owning trait every source implements
//! - [`SourceError`]: classified query failures
//! - [`SourceRegistry`]: builds the enabled sources from configuration
//! - [`FastPeopleSearchSource`]: the built-in HTTP source

pub mod fastpeoplesearch;
pub mod registry;

use async_trait::async_trait;
use leadscout_shared::{ErrorKind, LeadScoutError, SearchQuery, SearchResult};

pub use fastpeoplesearch::FastPeopleSearchSource;
pub use registry::SourceRegistry;

/// A failed source query, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Blocked, challenged or rate-limited.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Connection failure or server-side error.
    #[error("network error: {0}")]
    Network(String),

    /// The response did not have the expected shape.
    #[error("unexpected page structure: {0}")]
    Structural(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::Structural(_) => ErrorKind::Structural,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::AccessDenied(m) | Self::Timeout(m) | Self::Network(m) | Self::Structural(m) => m,
        }
    }
}

impl From<SourceError> for LeadScoutError {
    fn from(err: SourceError) -> Self {
        LeadScoutError::Source(err.to_string())
    }
}

/// A people-search backend.
///
/// Each value owns its session. Callers open it once per run, issue queries
/// strictly one at a time, and close it on every exit path.
#[async_trait]
pub trait PersonSearchSource: Send + Sync {
    /// Stable source name, matching its `[sources.<name>]` config key.
    fn name(&self) -> &str;

    /// Start a session.
    async fn open(&mut self) -> Result<(), SourceError>;

    /// Run one query. An empty vector means the source found nobody.
    async fn search(&mut self, query: &SearchQuery) -> Result<Vec<SearchResult>, SourceError>;

    /// End the session. Safe to call on a source that was never opened.
    async fn close(&mut self) -> Result<(), SourceError>;
}
