//! Builds the enabled search sources from configuration.

use leadscout_shared::{FASTPEOPLESEARCH, LeadScoutError, Result, SourceSettings};

use crate::{FastPeopleSearchSource, PersonSearchSource};

/// Holds sources in query order.
pub struct SourceRegistry {
    sources: Vec<Box<dyn PersonSearchSource>>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Instantiate every configured source. `settings` must already be in
    /// priority order, as [`leadscout_shared::RunConfig`] provides them.
    pub fn from_settings(settings: &[SourceSettings]) -> Result<Self> {
        let mut registry = Self::new();
        for s in settings {
            let source: Box<dyn PersonSearchSource> = match s.name.as_str() {
                FASTPEOPLESEARCH => Box::new(FastPeopleSearchSource::new(s)?),
                other => {
                    return Err(LeadScoutError::config(format!(
                        "unknown search source '{other}'"
                    )));
                }
            };
            tracing::debug!(source = %s.name, priority = s.priority, "registered source");
            registry.register(source);
        }
        Ok(registry)
    }

    /// Append a source after the ones already registered.
    pub fn register(&mut self, source: Box<dyn PersonSearchSource>) {
        self.sources.push(source);
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn into_sources(self) -> Vec<Box<dyn PersonSearchSource>> {
        self.sources
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
