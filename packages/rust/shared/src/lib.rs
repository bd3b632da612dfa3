//! Shared types, error model, and configuration for LeadScout.
//!
//! This crate is the foundation depended on by all other LeadScout crates.
//! It provides:
//! - [`LeadScoutError`]: the unified error type
//! - Domain types ([`PersonRecord`], [`SearchResult`], [`EnrichmentOutcome`], [`RunSummary`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrichmentSection, FASTPEOPLESEARCH, FieldToggles, LeadType, OutputConfig,
    RunConfig, ScoringConfig, SourceConfig, SourceSettings, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{LeadScoutError, Result};
pub use types::{
    Address, EnrichmentOutcome, EnrichmentRunState, EntityKind, ErrorKind, FillRates,
    OutcomeStatus, PersonId, PersonName, PersonRecord, QueryVariation, Role, RoleTotals,
    RunEntry, RunSummary, SearchQuery, SearchResult, UnresolvedRecord,
};
