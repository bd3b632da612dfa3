//! Application configuration for LeadScout.
//!
//! User config lives at `~/.leadscout/leadscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadScoutError, Result};
use crate::types::QueryVariation;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadscout";

/// Name of the built-in people-search source.
pub const FASTPEOPLESEARCH: &str = "fastpeoplesearch";

// ---------------------------------------------------------------------------
// Config structs (matching leadscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run parameters.
    #[serde(default)]
    pub enrichment: EnrichmentSection,

    /// Confidence scoring weights.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Output location and snapshot cadence.
    #[serde(default)]
    pub output: OutputConfig,

    /// Search sources keyed by name.
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enrichment: EnrichmentSection::default(),
            scoring: ScoringConfig::default(),
            output: OutputConfig::default(),
            sources: default_sources(),
        }
    }
}

/// Which kinds of owners to enrich.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadType {
    Individual,
    Business,
    Mixed,
}

impl std::str::FromStr for LeadType {
    type Err = LeadScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "business" => Ok(Self::Business),
            "mixed" => Ok(Self::Mixed),
            other => Err(LeadScoutError::config(format!(
                "unknown lead type '{other}': expected Individual, Business or Mixed"
            ))),
        }
    }
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSection {
    #[serde(default = "default_lead_type")]
    pub lead_type: LeadType,

    /// Maximum number of records queried per run.
    #[serde(default = "default_max_leads")]
    pub max_leads: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Lower bound of the per-query jitter, in seconds.
    #[serde(default = "default_min_delay")]
    pub min_delay: f64,

    /// Upper bound of the per-query jitter, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,

    /// Multiplier applied to the jitter between batches.
    #[serde(default = "default_batch_cooldown")]
    pub batch_cooldown: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First access-denied backoff, in seconds. Doubles per attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Ceiling for the access-denied backoff, in seconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max: f64,

    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,

    /// Maximum phone numbers kept per outcome.
    #[serde(default = "default_max_phones")]
    pub max_phones: usize,

    /// Stop querying a record once a candidate clears the threshold.
    #[serde(default = "default_true")]
    pub stop_on_confident_match: bool,

    #[serde(default = "default_query_variations")]
    pub query_variations: Vec<QueryVariation>,

    /// Seed for the delay jitter; random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            lead_type: default_lead_type(),
            max_leads: default_max_leads(),
            batch_size: default_batch_size(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            batch_cooldown: default_batch_cooldown(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            min_confidence_threshold: default_min_confidence(),
            max_phones: default_max_phones(),
            stop_on_confident_match: true,
            query_variations: default_query_variations(),
            seed: None,
        }
    }
}

fn default_lead_type() -> LeadType {
    LeadType::Individual
}
fn default_max_leads() -> usize {
    1000
}
fn default_batch_size() -> usize {
    20
}
fn default_min_delay() -> f64 {
    3.0
}
fn default_max_delay() -> f64 {
    8.0
}
fn default_batch_cooldown() -> f64 {
    2.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> f64 {
    10.0
}
fn default_backoff_max() -> f64 {
    300.0
}
fn default_min_confidence() -> f64 {
    0.7
}
fn default_max_phones() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_query_variations() -> Vec<QueryVariation> {
    QueryVariation::ALL.to_vec()
}

/// `[scoring]` section. Weights are relative; they need not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_name_weight")]
    pub name_weight: f64,
    #[serde(default = "default_address_weight")]
    pub address_weight: f64,
    #[serde(default = "default_certainty_weight")]
    pub certainty_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            name_weight: default_name_weight(),
            address_weight: default_address_weight(),
            certainty_weight: default_certainty_weight(),
        }
    }
}

fn default_name_weight() -> f64 {
    0.5
}
fn default_address_weight() -> f64 {
    0.3
}
fn default_certainty_weight() -> f64 {
    0.2
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for enriched CSVs, summaries and the progress store.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Rewrite the enriched CSVs every N finished batches.
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            save_every: default_save_every(),
        }
    }
}

fn default_output_dir() -> String {
    "leadscout-output".into()
}
fn default_save_every() -> usize {
    1
}

/// `[sources.<name>]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower values are queried first.
    #[serde(default = "default_priority")]
    pub priority: u32,

    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub extract_phones: bool,
    #[serde(default = "default_true")]
    pub extract_emails: bool,
    #[serde(default = "default_true")]
    pub extract_age: bool,
    #[serde(default = "default_true")]
    pub extract_relatives: bool,
    #[serde(default = "default_true")]
    pub extract_addresses: bool,
}

fn default_priority() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

fn default_sources() -> BTreeMap<String, SourceConfig> {
    let mut sources = BTreeMap::new();
    sources.insert(
        FASTPEOPLESEARCH.to_string(),
        SourceConfig {
            enabled: true,
            priority: 1,
            base_url: "https://www.fastpeoplesearch.com".into(),
            timeout_secs: default_timeout_secs(),
            extract_phones: true,
            extract_emails: true,
            extract_age: true,
            extract_relatives: true,
            extract_addresses: true,
        },
    );
    sources
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Which candidate fields a source may contribute to an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldToggles {
    pub phones: bool,
    pub emails: bool,
    pub age: bool,
    pub relatives: bool,
    pub addresses: bool,
}

impl Default for FieldToggles {
    fn default() -> Self {
        Self {
            phones: true,
            emails: true,
            age: true,
            relatives: true,
            addresses: true,
        }
    }
}

/// An enabled source, resolved from `[sources.<name>]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSettings {
    pub name: String,
    pub priority: u32,
    pub base_url: String,
    pub timeout_secs: u64,
    pub fields: FieldToggles,
}

/// Runtime enrichment configuration: merged from config file + CLI flags.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub lead_type: LeadType,
    pub max_leads: usize,
    pub batch_size: usize,
    pub min_delay: f64,
    pub max_delay: f64,
    pub batch_cooldown: f64,
    pub max_retries: u32,
    pub backoff_base: f64,
    pub backoff_max: f64,
    pub min_confidence_threshold: f64,
    pub max_phones: usize,
    pub stop_on_confident_match: bool,
    pub query_variations: Vec<QueryVariation>,
    pub seed: Option<u64>,
    /// Treat stored `access_denied`/`error` outcomes as pending.
    pub requeue_unresolved: bool,
    pub scoring: ScoringConfig,
    /// Enabled sources, lowest priority value first.
    pub sources: Vec<SourceSettings>,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        let e = &config.enrichment;

        let mut sources: Vec<SourceSettings> = config
            .sources
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, s)| SourceSettings {
                name: name.clone(),
                priority: s.priority,
                base_url: s.base_url.clone(),
                timeout_secs: s.timeout_secs,
                fields: FieldToggles {
                    phones: s.extract_phones,
                    emails: s.extract_emails,
                    age: s.extract_age,
                    relatives: s.extract_relatives,
                    addresses: s.extract_addresses,
                },
            })
            .collect();
        // BTreeMap iteration is by name, so equal priorities stay deterministic.
        sources.sort_by_key(|s| s.priority);

        Self {
            lead_type: e.lead_type,
            max_leads: e.max_leads,
            batch_size: e.batch_size,
            min_delay: e.min_delay,
            max_delay: e.max_delay,
            batch_cooldown: e.batch_cooldown,
            max_retries: e.max_retries,
            backoff_base: e.backoff_base,
            backoff_max: e.backoff_max,
            min_confidence_threshold: e.min_confidence_threshold,
            max_phones: e.max_phones,
            stop_on_confident_match: e.stop_on_confident_match,
            query_variations: e.query_variations.clone(),
            seed: e.seed,
            requeue_unresolved: false,
            scoring: config.scoring.clone(),
            sources,
        }
    }
}

impl RunConfig {
    /// Check every bound the orchestrator relies on.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(LeadScoutError::config(msg));

        if self.max_leads == 0 {
            return fail("max_leads must be a positive integer".into());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be a positive integer".into());
        }
        if !(self.min_delay.is_finite() && self.min_delay >= 0.0) {
            return fail(format!("min_delay must be >= 0, got {}", self.min_delay));
        }
        if !(self.max_delay.is_finite() && self.max_delay >= self.min_delay) {
            return fail(format!(
                "min_delay ({}) must not exceed max_delay ({})",
                self.min_delay, self.max_delay
            ));
        }
        if !(self.batch_cooldown.is_finite() && self.batch_cooldown >= 1.0) {
            return fail(format!(
                "batch_cooldown must be >= 1, got {}",
                self.batch_cooldown
            ));
        }
        if !(self.backoff_base.is_finite() && self.backoff_base >= 0.0) {
            return fail(format!("backoff_base must be >= 0, got {}", self.backoff_base));
        }
        if !(self.backoff_max.is_finite() && self.backoff_max >= self.backoff_base) {
            return fail(format!(
                "backoff_max ({}) must be >= backoff_base ({})",
                self.backoff_max, self.backoff_base
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence_threshold) {
            return fail(format!(
                "min_confidence_threshold must be within [0, 1], got {}",
                self.min_confidence_threshold
            ));
        }
        if self.max_phones == 0 {
            return fail("max_phones must be a positive integer".into());
        }
        if self.query_variations.is_empty() {
            return fail("at least one query variation must be enabled".into());
        }

        let w = &self.scoring;
        let weights = [w.name_weight, w.address_weight, w.certainty_weight];
        if weights.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return fail("scoring weights must be non-negative".into());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return fail("scoring weights must not all be zero".into());
        }

        if self.sources.is_empty() {
            return fail("no search source is enabled".into());
        }
        for source in &self.sources {
            url::Url::parse(&source.base_url).map_err(|e| {
                LeadScoutError::config(format!(
                    "source '{}' has an invalid base_url '{}': {e}",
                    source.name, source.base_url
                ))
            })?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadscout/leadscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
