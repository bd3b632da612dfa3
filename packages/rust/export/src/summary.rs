//! Timestamped run-summary document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use leadscout_shared::{LeadScoutError, Result, RunSummary};

use crate::write_atomic;

/// What `enrichment_summary_<ts>.json` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub summary: RunSummary,
    /// Effective run configuration.
    pub config: serde_json::Value,
}

/// `enrichment_summary_YYYYmmdd_HHMMSS.json`
pub fn summary_file_name(at: DateTime<Utc>) -> String {
    format!("enrichment_summary_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write the summary and the effective config into `dir`. Returns the file path.
pub fn write_summary<C: Serialize>(dir: &Path, summary: &RunSummary, config: &C) -> Result<PathBuf> {
    let config = serde_json::to_value(config)
        .map_err(|e| LeadScoutError::validation(format!("JSON serialization failed: {e}")))?;
    let doc = SummaryDocument {
        summary: summary.clone(),
        config,
    };
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| LeadScoutError::validation(format!("JSON serialization failed: {e}")))?;

    let path = dir.join(summary_file_name(summary.generated_at));
    write_atomic(&path, json.as_bytes())?;
    info!(path = %path.display(), "wrote run summary");
    Ok(path)
}
