//! Output writers: enriched CSVs, prepared CSVs and run summaries.
//!
//! Every file is written to a hidden temp file beside the target and renamed
//! into place, so readers never observe a partial file.

pub mod enriched;
pub mod prepared;
pub mod summary;

use std::path::Path;

use tracing::debug;

use leadscout_shared::{LeadScoutError, Result};

pub use enriched::{BORROWERS_ENRICHED, LENDERS_ENRICHED, enriched_file_name, write_enriched_csv};
pub use prepared::{BORROWERS_PREPARED, LENDERS_PREPARED, write_prepared_csv};
pub use summary::{SummaryDocument, summary_file_name, write_summary};

/// Write `content` to `path` via a temp file and rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| LeadScoutError::io(dir, e))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LeadScoutError::validation(format!("invalid output path {}", path.display())))?;
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, content).map_err(|e| LeadScoutError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LeadScoutError::io(path, e))?;

    debug!(path = %path.display(), size = content.len(), "wrote file");
    Ok(())
}

/// Serialize CSV rows into memory, then write them atomically.
pub(crate) fn write_csv_rows(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| LeadScoutError::parse(format!("CSV serialization failed: {e}"));

    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| LeadScoutError::parse(format!("CSV serialization failed: {e}")))?;

    write_atomic(path, &bytes)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = test_support::temp_dir();
        let target = dir.join("out.txt");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        assert!(!dir.join(".out.txt.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
