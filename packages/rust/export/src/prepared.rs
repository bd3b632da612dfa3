//! Cleaned, split record CSVs written by `leadscout prepare`.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use leadscout_shared::{EntityKind, PersonRecord, Result};

use crate::write_csv_rows;

pub const BORROWERS_PREPARED: &str = "borrowers_prepared.csv";
pub const LENDERS_PREPARED: &str = "lenders_prepared.csv";

const FIXED_COLUMNS: [&str; 10] = [
    "record_id",
    "kind",
    "full_name",
    "first_name",
    "middle_name",
    "last_name",
    "street",
    "city",
    "state",
    "zip",
];

/// Write records with their parsed fields ahead of the original columns.
/// Returns the row count.
pub fn write_prepared_csv(path: &Path, records: &[PersonRecord]) -> Result<usize> {
    let mut original: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for (name, _) in records.iter().flat_map(|r| &r.columns) {
        if seen.insert(name.as_str()) {
            original.push(name.clone());
        }
    }

    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(original.iter().cloned());

    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            let kind = match r.kind {
                EntityKind::Individual => "individual",
                EntityKind::Business => "business",
            };
            let mut row = vec![
                r.id.to_string(),
                kind.to_string(),
                r.name.full.clone(),
                opt(&r.name.first),
                opt(&r.name.middle),
                opt(&r.name.last),
                opt(&r.address.street),
                opt(&r.address.city),
                opt(&r.address.state),
                opt(&r.address.zip),
            ];
            row.extend(original.iter().map(|col| {
                r.columns
                    .iter()
                    .find(|(name, _)| name == col)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            }));
            row
        })
        .collect();

    write_csv_rows(path, &header, &rows)?;
    info!(path = %path.display(), rows = rows.len(), "wrote prepared CSV");
    Ok(rows.len())
}
