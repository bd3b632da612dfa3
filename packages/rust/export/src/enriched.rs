//! Enriched per-role CSV: original columns followed by enrichment columns.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument};

use leadscout_shared::{EnrichmentOutcome, EnrichmentRunState, PersonRecord, Result, Role};

use crate::write_csv_rows;

pub const BORROWERS_ENRICHED: &str = "borrowers_enriched.csv";
pub const LENDERS_ENRICHED: &str = "lenders_enriched.csv";

/// Status written for records without a stored outcome.
const PENDING: &str = "pending";

/// Separator for list-valued cells.
const LIST_SEP: &str = "; ";

pub fn enriched_file_name(role: Role) -> &'static str {
    match role {
        Role::Borrower => BORROWERS_ENRICHED,
        Role::Lender => LENDERS_ENRICHED,
    }
}

fn enrichment_header(max_phones: usize) -> Vec<String> {
    let mut header: Vec<String> = (1..=max_phones).map(|i| format!("phone{i}")).collect();
    header.extend(
        [
            "emails",
            "age",
            "relatives",
            "address_history",
            "marital_status",
            "background",
            "source",
            "page_url",
            "confidence",
            "status",
            "error",
        ]
        .map(String::from),
    );
    header
}

fn enrichment_cells(outcome: Option<&EnrichmentOutcome>, max_phones: usize) -> Vec<String> {
    let Some(o) = outcome else {
        let mut cells = vec![String::new(); max_phones + 11];
        cells[max_phones + 9] = PENDING.to_string();
        return cells;
    };

    let mut cells: Vec<String> = (0..max_phones)
        .map(|i| o.phones.get(i).cloned().unwrap_or_default())
        .collect();
    cells.push(o.emails.join(LIST_SEP));
    cells.push(o.age.map(|a| a.to_string()).unwrap_or_default());
    cells.push(o.relatives.join(LIST_SEP));
    cells.push(o.address_history.join(LIST_SEP));
    cells.push(o.marital_status.clone().unwrap_or_default());
    cells.push(o.background.clone().unwrap_or_default());
    cells.push(o.source.clone().unwrap_or_default());
    cells.push(o.page_url.clone().unwrap_or_default());
    cells.push(if o.confidence > 0.0 {
        format!("{:.3}", o.confidence)
    } else {
        String::new()
    });
    cells.push(o.status.as_str().to_string());
    cells.push(match (&o.last_error, &o.error_message) {
        (Some(kind), Some(msg)) => format!("{}: {msg}", kind.as_str()),
        (Some(kind), None) => kind.as_str().to_string(),
        (None, Some(msg)) => msg.clone(),
        (None, None) => String::new(),
    });
    cells
}

/// Write one role's records with their current outcomes.
///
/// Original columns are the union of the records' columns in first-seen order.
/// Records with no stored outcome get status `pending`. Returns the row count.
#[instrument(skip(records, state), fields(path = %path.display(), records = records.len()))]
pub fn write_enriched_csv(
    path: &Path,
    records: &[PersonRecord],
    state: &EnrichmentRunState,
    max_phones: usize,
) -> Result<usize> {
    let mut original: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for record in records {
        for (name, _) in &record.columns {
            if seen.insert(name.as_str()) {
                original.push(name.clone());
            }
        }
    }

    let mut header = vec!["record_id".to_string()];
    header.extend(original.iter().cloned());
    header.extend(enrichment_header(max_phones));

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let mut row = vec![record.id.to_string()];
            row.extend(original.iter().map(|col| {
                record
                    .columns
                    .iter()
                    .find(|(name, _)| name == col)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            }));
            let outcome = state.get(&record.id).map(|entry| &entry.outcome);
            row.extend(enrichment_cells(outcome, max_phones));
            row
        })
        .collect();

    write_csv_rows(path, &header, &rows)?;
    info!(rows = rows.len(), "wrote enriched CSV");
    Ok(rows.len())
}
