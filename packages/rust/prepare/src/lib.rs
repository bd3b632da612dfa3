//! Turns raw tabular input into cleaned person records.
//!
//! This crate provides:
//! - [`RecordPreparer`]: the preparation trait the job pipeline calls
//! - [`FarmReportPreparer`]: preparer for farm report CSV and spreadsheet exports
//! - [`names`]: name splitting, entity detection and cell normalization

pub mod farm_report;
pub mod names;

use std::path::Path;

use leadscout_shared::{EntityKind, PersonRecord, Result};

pub use farm_report::FarmReportPreparer;

/// Counters reported after preparation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareStats {
    pub rows_read: usize,
    pub duplicate_columns: usize,
    pub duplicate_owners: usize,
    /// Rows without a usable owner name.
    pub skipped_rows: usize,
}

/// Prepared records split by role, each list in input order.
#[derive(Debug, Clone, Default)]
pub struct PreparedRecords {
    pub borrowers: Vec<PersonRecord>,
    pub lenders: Vec<PersonRecord>,
    pub stats: PrepareStats,
}

impl PreparedRecords {
    pub fn len(&self) -> usize {
        self.borrowers.len() + self.lenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.borrowers.is_empty() && self.lenders.is_empty()
    }

    /// `(individual, business)` counts across both roles.
    pub fn kind_counts(&self) -> (usize, usize) {
        self.borrowers
            .iter()
            .chain(&self.lenders)
            .fold((0, 0), |(i, b), r| match r.kind {
                EntityKind::Individual => (i + 1, b),
                EntityKind::Business => (i, b + 1),
            })
    }
}

/// Converts an input file into person records.
pub trait RecordPreparer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Read, clean, deduplicate and partition the input.
    fn prepare(&self, input: &Path) -> Result<PreparedRecords>;
}
