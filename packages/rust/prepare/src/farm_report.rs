//! Farm report preparer for CSV and spreadsheet exports.
//!
//! Borrowers are property owners, one per distinct `Owner Name(s) Formatted`.
//! Lenders come from `1st Mortgage Lender Name - Originated`, one per distinct name.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use tracing::{debug, info, instrument, warn};

use leadscout_shared::{
    Address, EntityKind, LeadScoutError, PersonId, PersonName, PersonRecord, Result, Role,
};

use crate::names::{
    clean_cell, dedup_key, is_business_name, normalize_state, normalize_zip, split_person_name,
};
use crate::{PrepareStats, PreparedRecords, RecordPreparer};

pub const OWNER_NAME: &str = "Owner Name(s) Formatted";
pub const OWNER_FIRST_NAME: &str = "Owner 1 First Name";
pub const PROPERTY_ADDRESS: &str = "Property Address";
pub const CITY: &str = "City";
pub const STATE: &str = "State";
pub const ZIP: &str = "ZIP Code";
pub const MAILING_ADDRESS: &str = "Mailing Address";
pub const MAILING_CITY: &str = "Mailing City";
pub const MAILING_STATE: &str = "Mailing State";
pub const MAILING_ZIP: &str = "Mailing ZIP Code";
pub const LENDER_NAME: &str = "1st Mortgage Lender Name - Originated";

/// Export columns of a lender record.
pub const LENDER_COLUMNS: [&str; 2] = ["Lender Name", "Loan Count"];

const ZIP_COLUMNS: [&str; 2] = [ZIP, MAILING_ZIP];
const STATE_COLUMNS: [&str; 2] = [STATE, MAILING_STATE];

/// Prepares farm report exports, delimited or spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct FarmReportPreparer;

/// Input layouts the preparer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    /// Any workbook calamine opens; only the first sheet is read.
    Spreadsheet,
}

impl FarmReportPreparer {
    pub fn new() -> Self {
        Self
    }

    /// Prepare from any CSV reader.
    pub fn prepare_reader<R: Read>(&self, reader: R) -> Result<PreparedRecords> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| LeadScoutError::parse(format!("invalid CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let rows = rdr.into_records().enumerate().map(|(idx, record)| {
            record
                .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>())
                .map_err(|e| LeadScoutError::parse(format!("CSV row {}: {e}", idx + 1)))
        });
        self.prepare_rows(headers, rows)
    }

    /// Prepare from the first sheet of a workbook. The first row holds the headers.
    pub fn prepare_workbook(&self, path: &Path) -> Result<PreparedRecords> {
        let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(path, e))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                LeadScoutError::validation(format!("{} has no worksheets", path.display()))
            })?
            .map_err(|e| workbook_error(path, e))?;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .map(|r| r.iter().map(sheet_cell).collect())
            .unwrap_or_default();
        self.prepare_rows(
            headers,
            rows.map(|r| Ok::<Vec<String>, LeadScoutError>(r.iter().map(sheet_cell).collect())),
        )
    }

    fn prepare_rows<I>(&self, headers: Vec<String>, rows: I) -> Result<PreparedRecords>
    where
        I: IntoIterator<Item = Result<Vec<String>>>,
    {
        // First occurrence of each column name wins.
        let mut seen = HashSet::new();
        let mut kept: Vec<(usize, String)> = Vec::new();
        for (idx, name) in headers.iter().enumerate() {
            let name = name.trim().to_string();
            if seen.insert(name.clone()) {
                kept.push((idx, name));
            }
        }

        let mut stats = PrepareStats {
            duplicate_columns: headers.len() - kept.len(),
            ..PrepareStats::default()
        };
        if stats.duplicate_columns > 0 {
            warn!(
                count = stats.duplicate_columns,
                "duplicate column names, keeping first occurrence"
            );
        }

        let has = |col: &str| kept.iter().any(|(_, n)| n == col);
        if !has(OWNER_NAME) {
            return Err(LeadScoutError::validation(format!(
                "input is missing required column '{OWNER_NAME}'"
            )));
        }
        let has_first_name_column = has(OWNER_FIRST_NAME);
        if !has_first_name_column {
            warn!("'{OWNER_FIRST_NAME}' column not found, all owners treated as business");
        }

        let mut borrowers = Vec::new();
        let mut owner_keys = HashSet::new();
        let mut lenders = LenderTally::default();

        for (row_idx, record) in rows.into_iter().enumerate() {
            let row = row_idx + 1;
            let record = record?;
            stats.rows_read += 1;

            let columns: Vec<(String, String)> = kept
                .iter()
                .map(|(idx, name)| {
                    let raw = record.get(*idx).map(String::as_str).unwrap_or_default();
                    (name.clone(), normalize_cell(name, raw))
                })
                .collect();
            let get = |col: &str| cell(&columns, col);

            if let Some(lender) = get(LENDER_NAME) {
                lenders.add(lender, row);
            }

            let Some(owner) = get(OWNER_NAME) else {
                stats.skipped_rows += 1;
                debug!(row, "row without owner name");
                continue;
            };
            if !owner_keys.insert(dedup_key(owner)) {
                stats.duplicate_owners += 1;
                continue;
            }

            let first_hint = get(OWNER_FIRST_NAME);
            let kind = if !has_first_name_column || first_hint.is_none() || is_business_name(owner)
            {
                EntityKind::Business
            } else {
                EntityKind::Individual
            };
            let name = match kind {
                EntityKind::Individual => reconcile_first_name(split_person_name(owner), first_hint),
                EntityKind::Business => PersonName {
                    full: owner.to_string(),
                    ..PersonName::default()
                },
            };
            let address = owner_address(&columns);

            borrowers.push(PersonRecord {
                id: PersonId::new(Role::Borrower, row),
                role: Role::Borrower,
                kind,
                name,
                address,
                columns,
            });
        }

        if stats.duplicate_owners > 0 {
            info!(
                before = borrowers.len() + stats.duplicate_owners,
                after = borrowers.len(),
                "deduplicated borrowers by owner name"
            );
        }

        let prepared = PreparedRecords {
            borrowers,
            lenders: lenders.into_records(),
            stats,
        };
        Ok(prepared)
    }
}

impl RecordPreparer for FarmReportPreparer {
    fn name(&self) -> &str {
        "farm_report"
    }

    #[instrument(skip(self), fields(input = %input.display()))]
    fn prepare(&self, input: &Path) -> Result<PreparedRecords> {
        let prepared = match check_input_format(input)? {
            InputFormat::Csv => {
                let file =
                    std::fs::File::open(input).map_err(|e| LeadScoutError::io(input, e))?;
                self.prepare_reader(std::io::BufReader::new(file))?
            }
            InputFormat::Spreadsheet => self.prepare_workbook(input)?,
        };

        let (individuals, businesses) = prepared.kind_counts();
        info!(
            rows = prepared.stats.rows_read,
            borrowers = prepared.borrowers.len(),
            lenders = prepared.lenders.len(),
            individuals,
            businesses,
            "prepared farm report"
        );
        Ok(prepared)
    }
}

/// Pick the reader from the file extension.
pub fn check_input_format(input: &Path) -> Result<InputFormat> {
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => Ok(InputFormat::Csv),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Spreadsheet),
        _ => Err(LeadScoutError::validation(format!(
            "unsupported input format '{}': expected .csv, .xlsx or .xls",
            input.display()
        ))),
    }
}

fn workbook_error(path: &Path, e: calamine::Error) -> LeadScoutError {
    match e {
        calamine::Error::Io(io) => LeadScoutError::io(path, io),
        other => LeadScoutError::parse(format!("{}: {other}", path.display())),
    }
}

/// Spreadsheet cell as text. Whole-number floats drop their fraction so
/// numeric ZIPs and APNs read the same as in a CSV export.
fn sheet_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn normalize_cell(column: &str, raw: &str) -> String {
    let Some(value) = clean_cell(raw) else {
        return String::new();
    };
    if ZIP_COLUMNS.contains(&column) {
        // Unparseable ZIPs are treated as missing.
        normalize_zip(&value).unwrap_or_default()
    } else if STATE_COLUMNS.contains(&column) {
        normalize_state(&value)
    } else {
        value
    }
}

/// Non-empty value of a column.
fn cell<'a>(columns: &'a [(String, String)], col: &str) -> Option<&'a str> {
    columns
        .iter()
        .find(|(name, _)| name == col)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Property address, falling back to the mailing address when the property has none.
fn owner_address(columns: &[(String, String)]) -> Address {
    let build = |street: &str, city: &str, state: &str, zip: &str| Address {
        street: cell(columns, street).map(str::to_string),
        city: cell(columns, city).map(str::to_string),
        state: cell(columns, state).map(str::to_string),
        zip: cell(columns, zip).map(str::to_string),
    };

    let property = build(PROPERTY_ADDRESS, CITY, STATE, ZIP);
    if property.street.is_some() || property.city.is_some() {
        property
    } else {
        build(MAILING_ADDRESS, MAILING_CITY, MAILING_STATE, MAILING_ZIP)
    }
}

/// Reports sometimes format owners as `LAST FIRST` or `LAST FIRST MIDDLE`.
/// When the first-name column matches the split's last name, swap them. When
/// it matches the leading middle token, rotate that token to the front and
/// move the split's first token to the last name.
fn reconcile_first_name(mut name: PersonName, hint: Option<&str>) -> PersonName {
    let Some(hint) = hint else {
        return name;
    };
    let is_hint = |part: &str| part.eq_ignore_ascii_case(hint);
    if name.first.as_deref().is_some_and(is_hint) {
        return name;
    }
    if name.last.as_deref().is_some_and(is_hint) {
        std::mem::swap(&mut name.first, &mut name.last);
        return name;
    }

    let mut middle: Vec<String> = name
        .middle
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if middle.first().is_some_and(|m| is_hint(m)) {
        let given = middle.remove(0);
        middle.extend(name.last.take());
        name.last = std::mem::replace(&mut name.first, Some(given));
        name.middle = (!middle.is_empty()).then(|| middle.join(" "));
    }
    name
}

/// Distinct lenders in first-seen order with their loan counts.
#[derive(Default)]
struct LenderTally {
    order: Vec<(String, usize)>,
    counts: HashMap<String, usize>,
}

impl LenderTally {
    fn add(&mut self, name: &str, row: usize) {
        let key = dedup_key(name);
        match self.counts.get_mut(&key) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(key, 1);
                self.order.push((name.to_string(), row));
            }
        }
    }

    fn into_records(self) -> Vec<PersonRecord> {
        self.order
            .into_iter()
            .map(|(name, row)| {
                let loans = self.counts.get(&dedup_key(&name)).copied().unwrap_or(1);
                let (kind, parts) = if is_business_name(&name) {
                    (
                        EntityKind::Business,
                        PersonName {
                            full: name.clone(),
                            ..PersonName::default()
                        },
                    )
                } else {
                    let parts = split_person_name(&name);
                    let kind = if parts.last.is_some() {
                        EntityKind::Individual
                    } else {
                        EntityKind::Business
                    };
                    (kind, parts)
                };
                PersonRecord {
                    id: PersonId::new(Role::Lender, row),
                    role: Role::Lender,
                    kind,
                    name: parts,
                    address: Address::default(),
                    columns: vec![
                        (LENDER_COLUMNS[0].to_string(), name),
                        (LENDER_COLUMNS[1].to_string(), loans.to_string()),
                    ],
                }
            })
            .collect()
    }
}
