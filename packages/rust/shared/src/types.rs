//! Core domain types: person records, search candidates, outcomes and run state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PersonId / Role / EntityKind
// ---------------------------------------------------------------------------

/// Stable record identifier, unique within a run (`borrower-000042`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub String);

impl PersonId {
    /// Derive an identifier from the record's role and input row position.
    pub fn new(role: Role, row: usize) -> Self {
        Self(format!("{}-{row:06}", role.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which side of the mortgage a person sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Borrower,
    Lender,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Borrower => "borrower",
            Self::Lender => "lender",
        }
    }
}

/// Whether a record names a natural person or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Individual,
    Business,
}

// ---------------------------------------------------------------------------
// PersonRecord
// ---------------------------------------------------------------------------

/// A postal address. Any part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.city.is_none() && self.state.is_none() && self.zip.is_none()
    }

    /// `street, city, state, zip` with absent parts skipped.
    pub fn one_line(&self) -> String {
        [&self.street, &self.city, &self.state, &self.zip]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Name parts of a person record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    /// Name as it appeared in the input.
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

/// A cleaned person record produced by a record preparer. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub role: Role,
    pub kind: EntityKind,
    pub name: PersonName,
    #[serde(default)]
    pub address: Address,
    /// Original input columns, in input order, for export.
    #[serde(default)]
    pub columns: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// SearchQuery
// ---------------------------------------------------------------------------

/// A query variation, ordered most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryVariation {
    FullAddress,
    NameCity,
    NameOnly,
}

impl QueryVariation {
    pub const ALL: [QueryVariation; 3] = [Self::FullAddress, Self::NameCity, Self::NameOnly];

    /// Lower rank means more specific.
    pub fn rank(&self) -> u8 {
        match self {
            Self::FullAddress => 0,
            Self::NameCity => 1,
            Self::NameOnly => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullAddress => "full_address",
            Self::NameCity => "name_city",
            Self::NameOnly => "name_only",
        }
    }
}

/// One concrete query sent to a search source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub person_id: PersonId,
    pub variation: QueryVariation,
    pub first: String,
    pub last: String,
    pub full_name: String,
    /// The subset of the known address this variation searches with.
    pub address: Address,
}

impl SearchQuery {
    /// Build the query variations a record supports, in priority order.
    ///
    /// Records without a first and last name yield no queries.
    pub fn variations(record: &PersonRecord, enabled: &[QueryVariation]) -> Vec<SearchQuery> {
        let (Some(first), Some(last)) = (&record.name.first, &record.name.last) else {
            return Vec::new();
        };

        let known = &record.address;
        let mut ordered: Vec<QueryVariation> = enabled.to_vec();
        ordered.sort();
        ordered.dedup();

        ordered
            .into_iter()
            .filter_map(|variation| {
                let address = match variation {
                    QueryVariation::FullAddress => {
                        let has_locality =
                            known.zip.is_some() || (known.city.is_some() && known.state.is_some());
                        if known.street.is_none() || !has_locality {
                            return None;
                        }
                        known.clone()
                    }
                    QueryVariation::NameCity => {
                        if known.city.is_none() || known.state.is_none() {
                            return None;
                        }
                        Address {
                            street: None,
                            ..known.clone()
                        }
                    }
                    QueryVariation::NameOnly => Address::default(),
                };
                Some(SearchQuery {
                    person_id: record.id.clone(),
                    variation,
                    first: first.clone(),
                    last: last.clone(),
                    full_name: record.name.full.clone(),
                    address,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SearchResult (candidate)
// ---------------------------------------------------------------------------

/// One candidate person returned by a source for a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Name of the source that produced this candidate.
    pub source: String,
    /// Variation of the query that produced this candidate.
    pub variation: Option<QueryVariation>,
    /// Display name on the source's page.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub relatives: Vec<String>,
    #[serde(default)]
    pub associates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_address: Option<String>,
    /// Previous addresses, most recent first.
    #[serde(default)]
    pub address_history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    /// Source-reported certainty in [0, 1], when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Final status of one record's enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Matched,
    NoMatch,
    Ambiguous,
    AccessDenied,
    Error,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 5] = [
        Self::Matched,
        Self::NoMatch,
        Self::Ambiguous,
        Self::AccessDenied,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NoMatch => "no_match",
            Self::Ambiguous => "ambiguous",
            Self::AccessDenied => "access_denied",
            Self::Error => "error",
        }
    }

    /// Statuses that ended because the source could not be queried to completion.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::AccessDenied | Self::Error)
    }
}

impl std::str::FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown outcome status '{s}'"))
    }
}

/// Classified failure of a source query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source blocked or rate-limited the session.
    AccessDenied,
    Timeout,
    Network,
    /// The response did not have the expected shape.
    Structural,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Structural => "structural",
        }
    }
}

/// Merged enrichment result for one person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    pub status: OutcomeStatus,
    /// Confidence of the selected candidate, 0 when there is none.
    pub confidence: f64,
    /// Phones ordered by confidence, capped at the configured maximum.
    #[serde(default)]
    pub phones: Vec<String>,
    /// Deduplicated, sorted.
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default)]
    pub relatives: Vec<String>,
    /// Most recent first.
    #[serde(default)]
    pub address_history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl EnrichmentOutcome {
    /// An outcome with no data and the given status.
    pub fn empty(status: OutcomeStatus) -> Self {
        Self {
            status,
            confidence: 0.0,
            phones: Vec::new(),
            emails: Vec::new(),
            age: None,
            relatives: Vec::new(),
            address_history: Vec::new(),
            marital_status: None,
            background: None,
            source: None,
            page_url: None,
            last_error: None,
            error_message: None,
        }
    }

    pub fn no_match() -> Self {
        Self::empty(OutcomeStatus::NoMatch)
    }

    /// Terminal failure outcome carrying the last error seen.
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = match kind {
            ErrorKind::AccessDenied => OutcomeStatus::AccessDenied,
            _ => OutcomeStatus::Error,
        };
        Self {
            last_error: Some(kind),
            error_message: Some(message.into()),
            ..Self::empty(status)
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Latest known state of one record within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub outcome: EnrichmentOutcome,
    /// Source queries issued for the record, retries included.
    pub attempts: u32,
    pub last_attempted_at: DateTime<Utc>,
}

/// Resumable checkpoint: record id → latest entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentRunState {
    entries: BTreeMap<PersonId, RunEntry>,
}

impl EnrichmentRunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry, replacing any earlier one for the same id.
    pub fn insert(&mut self, id: PersonId, entry: RunEntry) {
        self.entries.insert(id, entry);
    }

    pub fn get(&self, id: &PersonId) -> Option<&RunEntry> {
        self.entries.get(id)
    }

    /// Whether the record must not be queried again.
    ///
    /// With `requeue_unresolved`, `access_denied` and `error` entries count as pending.
    pub fn is_terminal(&self, id: &PersonId, requeue_unresolved: bool) -> bool {
        match self.entries.get(id) {
            Some(entry) => !(requeue_unresolved && entry.outcome.status.is_unresolved()),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PersonId, &RunEntry)> {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Share of records (0–100) that carry at least one value per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillRates {
    pub phones: f64,
    pub emails: f64,
    pub age: f64,
    pub relatives: f64,
    pub address_history: f64,
}

/// A record that ended without a usable answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedRecord {
    pub id: PersonId,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Totals for one role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleTotals {
    pub records: usize,
    pub matched: usize,
}

/// Statistics of a finished (or cancelled) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    /// Records in scope that have an outcome.
    pub total_records: usize,
    /// Records in scope still without an outcome (cancelled or beyond `max_leads`).
    pub pending_records: usize,
    pub status_counts: BTreeMap<OutcomeStatus, usize>,
    /// Matched records as a percentage of records with an outcome.
    pub match_rate: f64,
    pub fill_rates: FillRates,
    pub roles: BTreeMap<Role, RoleTotals>,
    /// Records queried during this run.
    pub queried_this_run: usize,
    /// Records skipped because the store already held a terminal outcome.
    pub resumed: usize,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub unresolved: Vec<UnresolvedRecord>,
}

impl RunSummary {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }
}
