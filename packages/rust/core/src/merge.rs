//! Candidate scoring and merging into one outcome per record.

use std::collections::{BTreeSet, HashMap, HashSet};

use strsim::jaro_winkler;

use leadscout_shared::{
    EnrichmentOutcome, FieldToggles, OutcomeStatus, PersonRecord, RunConfig, ScoringConfig,
    SearchResult,
};

/// Combines the candidates found for a record into an [`EnrichmentOutcome`].
#[derive(Debug, Clone)]
pub struct ResultMerger {
    threshold: f64,
    max_phones: usize,
    weights: ScoringConfig,
    /// Extraction toggles per source name. Unlisted sources keep every field.
    fields: HashMap<String, FieldToggles>,
}

/// A candidate with its computed confidence.
#[derive(Debug, Clone, Copy)]
struct Scored<'a> {
    candidate: &'a SearchResult,
    confidence: f64,
    index: usize,
}

impl Scored<'_> {
    fn rank(&self) -> u8 {
        self.candidate.variation.map(|v| v.rank()).unwrap_or(u8::MAX)
    }
}

impl ResultMerger {
    pub fn new(threshold: f64, max_phones: usize, weights: ScoringConfig) -> Self {
        Self {
            threshold,
            max_phones,
            weights,
            fields: HashMap::new(),
        }
    }

    /// Restrict which fields `source` may contribute.
    pub fn with_fields(mut self, source: impl Into<String>, toggles: FieldToggles) -> Self {
        self.fields.insert(source.into(), toggles);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Confidence in [0, 1] that `candidate` is the person in `record`.
    ///
    /// Weighted mean of the name, address and certainty components that are
    /// present. Address is absent when either side has no address; certainty
    /// is absent when the source reports none.
    pub fn score(&self, record: &PersonRecord, candidate: &SearchResult) -> f64 {
        let mut total = self.weights.name_weight * name_similarity(record, &candidate.name);
        let mut weight = self.weights.name_weight;

        if let Some(address) = address_similarity(record, candidate) {
            total += self.weights.address_weight * address;
            weight += self.weights.address_weight;
        }
        if let Some(certainty) = candidate.certainty {
            total += self.weights.certainty_weight * certainty.clamp(0.0, 1.0);
            weight += self.weights.certainty_weight;
        }

        if weight <= 0.0 {
            return 0.0;
        }
        (total / weight).clamp(0.0, 1.0)
    }

    /// Highest confidence among `candidates`, if any.
    pub fn best_confidence(&self, record: &PersonRecord, candidates: &[SearchResult]) -> Option<f64> {
        candidates
            .iter()
            .map(|c| self.score(record, c))
            .fold(None, |best, c| Some(best.map_or(c, |b: f64| b.max(c))))
    }

    /// Merge every candidate collected for `record`.
    ///
    /// The best-scoring candidate wins; ties go to the more specific query
    /// variation, then to the earlier candidate. Below the threshold the
    /// outcome is `ambiguous` with the best candidate's data. Candidates with
    /// the same normalized name that also clear the threshold add their
    /// phones, emails, relatives and addresses.
    pub fn merge(&self, record: &PersonRecord, candidates: &[SearchResult]) -> EnrichmentOutcome {
        let scored: Vec<Scored<'_>> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| Scored {
                candidate,
                confidence: self.score(record, candidate),
                index,
            })
            .collect();

        let Some(best) = scored.iter().copied().reduce(|best, next| {
            let better = next.confidence > best.confidence
                || (next.confidence == best.confidence && next.rank() < best.rank());
            if better { next } else { best }
        }) else {
            return EnrichmentOutcome::no_match();
        };

        let status = if best.confidence >= self.threshold {
            OutcomeStatus::Matched
        } else {
            OutcomeStatus::Ambiguous
        };

        let best_key = normalize(&best.candidate.name);
        let mut contributors: Vec<Scored<'_>> = scored
            .iter()
            .copied()
            .filter(|s| {
                s.index != best.index
                    && s.confidence >= self.threshold
                    && normalize(&s.candidate.name) == best_key
            })
            .collect();
        contributors.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.index.cmp(&b.index))
        });
        contributors.insert(0, best);

        self.assemble(status, best, &contributors)
    }

    fn toggles(&self, source: &str) -> FieldToggles {
        self.fields.get(source).copied().unwrap_or_default()
    }

    fn assemble(
        &self,
        status: OutcomeStatus,
        best: Scored<'_>,
        contributors: &[Scored<'_>],
    ) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome::empty(status);
        outcome.confidence = best.confidence;
        outcome.source = Some(best.candidate.source.clone()).filter(|s| !s.is_empty());
        outcome.page_url = best.candidate.page_url.clone();
        outcome.marital_status = best.candidate.marital_status.clone();
        outcome.background = best.candidate.background.clone();

        let mut phones = OrderedSet::default();
        let mut relatives = OrderedSet::default();
        let mut addresses = OrderedSet::default();
        let mut emails = BTreeSet::new();

        for s in contributors {
            let c = s.candidate;
            let fields = self.toggles(&c.source);
            if fields.phones {
                for phone in &c.phones {
                    phones.push(phone, phone_key(phone));
                }
            }
            if fields.emails {
                emails.extend(
                    c.emails
                        .iter()
                        .map(|e| e.trim().to_lowercase())
                        .filter(|e| !e.is_empty()),
                );
            }
            if fields.age && outcome.age.is_none() {
                outcome.age = c.age;
            }
            if fields.relatives {
                for name in &c.relatives {
                    relatives.push(name, normalize(name));
                }
            }
            if fields.addresses {
                for address in c.current_address.iter().chain(&c.address_history) {
                    addresses.push(address, normalize(address));
                }
            }
        }

        outcome.phones = phones.items;
        outcome.phones.truncate(self.max_phones);
        outcome.emails = emails.into_iter().collect();
        outcome.relatives = relatives.items;
        outcome.address_history = addresses.items;
        outcome
    }
}

impl From<&RunConfig> for ResultMerger {
    fn from(config: &RunConfig) -> Self {
        config.sources.iter().fold(
            Self::new(
                config.min_confidence_threshold,
                config.max_phones,
                config.scoring.clone(),
            ),
            |merger, source| merger.with_fields(source.name.clone(), source.fields),
        )
    }
}

/// Insertion-ordered values deduplicated by a key.
#[derive(Default)]
struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    fn push(&mut self, value: &str, key: String) {
        let value = value.trim();
        if value.is_empty() || key.is_empty() {
            return;
        }
        if self.seen.insert(key) {
            self.items.push(value.to_string());
        }
    }
}

/// Lower-case alphanumeric tokens joined by single spaces.
fn normalize(s: &str) -> String {
    tokens(s).join(" ")
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn phone_key(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    // Drop a leading country code so +1 and local forms collapse.
    match digits.len() {
        11 if digits.starts_with('1') => digits[1..].to_string(),
        _ => digits,
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Mean of token Jaccard and Jaro-Winkler over the normalized names.
fn name_similarity(record: &PersonRecord, candidate_name: &str) -> f64 {
    let n = &record.name;
    let record_name = match (&n.first, &n.last) {
        (Some(first), Some(last)) => [Some(first), n.middle.as_ref(), Some(last)]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => n.full.clone(),
    };

    let a = normalize(&record_name);
    let b = normalize(candidate_name);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let ta: HashSet<String> = tokens(&a).into_iter().collect();
    let tb: HashSet<String> = tokens(&b).into_iter().collect();
    (jaccard(&ta, &tb) + jaro_winkler(&a, &b)) / 2.0
}

/// Share of the record's address tokens found in the closest candidate address.
fn address_similarity(record: &PersonRecord, candidate: &SearchResult) -> Option<f64> {
    if record.address.is_empty() {
        return None;
    }
    let known: HashSet<String> = tokens(&record.address.one_line()).into_iter().collect();
    if known.is_empty() {
        return None;
    }

    candidate
        .current_address
        .iter()
        .chain(&candidate.address_history)
        .map(|address| {
            let theirs: HashSet<String> = tokens(address).into_iter().collect();
            known.intersection(&theirs).count() as f64 / known.len() as f64
        })
        .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_shared::{Address, EntityKind, PersonId, PersonName, QueryVariation, Role};

    fn record() -> PersonRecord {
        PersonRecord {
            id: PersonId::new(Role::Borrower, 1),
            role: Role::Borrower,
            kind: EntityKind::Individual,
            name: PersonName {
                full: "SMITH JOHN A".into(),
                first: Some("John".into()),
                middle: Some("A".into()),
                last: Some("Smith".into()),
            },
            address: Address {
                street: Some("123 Main St".into()),
                city: Some("Springfield".into()),
                state: Some("IL".into()),
                zip: Some("62701".into()),
            },
            columns: vec![],
        }
    }

    fn candidate(name: &str, address: Option<&str>, certainty: Option<f64>) -> SearchResult {
        SearchResult {
            source: "fastpeoplesearch".into(),
            variation: Some(QueryVariation::FullAddress),
            name: name.into(),
            current_address: address.map(Into::into),
            certainty,
            ..SearchResult::default()
        }
    }

    fn merger(threshold: f64) -> ResultMerger {
        ResultMerger::new(threshold, 5, ScoringConfig::default())
    }

    #[test]
    fn no_candidates_is_no_match() {
        let outcome = merger(0.7).merge(&record(), &[]);
        assert_eq!(outcome.status, OutcomeStatus::NoMatch);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn exact_match_scores_high() {
        let c = candidate(
            "John A Smith",
            Some("123 Main St, Springfield, IL 62701"),
            Some(1.0),
        );
        let score = merger(0.7).score(&record(), &c);
        assert!(score > 0.99, "score {score}");
    }

    #[test]
    fn missing_components_renormalize_weights() {
        // Name only: confidence equals the name component.
        let mut rec = record();
        rec.address = Address::default();
        let c = candidate("John A Smith", None, None);
        let score = merger(0.7).score(&rec, &c);
        assert!((score - 1.0).abs() < 1e-9, "score {score}");
    }

    #[test]
    fn unrelated_name_is_ambiguous_or_below() {
        let c = candidate("Maria Gonzalez", Some("9 Elm Ave, Dallas, TX 75201"), None);
        let outcome = merger(0.7).merge(&record(), &[c]);
        assert_eq!(outcome.status, OutcomeStatus::Ambiguous);
        assert!(outcome.confidence < 0.7);
    }

    #[test]
    fn never_matched_below_threshold() {
        let candidates = vec![
            candidate("John Smith", Some("123 Main St, Springfield, IL"), Some(0.4)),
            candidate("Jon Smyth", Some("77 Oak Rd, Peoria, IL"), None),
            candidate("Johnny Smithers", None, Some(0.9)),
        ];
        for step in 0..=20 {
            let threshold = step as f64 / 20.0;
            let m = merger(threshold);
            let outcome = m.merge(&record(), &candidates);
            let best = m.best_confidence(&record(), &candidates).unwrap();
            if best < threshold {
                assert_ne!(outcome.status, OutcomeStatus::Matched, "threshold {threshold}");
            } else {
                assert_eq!(outcome.status, OutcomeStatus::Matched, "threshold {threshold}");
            }
            assert!((outcome.confidence - best).abs() < 1e-12);
        }
    }

    #[test]
    fn ties_prefer_more_specific_variation() {
        let mut broad = candidate("John A Smith", None, None);
        broad.variation = Some(QueryVariation::NameOnly);
        broad.page_url = Some("https://example.com/broad".into());
        let mut specific = broad.clone();
        specific.variation = Some(QueryVariation::NameCity);
        specific.page_url = Some("https://example.com/specific".into());

        let mut rec = record();
        rec.address = Address::default();
        let outcome = merger(0.5).merge(&rec, &[broad, specific]);
        assert_eq!(outcome.page_url.as_deref(), Some("https://example.com/specific"));
    }

    #[test]
    fn phones_are_capped_and_deduplicated() {
        let mut best = candidate("John A Smith", Some("123 Main St Springfield IL 62701"), None);
        best.phones = (0..8).map(|i| format!("(217) 555-010{i}")).collect();
        best.phones.insert(1, "+1 217-555-0100".into());

        let m = ResultMerger::new(0.7, 3, ScoringConfig::default());
        let outcome = m.merge(&record(), &[best]);
        assert_eq!(
            outcome.phones,
            vec!["(217) 555-0100", "(217) 555-0101", "(217) 555-0102"]
        );
    }

    #[test]
    fn corroborating_candidates_add_fields() {
        let mut a = candidate("John A Smith", Some("123 Main St, Springfield, IL 62701"), None);
        a.phones = vec!["217-555-0100".into()];
        a.emails = vec!["JOHN@example.com".into()];
        a.age = Some(54);

        let mut b = a.clone();
        b.variation = Some(QueryVariation::NameCity);
        b.phones = vec!["217-555-0100".into(), "217-555-0199".into()];
        b.emails = vec!["jsmith@example.com".into(), "john@example.com".into()];
        b.relatives = vec!["Mary Smith".into()];
        b.age = Some(99);

        let mut stranger = candidate("Pat Jones", Some("123 Main St, Springfield, IL"), None);
        stranger.phones = vec!["312-555-0000".into()];

        let outcome = merger(0.7).merge(&record(), &[a, b, stranger]);
        assert_eq!(outcome.status, OutcomeStatus::Matched);
        assert_eq!(outcome.phones, vec!["217-555-0100", "217-555-0199"]);
        assert_eq!(outcome.emails, vec!["john@example.com", "jsmith@example.com"]);
        assert_eq!(outcome.relatives, vec!["Mary Smith"]);
        assert_eq!(outcome.age, Some(54));
        assert_eq!(
            outcome.address_history,
            vec!["123 Main St, Springfield, IL 62701"]
        );
    }

    #[test]
    fn disabled_fields_are_dropped() {
        let mut c = candidate("John A Smith", Some("123 Main St Springfield IL 62701"), None);
        c.phones = vec!["217-555-0100".into()];
        c.emails = vec!["john@example.com".into()];
        c.age = Some(54);

        let m = merger(0.7).with_fields(
            "fastpeoplesearch",
            FieldToggles {
                phones: false,
                age: false,
                ..FieldToggles::default()
            },
        );
        let outcome = m.merge(&record(), &[c]);
        assert!(outcome.phones.is_empty());
        assert_eq!(outcome.age, None);
        assert_eq!(outcome.emails, vec!["john@example.com"]);
    }
}
