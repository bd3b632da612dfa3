//! Run statistics computed from the final run state.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;

use leadscout_shared::{
    EnrichmentRunState, FillRates, OutcomeStatus, PersonId, PersonRecord, Role, RoleTotals,
    RunEntry, RunSummary, UnresolvedRecord,
};

/// Counters the orchestrator tracks while running.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    pub queried: usize,
    pub resumed: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Summarize `scope` against `state`. Records without an entry count as pending.
pub fn summarize(scope: &[PersonRecord], state: &EnrichmentRunState, totals: RunTotals) -> RunSummary {
    build(
        scope.iter().map(|r| (r.role, &r.id, state.get(&r.id))),
        totals,
    )
}

/// Summarize every entry in a stored run state, inferring roles from ids.
pub fn summarize_state(state: &EnrichmentRunState, totals: RunTotals) -> RunSummary {
    build(
        state.iter().map(|(id, entry)| (role_of(id), id, Some(entry))),
        totals,
    )
}

fn role_of(id: &PersonId) -> Role {
    if id.as_str().starts_with(Role::Lender.as_str()) {
        Role::Lender
    } else {
        Role::Borrower
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn build<'a>(
    items: impl Iterator<Item = (Role, &'a PersonId, Option<&'a RunEntry>)>,
    totals: RunTotals,
) -> RunSummary {
    let mut status_counts: BTreeMap<OutcomeStatus, usize> =
        OutcomeStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut roles: BTreeMap<Role, RoleTotals> = BTreeMap::new();
    let mut unresolved = Vec::new();
    let mut filled = [0usize; 5];
    let mut total = 0;
    let mut pending = 0;

    for (role, id, entry) in items {
        let role_totals = roles.entry(role).or_default();
        role_totals.records += 1;

        let Some(entry) = entry else {
            pending += 1;
            continue;
        };
        let o = &entry.outcome;
        total += 1;
        *status_counts.entry(o.status).or_default() += 1;
        if o.status == OutcomeStatus::Matched {
            role_totals.matched += 1;
        }

        let has = [
            !o.phones.is_empty(),
            !o.emails.is_empty(),
            o.age.is_some(),
            !o.relatives.is_empty(),
            !o.address_history.is_empty(),
        ];
        for (count, present) in filled.iter_mut().zip(has) {
            *count += present as usize;
        }

        if o.status.is_unresolved() {
            unresolved.push(UnresolvedRecord {
                id: id.clone(),
                status: o.status,
                last_error: o.last_error,
                message: o.error_message.clone(),
            });
        }
    }

    let matched = status_counts
        .get(&OutcomeStatus::Matched)
        .copied()
        .unwrap_or(0);

    RunSummary {
        generated_at: Utc::now(),
        total_records: total,
        pending_records: pending,
        status_counts,
        match_rate: percent(matched, total),
        fill_rates: FillRates {
            phones: percent(filled[0], total),
            emails: percent(filled[1], total),
            age: percent(filled[2], total),
            relatives: percent(filled[3], total),
            address_history: percent(filled[4], total),
        },
        roles,
        queried_this_run: totals.queried,
        resumed: totals.resumed,
        elapsed_secs: totals.elapsed.as_secs_f64(),
        cancelled: totals.cancelled,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_shared::{
        Address, EnrichmentOutcome, EntityKind, ErrorKind, PersonName,
    };

    fn record(role: Role, row: usize) -> PersonRecord {
        PersonRecord {
            id: PersonId::new(role, row),
            role,
            kind: EntityKind::Individual,
            name: PersonName::default(),
            address: Address::default(),
            columns: vec![],
        }
    }

    fn entry(outcome: EnrichmentOutcome) -> RunEntry {
        RunEntry {
            outcome,
            attempts: 1,
            last_attempted_at: Utc::now(),
        }
    }

    fn fixture() -> (Vec<PersonRecord>, EnrichmentRunState) {
        let scope = vec![
            record(Role::Borrower, 1),
            record(Role::Borrower, 2),
            record(Role::Borrower, 3),
            record(Role::Lender, 4),
            record(Role::Lender, 5),
        ];
        let mut matched = EnrichmentOutcome::empty(OutcomeStatus::Matched);
        matched.phones = vec!["217-555-0100".into()];
        matched.age = Some(40);

        let mut state = EnrichmentRunState::new();
        state.insert(scope[0].id.clone(), entry(matched.clone()));
        state.insert(scope[1].id.clone(), entry(EnrichmentOutcome::no_match()));
        state.insert(
            scope[2].id.clone(),
            entry(EnrichmentOutcome::failed(ErrorKind::AccessDenied, "HTTP 429")),
        );
        state.insert(scope[3].id.clone(), entry(matched));
        (scope, state)
    }

    #[test]
    fn counts_rates_and_unresolved() {
        let (scope, state) = fixture();
        let s = summarize(
            &scope,
            &state,
            RunTotals {
                queried: 3,
                resumed: 1,
                elapsed: Duration::from_secs(12),
                cancelled: true,
            },
        );

        assert_eq!(s.total_records, 4);
        assert_eq!(s.pending_records, 1);
        assert_eq!(s.count(OutcomeStatus::Matched), 2);
        assert_eq!(s.count(OutcomeStatus::NoMatch), 1);
        assert_eq!(s.count(OutcomeStatus::AccessDenied), 1);
        assert_eq!(s.count(OutcomeStatus::Error), 0);
        assert!((s.match_rate - 50.0).abs() < 1e-9);
        assert!((s.fill_rates.phones - 50.0).abs() < 1e-9);
        assert_eq!(s.fill_rates.emails, 0.0);

        assert_eq!(s.roles[&Role::Borrower], RoleTotals { records: 3, matched: 1 });
        assert_eq!(s.roles[&Role::Lender], RoleTotals { records: 2, matched: 1 });

        assert_eq!(s.unresolved.len(), 1);
        assert_eq!(s.unresolved[0].id.as_str(), "borrower-000003");
        assert_eq!(s.unresolved[0].last_error, Some(ErrorKind::AccessDenied));
        assert!(s.cancelled);
        assert_eq!(s.elapsed_secs, 12.0);
    }

    #[test]
    fn stored_state_summary_infers_roles() {
        let (_, state) = fixture();
        let s = summarize_state(&state, RunTotals::default());
        assert_eq!(s.total_records, 4);
        assert_eq!(s.pending_records, 0);
        assert_eq!(s.roles[&Role::Lender].records, 1);
    }

    #[test]
    fn empty_scope_has_zero_rates() {
        let s = summarize(&[], &EnrichmentRunState::new(), RunTotals::default());
        assert_eq!(s.total_records, 0);
        assert_eq!(s.match_rate, 0.0);
        assert!(s.unresolved.is_empty());
    }
}
