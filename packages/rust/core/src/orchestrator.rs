//! Drives the enrichment run: pacing, source queries, retries, merging and
//! durable progress.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use leadscout_shared::{
    EnrichmentOutcome, EnrichmentRunState, EntityKind, ErrorKind, LeadScoutError, LeadType,
    OutcomeStatus, PersonRecord, Result, RunConfig, RunEntry, RunSummary, SearchQuery, SearchResult,
};
use leadscout_sources::PersonSearchSource;
use leadscout_storage::Storage;

use crate::merge::ResultMerger;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::scheduler::{BatchScheduler, Boundary, Pacer, sleep_or_cancel};
use crate::summary::{RunTotals, summarize};

/// Progress callbacks for display and periodic snapshots.
pub trait EnrichmentObserver: Send + Sync {
    /// Called once after resume filtering, before the first query.
    fn run_started(&self, pending: usize, resumed: usize);
    /// Called before a record's first query. `position` is 1-based.
    fn record_started(&self, record: &PersonRecord, position: usize, pending: usize);
    /// Called after the record's outcome has been stored.
    fn record_finished(&self, record: &PersonRecord, entry: &RunEntry);
    /// Called after every record of a batch has been stored. `batch` is 1-based.
    fn batch_finished(&self, batch: usize, batches: usize, state: &EnrichmentRunState);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl EnrichmentObserver for SilentObserver {
    fn run_started(&self, _pending: usize, _resumed: usize) {}
    fn record_started(&self, _record: &PersonRecord, _position: usize, _pending: usize) {}
    fn record_finished(&self, _record: &PersonRecord, _entry: &RunEntry) {}
    fn batch_finished(&self, _batch: usize, _batches: usize, _state: &EnrichmentRunState) {}
}

/// Result of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final state, including entries resumed from the store.
    pub state: EnrichmentRunState,
    pub summary: RunSummary,
    pub totals: RunTotals,
}

/// Runs records through the configured sources.
pub struct EnrichmentOrchestrator {
    config: RunConfig,
    sources: Vec<Box<dyn PersonSearchSource>>,
    retry: RetryPolicy,
    merger: ResultMerger,
    pacer: Pacer,
    scheduler: BatchScheduler,
}

/// Collected answer for one record before merging.
struct RecordProbe {
    candidates: Vec<SearchResult>,
    attempts: u32,
    last_failure: Option<(ErrorKind, String)>,
}

impl EnrichmentOrchestrator {
    /// `sources` must be in priority order.
    pub fn new(config: RunConfig, sources: Vec<Box<dyn PersonSearchSource>>) -> Result<Self> {
        config.validate()?;
        if sources.is_empty() {
            return Err(LeadScoutError::config("no search source is enabled"));
        }
        Ok(Self {
            retry: RetryPolicy::from(&config),
            merger: ResultMerger::from(&config),
            pacer: Pacer::from(&config),
            scheduler: BatchScheduler::new(config.batch_size),
            sources,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Enrich `records` and return the final state and summary.
    ///
    /// Records are filtered by lead type, records with a terminal stored
    /// outcome are skipped and the rest are capped at `max_leads`. Every
    /// outcome is appended to `store` before the next record starts.
    /// Cancellation stops at the next record boundary or pacing wait.
    /// Only a storage failure is returned as an error, after all sessions
    /// are closed.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn run(
        &mut self,
        records: &[PersonRecord],
        store: &Storage,
        observer: &dyn EnrichmentObserver,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let mut state = store.load().await?;

        let scope: Vec<PersonRecord> = records
            .iter()
            .filter(|r| matches_lead_type(self.config.lead_type, r.kind))
            .cloned()
            .collect();
        let requeue = self.config.requeue_unresolved;
        let resumed = scope
            .iter()
            .filter(|r| state.is_terminal(&r.id, requeue))
            .count();
        let pending: Vec<PersonRecord> = scope
            .iter()
            .filter(|r| !state.is_terminal(&r.id, requeue))
            .take(self.config.max_leads)
            .cloned()
            .collect();

        info!(
            in_scope = scope.len(),
            resumed,
            pending = pending.len(),
            lead_type = ?self.config.lead_type,
            "starting enrichment run"
        );
        observer.run_started(pending.len(), resumed);

        let mut totals = RunTotals {
            resumed,
            ..RunTotals::default()
        };

        if !pending.is_empty() {
            let opened = self.open_sessions().await;
            let result = match opened {
                Ok(()) => {
                    self.process(&pending, store, &mut state, observer, cancel, &mut totals)
                        .await
                }
                Err(e) => Err(e),
            };
            self.close_sessions().await;
            result?;
            store.flush().await?;
        }

        totals.cancelled = cancel.is_cancelled();
        totals.elapsed = start.elapsed();
        let summary = summarize(&scope, &state, totals);

        info!(
            queried = totals.queried,
            matched = summary.count(OutcomeStatus::Matched),
            pending = summary.pending_records,
            cancelled = totals.cancelled,
            elapsed_secs = summary.elapsed_secs,
            "enrichment run finished"
        );

        Ok(RunReport {
            state,
            summary,
            totals,
        })
    }

    async fn process(
        &mut self,
        pending: &[PersonRecord],
        store: &Storage,
        state: &mut EnrichmentRunState,
        observer: &dyn EnrichmentObserver,
        cancel: &CancellationToken,
        totals: &mut RunTotals,
    ) -> Result<()> {
        let scheduler = self.scheduler;
        let batches = scheduler.batch_count(pending.len());
        let mut position = 0;

        for (batch_index, batch) in scheduler.batches(pending).enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            debug!(batch = batch_index + 1, batches, size = batch.len(), "starting batch");
            let mut boundary = Boundary::Batch;

            for record in batch {
                if cancel.is_cancelled() {
                    break;
                }
                position += 1;
                observer.record_started(record, position, pending.len());

                let Some(probe) = self.probe(record, &mut boundary, cancel).await else {
                    debug!(record_id = %record.id, "cancelled mid-record; left pending");
                    break;
                };
                let outcome = self.finish(record, &probe);
                let entry = store.append(&record.id, &outcome, probe.attempts).await?;

                debug!(
                    record_id = %record.id,
                    status = outcome.status.as_str(),
                    confidence = outcome.confidence,
                    attempts = probe.attempts,
                    "record stored"
                );
                observer.record_finished(record, &entry);
                state.insert(record.id.clone(), entry);
                totals.queried += 1;
            }

            if cancel.is_cancelled() {
                break;
            }
            observer.batch_finished(batch_index + 1, batches, state);
        }
        Ok(())
    }

    /// Query every source for one record. Returns `None` if cancelled.
    async fn probe(
        &mut self,
        record: &PersonRecord,
        boundary: &mut Boundary,
        cancel: &CancellationToken,
    ) -> Option<RecordProbe> {
        let queries = SearchQuery::variations(record, &self.config.query_variations);
        let mut probe = RecordProbe {
            candidates: Vec::new(),
            attempts: 0,
            last_failure: None,
        };
        if queries.is_empty() {
            debug!(record_id = %record.id, "no searchable name; skipping queries");
            return Some(probe);
        }

        'sources: for source in self.sources.iter_mut() {
            let source_name = source.name().to_string();

            for query in &queries {
                let mut attempt = 0u32;
                loop {
                    if !self.pacer.pace(*boundary, cancel).await {
                        return None;
                    }
                    *boundary = Boundary::Query;
                    attempt += 1;
                    probe.attempts += 1;

                    let err = match source.search(query).await {
                        Ok(found) => {
                            debug!(
                                record_id = %record.id,
                                source = %source_name,
                                variation = query.variation.as_str(),
                                candidates = found.len(),
                                "query answered"
                            );
                            probe.candidates.extend(found.into_iter().map(|mut c| {
                                if c.source.is_empty() {
                                    c.source = source_name.clone();
                                }
                                c.variation.get_or_insert(query.variation);
                                c
                            }));
                            break;
                        }
                        Err(err) => err,
                    };

                    let kind = err.kind();
                    match self.retry.decide(kind, attempt) {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(
                                record_id = %record.id,
                                source = %source_name,
                                variation = query.variation.as_str(),
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "query failed, retrying"
                            );
                            if !sleep_or_cancel(delay, cancel).await {
                                return None;
                            }
                        }
                        RetryDecision::GiveUp => {
                            if kind == ErrorKind::Structural {
                                error!(
                                    record_id = %record.id,
                                    source = %source_name,
                                    variation = query.variation.as_str(),
                                    error = %err.message(),
                                    "unexpected page structure"
                                );
                            } else {
                                warn!(
                                    record_id = %record.id,
                                    source = %source_name,
                                    variation = query.variation.as_str(),
                                    attempt,
                                    error = %err,
                                    "giving up on query"
                                );
                            }
                            probe.last_failure = Some((kind, err.message().to_string()));
                            if matches!(kind, ErrorKind::AccessDenied | ErrorKind::Structural) {
                                continue 'sources;
                            }
                            break;
                        }
                    }
                }

                if self.config.stop_on_confident_match
                    && self
                        .merger
                        .best_confidence(record, &probe.candidates)
                        .is_some_and(|c| c >= self.merger.threshold())
                {
                    break 'sources;
                }
            }
        }

        Some(probe)
    }

    /// Turn a probe into the record's terminal outcome.
    ///
    /// Candidates are always merged. Without candidates, a failed query makes
    /// the outcome `access_denied`/`error`; otherwise it is `no_match`.
    fn finish(&self, record: &PersonRecord, probe: &RecordProbe) -> EnrichmentOutcome {
        if !probe.candidates.is_empty() {
            return self.merger.merge(record, &probe.candidates);
        }
        match &probe.last_failure {
            Some((kind, message)) => EnrichmentOutcome::failed(*kind, message.clone()),
            None => EnrichmentOutcome::no_match(),
        }
    }

    /// Open every session. On failure the ones already opened stay open for
    /// [`Self::close_sessions`].
    async fn open_sessions(&mut self) -> Result<()> {
        for source in self.sources.iter_mut() {
            source.open().await.map_err(|e| {
                error!(source = %source.name(), error = %e, "failed to open source session");
                LeadScoutError::from(e)
            })?;
            debug!(source = %source.name(), "source session opened");
        }
        Ok(())
    }

    async fn close_sessions(&mut self) {
        for source in self.sources.iter_mut() {
            if let Err(e) = source.close().await {
                warn!(source = %source.name(), error = %e, "failed to close source session");
            }
        }
    }
}

fn matches_lead_type(lead_type: LeadType, kind: EntityKind) -> bool {
    match lead_type {
        LeadType::Individual => kind == EntityKind::Individual,
        LeadType::Business => kind == EntityKind::Business,
        LeadType::Mixed => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use leadscout_shared::{
        Address, AppConfig, PersonId, PersonName, QueryVariation, Role,
    };
    use leadscout_sources::SourceError;
    use leadscout_storage::PROGRESS_DB_FILE;

    type Reply = std::result::Result<Vec<SearchResult>, SourceError>;

    /// Replays scripted replies per person id. Unscripted queries find nobody.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedSource {
        replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
        /// Repeated forever once the scripted replies run out.
        sticky: Arc<Mutex<HashMap<String, Reply>>>,
        pub(crate) queries: Arc<Mutex<Vec<(String, QueryVariation)>>>,
        pub(crate) opened: Arc<AtomicUsize>,
        pub(crate) closed: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        pub(crate) fn reply(&self, id: &str, reply: Reply) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub(crate) fn always(&self, id: &str, reply: Reply) -> &Self {
            self.sticky.lock().unwrap().insert(id.to_string(), reply);
            self
        }

        pub(crate) fn queried_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> =
                self.queries.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
            ids.dedup();
            ids
        }

        pub(crate) fn query_count(&self, id: &str) -> usize {
            self.queries.lock().unwrap().iter().filter(|(q, _)| q == id).count()
        }

        pub(crate) fn boxed(&self) -> Vec<Box<dyn PersonSearchSource>> {
            vec![Box::new(self.clone())]
        }
    }

    #[async_trait]
    impl PersonSearchSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn open(&mut self) -> std::result::Result<(), SourceError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn search(&mut self, query: &SearchQuery) -> Reply {
            let id = query.person_id.to_string();
            self.queries.lock().unwrap().push((id.clone(), query.variation));
            if let Some(reply) = self.replies.lock().unwrap().get_mut(&id).and_then(VecDeque::pop_front) {
                return reply;
            }
            self.sticky.lock().unwrap().get(&id).cloned().unwrap_or(Ok(Vec::new()))
        }

        async fn close(&mut self) -> std::result::Result<(), SourceError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Cancels the token after `after` records finish.
    struct CancelAfter {
        after: usize,
        finished: AtomicUsize,
        cancel: CancellationToken,
    }

    impl EnrichmentObserver for CancelAfter {
        fn run_started(&self, _pending: usize, _resumed: usize) {}
        fn record_started(&self, _record: &PersonRecord, _position: usize, _pending: usize) {}
        fn record_finished(&self, _record: &PersonRecord, _entry: &RunEntry) {
            if self.finished.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.cancel.cancel();
            }
        }
        fn batch_finished(&self, _batch: usize, _batches: usize, _state: &EnrichmentRunState) {}
    }

    pub(crate) fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("leadscout-core-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn test_config() -> RunConfig {
        let mut config = RunConfig::from(&AppConfig::default());
        config.min_delay = 0.0;
        config.max_delay = 0.0;
        config.backoff_base = 0.0;
        config.backoff_max = 0.0;
        config.batch_size = 2;
        config.seed = Some(1);
        config
    }

    pub(crate) fn person(row: usize, first: &str, last: &str) -> PersonRecord {
        PersonRecord {
            id: PersonId::new(Role::Borrower, row),
            role: Role::Borrower,
            kind: EntityKind::Individual,
            name: PersonName {
                full: format!("{first} {last}"),
                first: Some(first.into()),
                middle: None,
                last: Some(last.into()),
            },
            address: Address {
                street: Some(format!("{row} Main St")),
                city: Some("Springfield".into()),
                state: Some("IL".into()),
                zip: Some("62701".into()),
            },
            columns: vec![("Owner Name(s) Formatted".into(), format!("{first} {last}"))],
        }
    }

    pub(crate) fn match_for(record: &PersonRecord, certainty: f64) -> SearchResult {
        SearchResult {
            name: record.name.full.clone(),
            current_address: Some(record.address.one_line()),
            phones: vec!["217-555-0100".into()],
            certainty: Some(certainty),
            ..SearchResult::default()
        }
    }

    pub(crate) fn three_records() -> Vec<PersonRecord> {
        vec![
            person(1, "John", "Smith"),
            person(2, "Mary", "Jones"),
            person(3, "Ann", "Lee"),
        ]
    }

    /// Record 1 matches, record 2 finds nobody, record 3 is always denied.
    pub(crate) fn scripted_for(records: &[PersonRecord]) -> ScriptedSource {
        let source = ScriptedSource::default();
        source.reply(records[0].id.as_str(), Ok(vec![match_for(&records[0], 0.9)]));
        source.always(
            records[2].id.as_str(),
            Err(SourceError::AccessDenied("HTTP 429".into())),
        );
        source
    }

    async fn store_in(dir: &std::path::Path) -> Storage {
        Storage::open(&dir.join(PROGRESS_DB_FILE)).await.unwrap()
    }

    #[tokio::test]
    async fn three_records_end_to_end() {
        let dir = temp_dir();
        let store = store_in(&dir).await;
        let records = three_records();
        let source = scripted_for(&records);

        let mut orch = EnrichmentOrchestrator::new(test_config(), source.boxed()).unwrap();
        let report = orch
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        let s = &report.summary;
        assert_eq!(s.count(OutcomeStatus::Matched), 1);
        assert_eq!(s.count(OutcomeStatus::NoMatch), 1);
        assert_eq!(s.count(OutcomeStatus::AccessDenied), 1);
        assert_eq!(s.total_records, 3);
        assert!(!s.cancelled);
        assert_eq!(store.entry_count().await.unwrap(), 3);

        // Denied: one query, max_retries more, then the source is skipped.
        let denied = report.state.get(&records[2].id).unwrap();
        assert_eq!(denied.attempts, 4);
        assert_eq!(source.query_count(records[2].id.as_str()), 4);
        assert_eq!(denied.outcome.last_error, Some(ErrorKind::AccessDenied));
        assert_eq!(s.unresolved.len(), 1);

        // A confident first variation stops further queries.
        assert_eq!(source.query_count(records[0].id.as_str()), 1);
        // No match tries every variation.
        assert_eq!(source.query_count(records[1].id.as_str()), 3);

        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cancelled_run_resumes_with_remaining_record() {
        let dir = temp_dir();
        let records = three_records();

        {
            let store = store_in(&dir).await;
            let source = scripted_for(&records);
            let cancel = CancellationToken::new();
            let observer = CancelAfter {
                after: 2,
                finished: AtomicUsize::new(0),
                cancel: cancel.clone(),
            };
            let mut orch = EnrichmentOrchestrator::new(test_config(), source.boxed()).unwrap();
            let report = orch.run(&records, &store, &observer, &cancel).await.unwrap();

            assert!(report.summary.cancelled);
            assert_eq!(report.summary.pending_records, 1);
            assert_eq!(source.queried_ids(), vec!["borrower-000001", "borrower-000002"]);
            assert_eq!(source.closed.load(Ordering::SeqCst), 1);
        }

        let store = store_in(&dir).await;
        let source = scripted_for(&records);
        let mut orch = EnrichmentOrchestrator::new(test_config(), source.boxed()).unwrap();
        let report = orch
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.queried_ids(), vec!["borrower-000003"]);
        assert_eq!(report.totals.resumed, 2);
        assert_eq!(report.totals.queried, 1);
        assert_eq!(report.summary.total_records, 3);
        assert_eq!(store.entry_count().await.unwrap(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rerun_over_finished_store_queries_nothing() {
        let dir = temp_dir();
        let store = store_in(&dir).await;
        let records = three_records();

        let first = scripted_for(&records);
        EnrichmentOrchestrator::new(test_config(), first.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        let second = scripted_for(&records);
        let report = EnrichmentOrchestrator::new(test_config(), second.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        assert!(second.queries.lock().unwrap().is_empty());
        assert_eq!(second.opened.load(Ordering::SeqCst), 0);
        assert_eq!(report.totals.resumed, 3);
        assert_eq!(report.summary.count(OutcomeStatus::Matched), 1);
        assert_eq!(store.entry_count().await.unwrap(), 3);

        // Opting in re-queues the denied record only.
        let third = scripted_for(&records);
        let mut config = test_config();
        config.requeue_unresolved = true;
        EnrichmentOrchestrator::new(config, third.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(third.queried_ids(), vec!["borrower-000003"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn structural_error_is_terminal_without_retry() {
        let dir = temp_dir();
        let store = store_in(&dir).await;
        let records = vec![person(1, "John", "Smith")];
        let source = ScriptedSource::default();
        source.always(
            "borrower-000001",
            Err(SourceError::Structural("missing age header".into())),
        );

        let report = EnrichmentOrchestrator::new(test_config(), source.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        let entry = report.state.get(&records[0].id).unwrap();
        assert_eq!(entry.outcome.status, OutcomeStatus::Error);
        assert_eq!(entry.outcome.last_error, Some(ErrorKind::Structural));
        assert_eq!(entry.attempts, 1);
        assert_eq!(source.query_count("borrower-000001"), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn transient_errors_retry_then_succeed() {
        let dir = temp_dir();
        let store = store_in(&dir).await;
        let records = vec![person(1, "John", "Smith")];
        let source = ScriptedSource::default();
        source
            .reply("borrower-000001", Err(SourceError::Timeout("30s".into())))
            .reply("borrower-000001", Err(SourceError::Network("reset".into())))
            .reply("borrower-000001", Ok(vec![match_for(&records[0], 0.9)]));

        let report = EnrichmentOrchestrator::new(test_config(), source.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        let entry = report.state.get(&records[0].id).unwrap();
        assert_eq!(entry.outcome.status, OutcomeStatus::Matched);
        assert_eq!(entry.attempts, 3);
        assert_eq!(entry.outcome.source.as_deref(), Some("scripted"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn lead_type_and_max_leads_limit_scope() {
        let dir = temp_dir();
        let store = store_in(&dir).await;
        let mut records = three_records();
        records[0].kind = EntityKind::Business;
        let source = ScriptedSource::default();

        let mut config = test_config();
        config.max_leads = 1;
        let report = EnrichmentOrchestrator::new(config, source.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.queried_ids(), vec!["borrower-000002"]);
        assert_eq!(report.summary.total_records, 1);
        assert_eq!(report.summary.pending_records, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn storage_failure_aborts_after_closing_sessions() {
        let dir = temp_dir();
        let path = dir.join(PROGRESS_DB_FILE);
        drop(Storage::open(&path).await.unwrap());
        let store = Storage::open_readonly(&path).await.unwrap();

        let records = three_records();
        let source = scripted_for(&records);
        let err = EnrichmentOrchestrator::new(test_config(), source.boxed())
            .unwrap()
            .run(&records, &store, &SilentObserver, &CancellationToken::new())
            .await
            .err()
            .expect("append must fail");

        assert!(matches!(err, LeadScoutError::Storage(_)));
        assert!(err.is_fatal_to_run());
        assert_eq!(source.queried_ids(), vec!["borrower-000001"]);
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = test_config();
        config.min_delay = 5.0;
        config.max_delay = 1.0;
        let err = EnrichmentOrchestrator::new(config, ScriptedSource::default().boxed())
            .err()
            .expect("invalid bounds");
        assert!(err.to_string().contains("must not exceed max_delay"));
    }
}
