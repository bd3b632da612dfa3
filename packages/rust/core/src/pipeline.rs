//! End-to-end jobs: input → prepare → enrich → export.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use leadscout_export::{
    BORROWERS_PREPARED, LENDERS_PREPARED, enriched_file_name, write_enriched_csv,
    write_prepared_csv, write_summary,
};
use leadscout_prepare::{PrepareStats, RecordPreparer};
use leadscout_shared::{
    EnrichmentRunState, LeadScoutError, PersonRecord, Result, Role, RunConfig, RunEntry,
    RunSummary,
};
use leadscout_sources::PersonSearchSource;
use leadscout_storage::{PROGRESS_DB_FILE, Storage};

use crate::orchestrator::{EnrichmentObserver, EnrichmentOrchestrator, RunReport};
use crate::summary::{RunTotals, summarize_state};

/// Configuration for [`run_job`].
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Farm report, CSV or spreadsheet.
    pub input: PathBuf,
    /// Directory for CSVs, the summary and `progress.db`.
    pub output_dir: PathBuf,
    pub run: RunConfig,
    /// Rewrite the enriched CSVs every N finished batches.
    pub save_every: usize,
}

/// Result of [`run_job`].
#[derive(Debug)]
pub struct JobResult {
    pub report: RunReport,
    pub prepare_stats: PrepareStats,
    pub borrowers_csv: PathBuf,
    pub lenders_csv: PathBuf,
    pub summary_path: PathBuf,
}

/// Result of [`prepare_job`].
#[derive(Debug)]
pub struct PrepareResult {
    pub borrowers: usize,
    pub lenders: usize,
    pub stats: PrepareStats,
    pub borrowers_csv: PathBuf,
    pub lenders_csv: PathBuf,
}

/// Run a full enrichment job.
///
/// 1. Prepare records from the input
/// 2. Open the progress store in the output directory
/// 3. Enrich borrowers, then lenders
/// 4. Write per-role enriched CSVs (periodically and at the end)
/// 5. Write the run summary with the effective config
#[instrument(skip_all, fields(input = %config.input.display(), out = %config.output_dir.display()))]
pub async fn run_job(
    config: &JobConfig,
    preparer: &dyn RecordPreparer,
    sources: Vec<Box<dyn PersonSearchSource>>,
    observer: &dyn EnrichmentObserver,
    cancel: &CancellationToken,
) -> Result<JobResult> {
    let mut orchestrator = EnrichmentOrchestrator::new(config.run.clone(), sources)?;

    let prepared = preparer.prepare(&config.input)?;
    if prepared.is_empty() {
        return Err(LeadScoutError::validation(format!(
            "no usable records in {}",
            config.input.display()
        )));
    }
    info!(
        preparer = preparer.name(),
        borrowers = prepared.borrowers.len(),
        lenders = prepared.lenders.len(),
        "records prepared"
    );

    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| LeadScoutError::io(&config.output_dir, e))?;
    let store = Storage::open(&config.output_dir.join(PROGRESS_DB_FILE)).await?;

    let records: Vec<PersonRecord> = prepared
        .borrowers
        .iter()
        .chain(&prepared.lenders)
        .cloned()
        .collect();

    let snapshots = SnapshotObserver {
        inner: observer,
        dir: &config.output_dir,
        borrowers: &prepared.borrowers,
        lenders: &prepared.lenders,
        max_phones: config.run.max_phones,
        save_every: config.save_every.max(1),
    };
    let report = orchestrator
        .run(&records, &store, &snapshots, cancel)
        .await?;

    let (borrowers_csv, lenders_csv) = snapshots.write(&report.state)?;
    let summary_path = write_summary(&config.output_dir, &report.summary, &config.run)?;

    info!(
        summary = %summary_path.display(),
        cancelled = report.summary.cancelled,
        "job finished"
    );

    Ok(JobResult {
        report,
        prepare_stats: prepared.stats,
        borrowers_csv,
        lenders_csv,
        summary_path,
    })
}

/// Prepare the input and write the cleaned per-role CSVs without querying.
#[instrument(skip_all, fields(input = %input.display()))]
pub fn prepare_job(
    input: &Path,
    output_dir: &Path,
    preparer: &dyn RecordPreparer,
) -> Result<PrepareResult> {
    let prepared = preparer.prepare(input)?;
    std::fs::create_dir_all(output_dir).map_err(|e| LeadScoutError::io(output_dir, e))?;

    let borrowers_csv = output_dir.join(BORROWERS_PREPARED);
    let lenders_csv = output_dir.join(LENDERS_PREPARED);
    let borrowers = write_prepared_csv(&borrowers_csv, &prepared.borrowers)?;
    let lenders = write_prepared_csv(&lenders_csv, &prepared.lenders)?;

    Ok(PrepareResult {
        borrowers,
        lenders,
        stats: prepared.stats,
        borrowers_csv,
        lenders_csv,
    })
}

/// Summarize the progress store in `output_dir` without querying anything.
pub async fn summarize_store(output_dir: &Path) -> Result<RunSummary> {
    let store = Storage::open_readonly(&output_dir.join(PROGRESS_DB_FILE)).await?;
    let state = store.load().await?;
    Ok(summarize_state(&state, RunTotals::default()))
}

/// Forwards callbacks and rewrites the enriched CSVs every `save_every` batches.
struct SnapshotObserver<'a> {
    inner: &'a dyn EnrichmentObserver,
    dir: &'a Path,
    borrowers: &'a [PersonRecord],
    lenders: &'a [PersonRecord],
    max_phones: usize,
    save_every: usize,
}

impl SnapshotObserver<'_> {
    fn write(&self, state: &EnrichmentRunState) -> Result<(PathBuf, PathBuf)> {
        let borrowers = self.dir.join(enriched_file_name(Role::Borrower));
        let lenders = self.dir.join(enriched_file_name(Role::Lender));
        write_enriched_csv(&borrowers, self.borrowers, state, self.max_phones)?;
        write_enriched_csv(&lenders, self.lenders, state, self.max_phones)?;
        Ok((borrowers, lenders))
    }
}

impl EnrichmentObserver for SnapshotObserver<'_> {
    fn run_started(&self, pending: usize, resumed: usize) {
        self.inner.run_started(pending, resumed);
    }

    fn record_started(&self, record: &PersonRecord, position: usize, pending: usize) {
        self.inner.record_started(record, position, pending);
    }

    fn record_finished(&self, record: &PersonRecord, entry: &RunEntry) {
        self.inner.record_finished(record, entry);
    }

    fn batch_finished(&self, batch: usize, batches: usize, state: &EnrichmentRunState) {
        if batch % self.save_every == 0 {
            // The final write after the run reports errors; a failed snapshot only warns.
            if let Err(e) = self.write(state) {
                warn!(batch, error = %e, "failed to write enriched snapshot");
            }
        }
        self.inner.batch_finished(batch, batches, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::SilentObserver;
    use crate::orchestrator::tests::{ScriptedSource, temp_dir, test_config};
    use leadscout_export::SummaryDocument;
    use leadscout_prepare::FarmReportPreparer;
    use leadscout_shared::{OutcomeStatus, SearchResult};

    const REPORT: &str = "\
APN,Owner Name(s) Formatted,Owner 1 First Name,Property Address,City,State,ZIP Code,1st Mortgage Lender Name - Originated
100-1,John Smith,John,1 Main St,Springfield,IL,62701,Jane Roe
100-2,Mary Jones,Mary,2 Main St,Springfield,IL,62701,Wells Fargo Bank
100-3,Oak Street Properties LLC,,3 Main St,Springfield,IL,62701,Wells Fargo Bank
";

    fn job(dir: &Path) -> JobConfig {
        let input = dir.join("report.csv");
        std::fs::write(&input, REPORT).unwrap();
        JobConfig {
            input,
            output_dir: dir.join("out"),
            run: test_config(),
            save_every: 1,
        }
    }

    fn john_smith() -> SearchResult {
        SearchResult {
            name: "John Smith".into(),
            current_address: Some("1 Main St, Springfield, IL 62701".into()),
            phones: vec!["217-555-0100".into()],
            age: Some(61),
            certainty: Some(0.9),
            ..SearchResult::default()
        }
    }

    #[tokio::test]
    async fn job_writes_csvs_summary_and_store() {
        let dir = temp_dir();
        let config = job(&dir);
        let source = ScriptedSource::default();
        source.reply("borrower-000001", Ok(vec![john_smith()]));

        let result = run_job(
            &config,
            &FarmReportPreparer::new(),
            source.boxed(),
            &SilentObserver,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // The LLC owner and the bank lender are out of scope for Individual.
        let queried = source.queried_ids();
        assert!(queried.contains(&"borrower-000001".to_string()));
        assert!(queried.contains(&"borrower-000002".to_string()));
        assert!(!queried.contains(&"borrower-000003".to_string()));

        let summary = &result.report.summary;
        assert_eq!(summary.count(OutcomeStatus::Matched), 1);
        assert_eq!(summary.total_records, 3);

        let mut reader = csv::Reader::from_path(&result.borrowers_csv).unwrap();
        let header = reader.headers().unwrap().clone();
        let status = header.iter().position(|h| h == "status").unwrap();
        let statuses: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[status].to_string())
            .collect();
        assert_eq!(statuses, vec!["matched", "no_match", "pending"]);
        assert!(result.lenders_csv.exists());

        let text = std::fs::read_to_string(&result.summary_path).unwrap();
        let doc: SummaryDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(doc.summary.count(OutcomeStatus::Matched), 1);
        assert_eq!(doc.config["batch_size"], 2);

        let stored = summarize_store(&config.output_dir).await.unwrap();
        assert_eq!(stored.total_records, 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unsupported_input_is_rejected() {
        let dir = temp_dir();
        let mut config = job(&dir);
        config.input = dir.join("report.pdf");

        let err = run_job(
            &config,
            &FarmReportPreparer::new(),
            ScriptedSource::default().boxed(),
            &SilentObserver,
            &CancellationToken::new(),
        )
        .await
        .err()
        .expect("pdf must fail");
        assert!(matches!(err, LeadScoutError::Validation { .. }));
        assert!(!config.output_dir.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn prepare_job_writes_role_files() {
        let dir = temp_dir();
        let config = job(&dir);
        std::fs::create_dir_all(&config.output_dir).unwrap();

        let result = prepare_job(&config.input, &config.output_dir, &FarmReportPreparer::new())
            .unwrap();
        assert_eq!(result.borrowers, 3);
        assert_eq!(result.lenders, 2);

        let text = std::fs::read_to_string(&result.borrowers_csv).unwrap();
        assert!(text.starts_with("record_id,kind,full_name"));
        assert!(text.contains("borrower-000003,business,Oak Street Properties LLC"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
