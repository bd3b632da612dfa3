//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use leadscout_core::{EnrichmentObserver, JobConfig, prepare_job, run_job, summarize_store};
use leadscout_prepare::FarmReportPreparer;
use leadscout_shared::{
    AppConfig, EnrichmentRunState, LeadType, OutcomeStatus, PersonRecord, RunConfig, RunEntry,
    RunSummary, init_config, load_config, load_config_from,
};
use leadscout_sources::SourceRegistry;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadScout: enrich farm report leads with contact details.
#[derive(Parser)]
#[command(
    name = "leadscout",
    version,
    about = "Enrich borrower and lender leads from a farm report with people-search contact data.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Prepare and enrich a farm report, resuming any earlier run in the output directory.
    Enrich {
        /// Farm report (.csv, .xlsx or .xls).
        input: PathBuf,

        /// Output directory (defaults to `[output] dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Config file to use instead of ~/.leadscout/leadscout.toml.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Which owners to enrich: Individual, Business or Mixed.
        #[arg(long)]
        lead_type: Option<LeadType>,

        /// Maximum records to query in this run.
        #[arg(long)]
        max_leads: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Query records whose stored outcome is access_denied or error again.
        #[arg(long)]
        requeue_unresolved: bool,

        /// Seed for the delay jitter.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Clean and split a farm report into borrower and lender CSVs without querying.
    Prepare {
        /// Farm report (.csv, .xlsx or .xls).
        input: PathBuf,

        /// Output directory (defaults to `[output] dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Config file to use instead of ~/.leadscout/leadscout.toml.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Summarize the progress store of an earlier run.
    Summary {
        /// Output directory holding progress.db (defaults to `[output] dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,

        /// Config file to use instead of ~/.leadscout/leadscout.toml.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadscout=info",
        1 => "leadscout=debug",
        _ => "leadscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Enrich {
            input,
            out,
            config,
            lead_type,
            max_leads,
            batch_size,
            requeue_unresolved,
            seed,
        } => {
            let overrides = RunOverrides {
                lead_type,
                max_leads,
                batch_size,
                requeue_unresolved,
                seed,
            };
            cmd_enrich(&input, out, config.as_deref(), overrides).await
        }
        Command::Prepare { input, out, config } => {
            cmd_prepare(&input, out, config.as_deref()).await
        }
        Command::Summary { out, json, config } => {
            cmd_summary(out, json, config.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(force).await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Flags that override `[enrichment]` values.
struct RunOverrides {
    lead_type: Option<LeadType>,
    max_leads: Option<usize>,
    batch_size: Option<usize>,
    requeue_unresolved: bool,
    seed: Option<u64>,
}

impl RunOverrides {
    fn apply(self, run: &mut RunConfig) {
        if let Some(v) = self.lead_type {
            run.lead_type = v;
        }
        if let Some(v) = self.max_leads {
            run.max_leads = v;
        }
        if let Some(v) = self.batch_size {
            run.batch_size = v;
        }
        if self.seed.is_some() {
            run.seed = self.seed;
        }
        run.requeue_unresolved = self.requeue_unresolved;
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

fn output_dir(out: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    out.unwrap_or_else(|| PathBuf::from(&config.output.dir))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(
    input: &Path,
    out: Option<PathBuf>,
    config_path: Option<&Path>,
    overrides: RunOverrides,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let mut run = RunConfig::from(&config);
    overrides.apply(&mut run);
    run.validate()?;

    let sources = SourceRegistry::from_settings(&run.sources)?;
    info!(
        input = %input.display(),
        sources = ?sources.names(),
        lead_type = ?run.lead_type,
        max_leads = run.max_leads,
        "starting enrichment"
    );

    let job = JobConfig {
        input: input.to_path_buf(),
        output_dir: output_dir(out, &config),
        run,
        save_every: config.output.save_every,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current record");
            on_interrupt.cancel();
        }
    });

    let progress = CliProgress::new();
    let result = run_job(
        &job,
        &FarmReportPreparer::new(),
        sources.into_sources(),
        &progress,
        &cancel,
    )
    .await;
    progress.finish();
    let result = result?;

    print_summary(&result.report.summary);
    println!("  Borrowers: {}", result.borrowers_csv.display());
    println!("  Lenders:   {}", result.lenders_csv.display());
    println!("  Summary:   {}", result.summary_path.display());
    if result.report.summary.cancelled {
        println!();
        println!("  Run interrupted. Re-run the same command to resume.");
    }
    println!();

    Ok(())
}

async fn cmd_prepare(
    input: &Path,
    out: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let dir = output_dir(out, &resolve_config(config_path)?);
    let result = prepare_job(input, &dir, &FarmReportPreparer::new())?;

    println!();
    println!("  Records prepared");
    println!("  Rows read:          {}", result.stats.rows_read);
    println!("  Borrowers:          {}", result.borrowers);
    println!("  Lenders:            {}", result.lenders);
    println!("  Duplicate owners:   {}", result.stats.duplicate_owners);
    println!("  Skipped rows:       {}", result.stats.skipped_rows);
    println!("  {}", result.borrowers_csv.display());
    println!("  {}", result.lenders_csv.display());
    println!();
    Ok(())
}

async fn cmd_summary(
    out: Option<PathBuf>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let dir = output_dir(out, &resolve_config(config_path)?);
    let summary = summarize_store(&dir)
        .await
        .map_err(|e| eyre!("cannot summarize '{}': {e}", dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        println!();
    }
    Ok(())
}

async fn cmd_config_init(force: bool) -> Result<()> {
    let path = leadscout_shared::config_file_path()?;
    if path.exists() && !force {
        return Err(eyre!(
            "config already exists at '{}'; pass --force to overwrite",
            path.display()
        ));
    }
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Enrichment summary");
    println!("  Records:     {}", summary.total_records);
    for status in OutcomeStatus::ALL {
        println!("    {:<14}{}", status.as_str(), summary.count(status));
    }
    if summary.pending_records > 0 {
        println!("    {:<14}{}", "pending", summary.pending_records);
    }
    println!("  Match rate:  {:.1}%", summary.match_rate);
    let f = &summary.fill_rates;
    println!(
        "  Fill rates:  phones {:.1}%, emails {:.1}%, age {:.1}%, relatives {:.1}%, addresses {:.1}%",
        f.phones, f.emails, f.age, f.relatives, f.address_history
    );
    if summary.queried_this_run > 0 || summary.resumed > 0 {
        println!(
            "  This run:    {} queried, {} resumed",
            summary.queried_this_run, summary.resumed
        );
    }
    if summary.elapsed_secs > 0.0 {
        println!("  Time:        {:.1}s", summary.elapsed_secs);
    }
    for u in &summary.unresolved {
        println!(
            "  ! {} {}{}",
            u.id,
            u.status.as_str(),
            u.message
                .as_deref()
                .map(|m| format!(" ({m})"))
                .unwrap_or_default()
        );
    }
}

// ---------------------------------------------------------------------------
// CLI progress observer
// ---------------------------------------------------------------------------

/// Progress bar over the records queried in this run.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{pos}/{len}] {wide_msg} {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]);
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl EnrichmentObserver for CliProgress {
    fn run_started(&self, pending: usize, resumed: usize) {
        self.bar.set_length(pending as u64);
        if resumed > 0 {
            self.bar
                .println(format!("  Resuming: {resumed} records already have outcomes"));
        }
    }

    fn record_started(&self, record: &PersonRecord, _position: usize, _pending: usize) {
        self.bar.set_message(format!("{} {}", record.id, record.name.full));
    }

    fn record_finished(&self, _record: &PersonRecord, _entry: &RunEntry) {
        self.bar.inc(1);
    }

    fn batch_finished(&self, batch: usize, batches: usize, _state: &EnrichmentRunState) {
        self.bar.set_message(format!("batch {batch}/{batches} done"));
    }
}
