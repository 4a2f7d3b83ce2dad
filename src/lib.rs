//! queuedupe - deduplicating upload queue
//!
//! Files dropped onto an [`UploadQueue`](queue::UploadQueue) are classified
//! as `ready`, `copy`, or `duplicate` with three layers of increasing cost:
//! a size shortcut, a tenant-scoped metadata digest, and a content digest.
//! Large drops are painted in two phases, and rows classified without a
//! digest are confirmed afterwards by the [`verify`] module.

pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod queue;
pub mod scanner;
pub mod signal;
pub mod verify;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};

use cli::{Cli, Commands, IngestArgs, OutputFormat, WorkerArgs};
use config::Config;
use error::ExitCode;
use output::{CsvOutput, JsonOutput, TableOutput};
use progress::{Progress, ProgressCallback};
use queue::{QueueError, QueueRow, UploadQueue};
use scanner::worker::{HashWorker, WorkerConfig, WorkerFile, WorkerResponse};
use scanner::{collect_sources, Hasher, SourceRef, WalkerConfig};
use signal::CancelHandler;
use verify::{spawn_auto_verifier, Verifier};

/// Run the application for parsed CLI arguments.
///
/// # Errors
///
/// Returns an error for missing tenant context, unusable paths, or worker
/// failures. Per-file problems are reported through the exit code instead.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let config = Config::load(cli.config.as_deref());
    log::debug!("Effective config: {:?}", config);
    let handler = signal::install_handler().context("Failed to install Ctrl+C handler")?;

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, config, &handler, cli.quiet, cli.no_color),
        Commands::Worker(args) => run_worker(args, &config, &handler, cli.quiet),
    }
}

fn apply_overrides(mut config: Config, args: &IngestArgs) -> Config {
    if let Some(tenant) = &args.tenant {
        config.tenant_id = Some(tenant.clone());
    }
    if let Some(mode) = args.mode {
        config.ingest_mode = mode;
    }
    if let Some(algorithm) = args.algorithm {
        config.hash_algorithm = algorithm;
    }
    if let Some(size) = args.phase1_size {
        config.phase1_size = size;
    }
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if let Some(threads) = args.io_threads {
        config.io_threads = threads;
    }
    config
}

fn collect(
    paths: &[PathBuf],
    walker: &WalkerConfig,
    progress: &dyn ProgressCallback,
) -> Vec<SourceRef> {
    progress.on_phase_start("walking", 0);
    let (sources, errors) = collect_sources(paths, walker);
    progress.on_progress(sources.len(), "");
    progress.on_phase_end("walking");
    for error in &errors {
        log::warn!("{}", error);
    }
    sources
}

fn run_ingest(
    args: IngestArgs,
    config: Config,
    handler: &CancelHandler,
    quiet: bool,
    no_color: bool,
) -> Result<ExitCode> {
    let config = apply_overrides(config, &args);
    let progress: Arc<Progress> = Arc::new(Progress::new(quiet));
    let walker = WalkerConfig {
        follow_symlinks: args.follow_symlinks,
        skip_hidden: args.skip_hidden,
        cancel_flag: Some(handler.cancel_flag()),
    };

    let queue = UploadQueue::new(config.to_queue_config())
        .with_cancel_flag(handler.cancel_flag())
        .with_progress_callback(Arc::clone(&progress) as Arc<dyn ProgressCallback>);
    let context = queue.context();
    let queue = Arc::new(Mutex::new(queue));
    let verifier = Arc::new(Verifier::new().with_removal_animation(config.removal_animation()));

    let stop = Arc::new(AtomicBool::new(false));
    let background = if args.no_verify {
        None
    } else {
        Some(
            spawn_auto_verifier(
                Arc::clone(&queue),
                Arc::clone(&verifier),
                context,
                config.verify_poll_interval(),
                config.verify_debounce(),
                Arc::clone(&stop),
            )
            .context("Failed to start the verifier thread")?,
        )
    };

    // Each root is its own drop, so the verifier can run between them.
    for root in &args.paths {
        if handler.was_interrupted() {
            break;
        }
        let sources = collect(std::slice::from_ref(root), &walker, progress.as_ref());
        log::info!("Collected {} files from {}", sources.len(), root.display());

        let result = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_files_to_queue(sources);
        if let Err(QueueError::MissingTenant) = result {
            stop.store(true, Ordering::SeqCst);
            return Err(QueueError::MissingTenant)
                .context("Set --tenant or QUEUEDUPE_TENANT_ID before queueing files");
        }
    }

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = background {
        if handle.join().is_err() {
            log::error!("Verifier thread panicked");
        }
    }

    let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
    if !args.no_verify && !handler.was_interrupted() {
        verifier.run(&mut queue);
    }
    let verification = verifier.totals();

    if args.hide_duplicates && !queue.duplicates_hidden() {
        queue.toggle_duplicates_visibility();
    }

    let mut exit_code = ExitCode::from_progress(queue.progress());
    if handler.was_interrupted() {
        exit_code = ExitCode::Interrupted;
    }

    let rows: Vec<&QueueRow> = queue.visible_rows();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Table => TableOutput::new(&rows, queue.progress())
            .with_verification(verification.as_ref())
            .with_color(!no_color)
            .write_to(&mut out)
            .context("Failed to write table")?,
        OutputFormat::Json => JsonOutput::new(&rows, queue.progress(), verification.as_ref(), exit_code)
            .write_to(&mut out, true)
            .context("Failed to write JSON")?,
        OutputFormat::Csv => CsvOutput::new(&rows)
            .write_to(&mut out)
            .context("Failed to write CSV")?,
    }

    Ok(exit_code)
}

fn run_worker(
    args: WorkerArgs,
    config: &Config,
    handler: &CancelHandler,
    quiet: bool,
) -> Result<ExitCode> {
    let algorithm = args.algorithm.unwrap_or(config.hash_algorithm);
    let worker = HashWorker::spawn(WorkerConfig {
        hasher: Hasher::with_algorithm(algorithm),
        io_threads: config.io_threads.max(1),
        progress_throttle: config.progress_throttle(),
    })?;

    let render = |response: &WorkerResponse| -> Result<()> {
        let json = if args.compact {
            serde_json::to_string(response)?
        } else {
            serde_json::to_string_pretty(response)?
        };
        println!("{json}");
        Ok(())
    };

    if args.health_check {
        let response = worker.health_check("health-1", Duration::from_secs(5))?;
        render(&response)?;
        worker.shutdown();
        return Ok(ExitCode::Success);
    }

    let progress = Progress::new(quiet);
    let walker = WalkerConfig {
        cancel_flag: Some(handler.cancel_flag()),
        ..WalkerConfig::default()
    };
    let sources = collect(&args.paths, &walker, &progress);
    let files: Vec<WorkerFile> = sources
        .into_iter()
        .enumerate()
        .map(|(index, source)| WorkerFile::new(format!("file-{index}"), source, index))
        .collect();

    progress.on_phase_start("bulk", files.len());
    let response = worker.process_files(files, "batch-1", |p| progress.on_progress(p.current, ""))?;
    progress.on_phase_end("bulk");
    render(&response)?;
    worker.shutdown();

    Ok(match &response {
        WorkerResponse::ProcessingComplete { result, .. } => {
            if !result.read_error_files.is_empty() {
                ExitCode::PartialSuccess
            } else if result.ready_files.is_empty() {
                ExitCode::NothingToUpload
            } else {
                ExitCode::Success
            }
        }
        _ => ExitCode::GeneralError,
    })
}
