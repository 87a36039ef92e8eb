use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::bounded;
use log::{info, warn};

use rkconv::config::{default_config_path, load_or_init_config};
use rkconv::db::{job_repo, Database};
use rkconv::logging::init_logging;
use rkconv::notify::{CallbackNotifier, HttpCallbackNotifier};
use rkconv::{CommandExecutor, ConversionExecutor, JobStatus, Scheduler, SchedulerOptions};

const CONFIG_ENV: &str = "RKCONV_CONFIG";

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

fn log_journal_totals(journal: &Database) {
    let mut totals = Vec::new();
    for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
        match job_repo::count_by_status(journal, status) {
            Ok(count) => totals.push(format!("{} {}", count, status.as_str())),
            Err(e) => {
                warn!("Cannot count journaled jobs: {}", e);
                return;
            }
        }
    }
    info!("Journal holds {}", totals.join(", "));
}

fn run() -> Result<(), Box<dyn Error>> {
    let path = config_path();
    let config = load_or_init_config(&path)?;
    init_logging(&config.logging)?;

    info!("Starting rkconv-daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Using config {}", path.display());

    for dir in [&config.upload_directory, &config.temp_directory] {
        std::fs::create_dir_all(dir).map_err(|e| rkconv::RkconvError::Io {
            path: dir.clone(),
            source: e,
        })?;
    }

    let executor: Arc<dyn ConversionExecutor> =
        Arc::new(CommandExecutor::from_service_config(&config)?);

    let mut options = SchedulerOptions::from_config(&config);
    if let Some(db_path) = &config.database_path {
        let journal = Database::open(db_path)?;
        log_journal_totals(&journal);
        info!("Job journal at {}", db_path.display());
        options = options.with_journal(journal);
    }
    match HttpCallbackNotifier::new(HttpCallbackNotifier::DEFAULT_TIMEOUT) {
        Ok(notifier) => {
            let notifier: Arc<dyn CallbackNotifier> = Arc::new(notifier);
            options = options.with_notifier(notifier);
        }
        Err(e) => warn!("Completion callbacks disabled: {}", e),
    }

    let scheduler = Scheduler::new(executor, options);
    scheduler.start(&config.output_directory)?;
    info!(
        "Serving {} historical job(s) from {}",
        scheduler.stats().historical,
        config.output_directory.display()
    );

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    info!("Waiting for jobs, press Ctrl-C to stop");
    let _ = shutdown_rx.recv();

    info!("Shutdown requested, draining with policy {:?}", config.drain.policy);
    scheduler.stop();
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("rkconv-daemon: {}", e);
        std::process::exit(1);
    }
}
