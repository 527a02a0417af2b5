//! cdp-crawler - Concurrent CDP Network Topology Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use cdp_crawler::config::{CliArgs, Command, CrawlConfig};
use cdp_crawler::crawler::{CrawlEngine, ShutdownReason};
use cdp_crawler::db::{Repository, SqliteRepository};
use cdp_crawler::device::SshDeviceClient;
use cdp_crawler::parser::CiscoParser;
use cdp_crawler::progress::{print_header, print_status, print_summary, ProgressReporter};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for a crawl stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    match args.command {
        Command::Crawl(crawl_args) => {
            let config = CrawlConfig::from_args(crawl_args, args.quiet, args.verbose)
                .context("Invalid configuration")?;
            run_crawl(config)
        }
        Command::Status { database } => {
            run_status(&database)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Export { database, output } => {
            run_export(&database, &output, args.quiet)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_crawl(config: CrawlConfig) -> Result<ExitCode> {
    let database = config.database_path.display().to_string();
    let output = config.output_path.display().to_string();

    if config.show_progress {
        print_header(&config.seed, config.worker_count, &database, &output);
    }

    let repository = Arc::new(
        SqliteRepository::open(&config.database_path).context("Failed to open database")?,
    );

    let engine = CrawlEngine::new(
        config.engine_options(),
        Arc::new(SshDeviceClient::new().retries(config.retries)),
        Arc::new(CiscoParser::new()),
        Arc::clone(&repository) as Arc<dyn Repository>,
    );

    // Setup signal handler for graceful shutdown; a second interrupt exits
    let shutdown = engine.shutdown_handle();
    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("\nSecond interrupt, exiting immediately");
            std::process::exit(EXIT_INTERRUPTED as i32);
        }
        eprintln!("\nInterrupt received, finishing in-flight devices...");
        shutdown.request_shutdown(ShutdownReason::Interrupted);
    })
    .context("Failed to set signal handler")?;

    if let Err(e) = repository.record_crawl_start(&config.seed, config.worker_count) {
        warn!(error = %e, "Failed to record crawl start");
    }

    // Create progress reporter
    let progress = config.show_progress.then(ProgressReporter::new);
    let ticker = progress.as_ref().and_then(|p| {
        p.set_status("Connecting to seed device...");
        p.spawn_ticker(engine.progress_handle(), Duration::from_millis(250))
    });

    // Run the crawl
    let result = engine.run(config.seed_visit());

    if let Some(ref p) = progress {
        match &result {
            Ok(summary) if summary.completed => p.finish("Crawl completed"),
            Ok(_) => p.finish("Crawl interrupted"),
            Err(_) => p.finish_and_clear(),
        }
    }
    if let Some(ticker) = ticker {
        if ticker.join().is_err() {
            warn!("Progress ticker thread panicked");
        }
    }

    let summary = result.context("Crawl failed")?;

    if let Err(e) = repository.record_crawl_end(&summary) {
        warn!(error = %e, "Failed to record crawl end");
    }

    let rows = repository
        .export_to(&config.output_path)
        .with_context(|| format!("Failed to export CSV to {}", output))?;
    info!(rows, path = %output, "CSV export written");

    if config.show_progress {
        print_summary(&summary, &database, Some(&output));
    }

    if !summary.completed {
        info!(reason = %summary.reason, "Crawl was stopped before completion");
    }
    if summary.failed_count > 0 {
        info!(failed = summary.failed_count, "Crawl completed with failures");
    }

    Ok(match summary.reason {
        ShutdownReason::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        _ => ExitCode::SUCCESS,
    })
}

fn run_status(database: &Path) -> Result<()> {
    let repository = SqliteRepository::open_existing(database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;

    let info = repository.info().context("Failed to read crawl metadata")?;
    let devices = repository.list_all().context("Failed to read devices")?;

    print_status(&database.display().to_string(), &info, &devices);
    Ok(())
}

fn run_export(database: &Path, output: &Path, quiet: bool) -> Result<()> {
    let repository = SqliteRepository::open_existing(database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;

    let rows = repository
        .export_to(output)
        .with_context(|| format!("Failed to export CSV to {}", output.display()))?;

    if !quiet {
        println!("Exported {} devices to {}", rows, output.display());
    }
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "cdp_crawler=debug,warn"
    } else {
        "cdp_crawler=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
