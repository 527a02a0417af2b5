//! Progress reporting for the crawler
//!
//! Provides real-time progress display using indicatif spinners and
//! console-styled summaries.

use crate::crawler::{CrawlProgress, CrawlSummary, ProgressHandle};
use crate::device::DeviceRecord;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Progress reporter that displays crawl status
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,

    /// Stop signal for the ticker thread
    stop: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Update the progress display
    pub fn update(&self, progress: &CrawlProgress) {
        self.bar.set_message(progress_message(progress));
    }

    /// Refresh from `handle` every `interval` until finished
    pub fn spawn_ticker(&self, handle: ProgressHandle, interval: Duration) -> Option<JoinHandle<()>> {
        let reporter = self.clone();
        thread::Builder::new()
            .name("progress".into())
            .spawn(move || {
                while !reporter.stop.load(Ordering::SeqCst) {
                    reporter.update(&handle.snapshot());
                    thread::sleep(interval);
                }
            })
            .ok()
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.stop.store(true, Ordering::SeqCst);
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &CrawlProgress) -> String {
    format!(
        "Visited: {} | Failed: {} | Dup: {} | Rate: {:.1}/s | Queue: {} | Pending: {} | Workers: {}/{}",
        format_number(progress.visited),
        format_number(progress.failed),
        format_number(progress.duplicates),
        progress.devices_per_second(),
        progress.queued,
        progress.outstanding,
        progress.active_workers,
        progress.total_workers,
    )
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the crawl
pub fn print_header(seed: &str, workers: usize, database: &str, output: &str) {
    println!();
    println!(
        "{} {}",
        style("cdp-crawler").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Seed:").bold(), seed);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Database:").bold(), database);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a summary of the crawl results
pub fn print_summary(summary: &CrawlSummary, database: &str, output: Option<&str>) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.visited_count as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.completed {
        style("Crawl Complete").green().bold()
    } else {
        style("Crawl Stopped").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Devices:").bold(),
        format_number(summary.visited_count)
    );
    if summary.failed_count > 0 {
        println!(
            "  {} {} ({} connection, {} parse)",
            style("Failed:").yellow().bold(),
            format_number(summary.failed_count),
            format_number(summary.connection_failures),
            format_number(summary.parse_failures),
        );
    }
    if summary.partial_count > 0 {
        println!(
            "  {} {}",
            style("No neighbors:").yellow().bold(),
            format_number(summary.partial_count)
        );
    }
    if summary.persist_failures > 0 {
        println!(
            "  {} {}",
            style("Not saved:").red().bold(),
            format_number(summary.persist_failures)
        );
    }
    if summary.skipped > 0 {
        println!("  {} {}", style("Skipped:").bold(), format_number(summary.skipped));
    }
    let queue = &summary.frontier;
    if queue.discarded > 0 || queue.backpressure > 0 || queue.rejected > 0 {
        println!(
            "  {} {} discarded, {} rejected, {} spilled",
            style("Queue:").yellow().bold(),
            format_number(queue.discarded),
            format_number(queue.rejected),
            format_number(queue.backpressure)
        );
    }
    println!(
        "  {} {:.1}s ({:.1} devices/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if !summary.completed {
        println!("  {} {}", style("Stopped:").yellow().bold(), summary.reason);
    }
    if summary.abandoned_workers > 0 {
        println!(
            "  {} {}",
            style("Abandoned workers:").red().bold(),
            summary.abandoned_workers
        );
    }
    println!("  {} {}", style("Database:").bold(), database);
    if let Some(output) = output {
        println!("  {} {}", style("CSV:").bold(), output);
    }
    println!();
}

/// Print crawl metadata and the device table
pub fn print_status(database: &str, info: &[(String, String)], devices: &[DeviceRecord]) {
    println!();
    println!("{}", style("Crawl Status").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Database:").bold(), database);
    println!(
        "  {} {}",
        style("Devices:").bold(),
        format_number(devices.len() as u64)
    );
    for (key, value) in info {
        println!("  {} {}", style(format!("{}:", key)).bold(), value);
    }

    if devices.is_empty() {
        println!();
        return;
    }

    let host_width = column_width(devices.iter().map(|d| d.hostname.as_str()), "Hostname");
    let addr_width = column_width(devices.iter().map(|d| d.address.as_str()), "Address");

    println!();
    println!(
        "  {}  {}  {}  {}",
        style(format!("{:<host_width$}", "Hostname")).cyan().bold(),
        style(format!("{:<addr_width$}", "Address")).green().bold(),
        style(format!("{:<12}", "Type")).yellow().bold(),
        style("Neighbors").bold(),
    );
    for device in devices {
        println!(
            "  {:<host_width$}  {:<addr_width$}  {:<12}  {}",
            device.hostname,
            device.address,
            device.device_type,
            device.neighbors.len(),
        );
    }
    println!();
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values.map(|v| v.chars().count()).max().unwrap_or(0).max(header.len())
}
