//! Configuration types for cdp-crawler
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime crawl configuration with validation

use crate::crawler::engine::{EngineOptions, DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL};
use crate::device::{Credentials, DeviceTypePolicy, PendingVisit, DEFAULT_DEVICE_TYPE, DEFAULT_SSH_PORT};
use crate::error::ConfigError;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Minimum bounded queue capacity
pub const MIN_QUEUE_CAPACITY: usize = 16;

/// Default database file
pub const DEFAULT_DATABASE: &str = "crawl.db";

/// Default CSV export file
pub const DEFAULT_OUTPUT: &str = "devices.csv";

/// Hostnames, IPv4 and IPv6 literals (optionally bracketed)
static SEED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\[[0-9A-Fa-f:.]+\]|[0-9A-Za-z](?:[0-9A-Za-z._:-]*[0-9A-Za-z.])?)$")
        .expect("Invalid seed regex")
});

/// Concurrent CDP network topology crawler
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cdp-crawler",
    version,
    about = "Concurrent CDP network topology crawler",
    long_about = "Discovers a network by logging into a seed device over SSH, reading its identity \
                  (show version) and CDP neighbors (show cdp neighbors detail), and visiting every \
                  neighbor in turn until no new devices remain.\n\n\
                  Results are stored in SQLite and exported to CSV.",
    after_help = "EXAMPLES:\n    \
        cdp-crawler crawl 10.0.0.1 -u admin -w 16\n    \
        CDP_PASSWORD=secret cdp-crawler crawl core-sw1 -u admin --max-depth 3\n    \
        cdp-crawler crawl 10.0.0.1 -u admin --exclude '^192\\.168\\.' -o inventory.csv\n    \
        cdp-crawler status --database crawl.db\n    \
        cdp-crawler export --database crawl.db -o devices.csv"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Crawl the network starting from a seed device
    Crawl(CrawlArgs),

    /// Show crawl metadata and discovered devices
    Status {
        /// SQLite database path
        #[arg(long, default_value = DEFAULT_DATABASE, value_name = "FILE")]
        database: PathBuf,
    },

    /// Export discovered devices to CSV
    Export {
        /// SQLite database path
        #[arg(long, default_value = DEFAULT_DATABASE, value_name = "FILE")]
        database: PathBuf,

        /// CSV output path
        #[arg(short, long, default_value = DEFAULT_OUTPUT, value_name = "FILE")]
        output: PathBuf,
    },
}

/// Arguments for the crawl subcommand
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Seed device address (IP or hostname)
    #[arg(value_name = "SEED")]
    pub seed: String,

    /// Login user
    #[arg(short = 'u', long, env = "CDP_USERNAME", value_name = "USER")]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "CDP_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// SSH port
    #[arg(long, default_value_t = DEFAULT_SSH_PORT, value_name = "PORT")]
    pub port: u16,

    /// Device type of the seed (and of neighbors unless inferred)
    #[arg(long, default_value = DEFAULT_DEVICE_TYPE, value_name = "TYPE")]
    pub device_type: String,

    /// Infer neighbor device types from their CDP platform
    #[arg(long)]
    pub infer_device_type: bool,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Per-operation timeout in seconds (connect and each command)
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub timeout: u64,

    /// Extra connect attempts for transient failures
    #[arg(long, default_value = "1", value_name = "NUM")]
    pub retries: u32,

    /// How often idle workers re-check for shutdown, in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64, value_name = "MS")]
    pub poll_ms: u64,

    /// How long to wait for workers after shutdown, in seconds
    #[arg(long, default_value_t = DEFAULT_GRACE_PERIOD.as_secs(), value_name = "SECS")]
    pub grace_secs: u64,

    /// Bound the work queue (unbounded if not set)
    #[arg(long, value_name = "NUM")]
    pub queue_capacity: Option<usize>,

    /// Maximum hops from the seed (unlimited if not set)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub max_depth: Option<u32>,

    /// Skip addresses matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// SQLite database path
    #[arg(long, default_value = DEFAULT_DATABASE, value_name = "FILE")]
    pub database: PathBuf,

    /// CSV output path
    #[arg(short, long, default_value = DEFAULT_OUTPUT, value_name = "FILE")]
    pub output: PathBuf,
}

fn default_workers() -> usize {
    // Device sessions are network bound
    (num_cpus::get() * 2).min(MAX_WORKERS)
}

/// Validated runtime configuration for a crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Seed address as given
    pub seed: String,

    /// Credentials shared by every visit
    pub credentials: Credentials,

    /// Device type of the seed
    pub device_type: String,

    /// Neighbor device type assignment
    pub device_type_policy: DeviceTypePolicy,

    pub worker_count: usize,

    /// Per-operation timeout
    pub timeout: Duration,

    /// Connect retries
    pub retries: u32,

    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub queue_capacity: Option<usize>,
    pub max_depth: Option<u32>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    pub database_path: PathBuf,
    pub output_path: PathBuf,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CrawlConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CrawlArgs, quiet: bool, verbose: bool) -> Result<Self, ConfigError> {
        let seed = args.seed.trim().to_string();
        if seed.is_empty() {
            return Err(ConfigError::Missing("seed address"));
        }
        if !SEED_REGEX.is_match(&seed) {
            return Err(ConfigError::InvalidSeed {
                seed,
                reason: "expected an IP address or hostname".into(),
            });
        }

        let username = args
            .username
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::Missing("username (--username or CDP_USERNAME)"))?;
        let password = args
            .password
            .ok_or(ConfigError::Missing("password (--password or CDP_PASSWORD)"))?;

        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate queue capacity
        if let Some(size) = args.queue_capacity {
            if size < MIN_QUEUE_CAPACITY {
                return Err(ConfigError::InvalidQueueCapacity {
                    size,
                    min: MIN_QUEUE_CAPACITY,
                });
            }
        }

        if args.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { secs: args.timeout });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        validate_output_path(&args.database)?;
        validate_output_path(&args.output)?;

        let device_type_policy = if args.infer_device_type {
            DeviceTypePolicy::InferFromPlatform {
                fallback: args.device_type.clone(),
            }
        } else {
            DeviceTypePolicy::Fixed(args.device_type.clone())
        };

        Ok(Self {
            seed,
            credentials: Credentials::new(username, password).with_port(args.port),
            device_type: args.device_type,
            device_type_policy,
            worker_count: args.workers,
            timeout: Duration::from_secs(args.timeout),
            retries: args.retries,
            poll_interval: Duration::from_millis(args.poll_ms.max(1)),
            grace_period: Duration::from_secs(args.grace_secs),
            queue_capacity: args.queue_capacity,
            max_depth: args.max_depth,
            exclude_patterns,
            database_path: args.database,
            output_path: args.output,
            show_progress: !quiet,
            verbose,
        })
    }

    /// Engine options derived from this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            worker_count: self.worker_count,
            op_timeout: self.timeout,
            poll_interval: self.poll_interval,
            grace_period: self.grace_period,
            queue_capacity: self.queue_capacity,
            max_depth: self.max_depth,
            exclude_patterns: self.exclude_patterns.clone(),
            device_type: self.device_type_policy.clone(),
        }
    }

    /// The seed visit
    pub fn seed_visit(&self) -> PendingVisit {
        PendingVisit::seed(self.seed.clone(), self.credentials.clone(), self.device_type.clone())
    }
}

fn validate_output_path(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidOutputPath {
                path: path.to_path_buf(),
                reason: format!("Parent directory '{}' does not exist", parent.display()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        let mut argv = vec!["cdp-crawler"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn crawl_args(args: &[&str]) -> CrawlArgs {
        let mut argv = vec!["crawl"];
        argv.extend_from_slice(args);
        match parse(&argv).command {
            Command::Crawl(args) => args,
            other => panic!("expected crawl, got {:?}", other),
        }
    }

    #[test]
    fn test_crawl_defaults() {
        let args = crawl_args(&["10.0.0.1", "-u", "admin", "--password", "secret"]);
        let config = CrawlConfig::from_args(args, false, false).unwrap();

        assert_eq!(config.seed, "10.0.0.1");
        assert_eq!(config.credentials.port, 22);
        assert_eq!(config.device_type, DEFAULT_DEVICE_TYPE);
        assert_eq!(config.device_type_policy, DeviceTypePolicy::default());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.grace_period, DEFAULT_GRACE_PERIOD);
        assert_eq!(config.queue_capacity, None);
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT));
        assert!(config.show_progress);
        assert!(config.worker_count >= 1 && config.worker_count <= MAX_WORKERS);

        let seed = config.seed_visit();
        assert!(seed.is_seed());
        assert_eq!(seed.credentials.username, "admin");
    }

    #[test]
    fn test_crawl_options() {
        let args = crawl_args(&[
            "core-sw1.example.com",
            "-u",
            "admin",
            "--password",
            "secret",
            "--port",
            "2222",
            "-w",
            "16",
            "--timeout",
            "5",
            "--max-depth",
            "3",
            "--queue-capacity",
            "64",
            "--exclude",
            "^192\\.168\\.",
            "--exclude",
            "^172\\.",
            "--infer-device-type",
        ]);
        let config = CrawlConfig::from_args(args, true, true).unwrap();
        let options = config.engine_options();

        assert_eq!(config.credentials.port, 2222);
        assert_eq!(options.worker_count, 16);
        assert_eq!(options.op_timeout, Duration::from_secs(5));
        assert_eq!(options.max_depth, Some(3));
        assert_eq!(options.queue_capacity, Some(64));
        assert_eq!(options.exclude_patterns.len(), 2);
        assert!(options.is_excluded("192.168.0.1"));
        assert!(matches!(
            options.device_type,
            DeviceTypePolicy::InferFromPlatform { .. }
        ));
        assert!(!config.show_progress);
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_worker_count() {
        let args = crawl_args(&["10.0.0.1", "-u", "a", "--password", "b", "-w", "0"]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));

        let args = crawl_args(&["10.0.0.1", "-u", "a", "--password", "b", "-w", "513"]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidWorkerCount { count: 513, max: 512 })
        ));
    }

    #[test]
    fn test_invalid_values() {
        let args = crawl_args(&["10.0.0.1", "-u", "a", "--password", "b", "--queue-capacity", "4"]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidQueueCapacity { size: 4, .. })
        ));

        let args = crawl_args(&["10.0.0.1", "-u", "a", "--password", "b", "--timeout", "0"]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidTimeout { .. })
        ));

        let args = crawl_args(&["10.0.0.1", "-u", "a", "--password", "b", "--exclude", "(unclosed"]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));

        let args = crawl_args(&["bad seed!", "-u", "a", "--password", "b"]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidSeed { .. })
        ));

        let args = crawl_args(&[
            "10.0.0.1",
            "-u",
            "a",
            "--password",
            "b",
            "-o",
            "/nonexistent/dir/devices.csv",
        ]);
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::InvalidOutputPath { .. })
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let mut args = crawl_args(&["10.0.0.1", "--password", "b"]);
        args.username = None;
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::Missing(_))
        ));

        let mut args = crawl_args(&["10.0.0.1", "-u", "admin"]);
        args.password = None;
        assert!(matches!(
            CrawlConfig::from_args(args, false, false),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_seed_forms() {
        for seed in ["10.0.0.1", "core-sw1", "core-sw1.example.com.", "[2001:db8::1]", "fe80::1"] {
            assert!(SEED_REGEX.is_match(seed), "{} should be accepted", seed);
        }
        for seed in ["-leading", "has space", "semi;colon"] {
            assert!(!SEED_REGEX.is_match(seed), "{} should be rejected", seed);
        }
    }

    #[test]
    fn test_other_subcommands() {
        match parse(&["status"]).command {
            Command::Status { database } => assert_eq!(database, PathBuf::from(DEFAULT_DATABASE)),
            other => panic!("expected status, got {:?}", other),
        }

        let args = parse(&["-q", "export", "--database", "x.db", "-o", "out.csv"]);
        assert!(args.quiet);
        match args.command {
            Command::Export { database, output } => {
                assert_eq!(database, PathBuf::from("x.db"));
                assert_eq!(output, PathBuf::from("out.csv"));
            }
            other => panic!("expected export, got {:?}", other),
        }
    }
}
