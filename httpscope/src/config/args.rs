use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::settings::LogLevel;
use crate::output::OutputFormat;
use httpscope_process::ROUND_TRIP_SYMBOL;

#[derive(Parser, Debug)]
#[command(name = "httpscope")]
#[command(
    about = "Trace outgoing HTTP requests of Go programs with an eBPF return probe on net/http RoundTrip"
)]
#[command(version)]
pub struct Args {
    /// Go executable to probe (path). Defaults to /proc/<PID>/exe when -p is given
    #[arg(value_name = "TARGET")]
    pub target: Option<PathBuf>,

    /// Only report requests made by this process
    #[arg(long, short = 'p', value_name = "PID")]
    pub pid: Option<u32>,

    /// Function to attach to
    #[arg(long, value_name = "SYMBOL", default_value = ROUND_TRIP_SYMBOL)]
    pub symbol: String,

    /// Trace line format (overrides config file)
    #[arg(long, value_name = "FORMAT", value_enum)]
    pub format: Option<OutputFormat>,

    /// Print the service dependency graph in DOT format on exit (overrides config file)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub graph: bool,

    /// Specify custom configuration file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path (default: ./httpscope.log)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    /// Priority: 1. Command line args, 2. RUST_LOG env var, 3. Config file (default: warn)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Disable logging completely (overrides config file)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_log: bool,

    /// Enable console logging in addition to file logging (overrides config file)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub log_console: bool,
}

#[derive(Debug, Clone)]
pub struct ParsedArgs {
    pub target_path: Option<PathBuf>,
    pub pid: Option<u32>,
    pub symbol: String,
    pub format: Option<OutputFormat>,
    pub graph: bool,
    pub config: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    /// `None` when neither --log-level nor RUST_LOG chose a level
    pub log_level: Option<LogLevel>,
    /// RUST_LOG directives that are more than a bare level
    pub log_directives: Option<String>,
    pub no_log: bool,
    pub log_console: bool,
}

impl Args {
    /// Parse the process command line.
    pub fn parse_args() -> ParsedArgs {
        Self::parse().into_parsed(std::env::var("RUST_LOG").ok().as_deref())
    }

    /// Resolve derived settings; `rust_log` is the RUST_LOG value, if any.
    pub fn into_parsed(self, rust_log: Option<&str>) -> ParsedArgs {
        let log_level = Self::determine_log_level(self.log_level.as_deref(), rust_log);
        let log_directives = match (log_level, rust_log) {
            (None, Some(directives)) if !directives.trim().is_empty() => {
                Some(directives.to_string())
            }
            _ => None,
        };
        let target_path = self.target.or_else(|| {
            self.pid
                .map(|pid| PathBuf::from(format!("/proc/{}/exe", pid)))
        });

        ParsedArgs {
            target_path,
            pid: self.pid,
            symbol: self.symbol,
            format: self.format,
            graph: self.graph,
            config: self.config,
            log_file: self.log_file,
            log_level,
            log_directives,
            no_log: self.no_log,
            log_console: self.log_console,
        }
    }

    /// Log level priority: 1. --log-level, 2. RUST_LOG, 3. config file (decided later)
    fn determine_log_level(cli: Option<&str>, rust_log: Option<&str>) -> Option<LogLevel> {
        if let Some(level_str) = cli {
            match level_str.parse() {
                Ok(level) => return Some(level),
                Err(_) => {
                    warn!("Invalid log level '{}', using default 'warn'", level_str);
                    return Some(LogLevel::Warn);
                }
            }
        }
        // RUST_LOG may be a full directive list; only a bare level is taken here
        rust_log.and_then(|value| value.parse().ok())
    }
}

impl ParsedArgs {
    /// Validate command line arguments for consistency and completeness
    pub fn validate(&self) -> Result<()> {
        let Some(target_path) = &self.target_path else {
            return Err(anyhow::anyhow!(
                "No target given. Pass the Go executable to probe, or -p <PID> to probe a running process"
            ));
        };

        if let Some(pid) = self.pid {
            if !is_pid_running(pid) {
                return Err(anyhow::anyhow!(
                    "Process with PID {} is not running. Use 'ps -p {}' to verify the process exists",
                    pid,
                    pid
                ));
            }
            info!("✓ Target PID {} is running", pid);
        }

        if !target_path.exists() {
            return Err(anyhow::anyhow!(
                "Target file does not exist: {}",
                target_path.display()
            ));
        }
        if !target_path.is_file() {
            return Err(anyhow::anyhow!(
                "Target path is not a file: {}",
                target_path.display()
            ));
        }
        info!("✓ Target file found: {}", target_path.display());
        Ok(())
    }
}

/// Check if a process with given PID is currently running
fn is_pid_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{}", pid)).is_dir()
}
