use std::path::PathBuf;

use crate::config::settings::LogLevel;
use crate::config::{Config, ParsedArgs};
use crate::output::OutputFormat;

/// Final merged configuration that combines command line arguments and config file settings
/// Command line arguments take priority over config file settings
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub target_path: Option<PathBuf>,
    pub pid: Option<u32>,
    pub symbol: String,

    // Logging
    pub log_file: PathBuf,
    pub enable_logging: bool,
    pub enable_console_logging: bool,
    pub log_level: LogLevel,
    /// RUST_LOG directives used instead of `log_level` when present
    pub log_directives: Option<String>,

    // Output
    pub format: OutputFormat,
    pub graph: bool,
    pub app_id_env: Vec<String>,
}

impl MergedConfig {
    /// Create merged configuration from parsed arguments and config file
    pub fn new(args: ParsedArgs, config: Config) -> Self {
        let log_file = args
            .log_file
            .unwrap_or_else(|| PathBuf::from(&config.general.log_file));

        // --no-log disables file and console logging alike
        let enable_logging = !args.no_log && config.general.enable_logging;
        let enable_console_logging = !args.no_log
            && (args.log_console || config.general.enable_console_logging);

        Self {
            target_path: args.target_path,
            pid: args.pid,
            symbol: args.symbol,
            log_file,
            enable_logging,
            enable_console_logging,
            log_level: args.log_level.unwrap_or(config.general.log_level),
            log_directives: args.log_directives,
            format: args.format.unwrap_or(config.output.format),
            graph: args.graph || config.output.graph,
            app_id_env: config.output.app_id_env,
        }
    }

    /// Create merged configuration with explicit config file path
    pub fn new_with_explicit_config(
        args: ParsedArgs,
        config_path: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let config = if let Some(path) = config_path {
            Config::load_with_explicit_path(path)?
        } else {
            Config::load()?
        };

        Ok(Self::new(args, config))
    }
}
