use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::output::OutputFormat;

/// Log level enumeration for configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(anyhow::anyhow!(
                "Invalid log level: {}. Valid options: error, warn, info, debug, trace",
                s
            )),
        }
    }
}

/// Environment variables whose values name an application, in the order
/// they are joined into its identity.
pub const DEFAULT_APP_ID_ENV: [&str; 4] = ["NAME", "IDENTITY", "APP_NAME", "APP_ID"];

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Default log file path (overridden by --log-file)
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Enable/disable file logging (overridden by --no-log)
    #[serde(default = "default_enable_logging")]
    pub enable_logging: bool,
    /// Mirror logs to stderr (overridden by --log-console)
    #[serde(default)]
    pub enable_console_logging: bool,
    /// Log level filter (overridden by --log-level)
    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Trace line format (overridden by --format)
    #[serde(default)]
    pub format: OutputFormat,
    /// Print the dependency graph on exit (overridden by --graph)
    #[serde(default)]
    pub graph: bool,
    /// Environment variables that identify an application
    #[serde(default = "default_app_id_env")]
    pub app_id_env: Vec<String>,
}

fn default_log_file() -> String {
    "httpscope.log".to_string()
}

fn default_enable_logging() -> bool {
    true
}

fn default_app_id_env() -> Vec<String> {
    DEFAULT_APP_ID_ENV.iter().map(|s| s.to_string()).collect()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            enable_logging: default_enable_logging(),
            enable_console_logging: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            graph: false,
            app_id_env: default_app_id_env(),
        }
    }
}

impl Config {
    /// Load configuration from files with fallback search
    pub fn load() -> Result<Self> {
        for path in &Self::get_config_search_paths() {
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                return Self::load_from_file(path);
            } else {
                debug!("Configuration file not found: {}", path.display());
            }
        }

        info!("No configuration file found, using default settings");
        Ok(Self::default())
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            )
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse TOML text; `origin` names the source in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Self::create_friendly_toml_error(origin, content, e))?;

        if config
            .output
            .app_id_env
            .iter()
            .any(|name| name.is_empty() || name.contains('='))
        {
            return Err(anyhow::anyhow!(
                "Invalid [output] app_id_env in '{}': variable names must be non-empty and must not contain '='",
                origin
            ));
        }
        Ok(config)
    }

    /// Create a user-friendly error message for TOML parsing errors
    fn create_friendly_toml_error(
        file_path: &str,
        content: &str,
        error: toml::de::Error,
    ) -> anyhow::Error {
        let error_msg = format!("Configuration file parsing error in '{}'", file_path);

        if let Some(span) = error.span() {
            let (line_num, col_num) = line_and_column(content, span.start);
            let context_line = content.lines().nth(line_num - 1).unwrap_or("");

            anyhow::anyhow!(
                "{}\n\nError at line {}, column {}:\n{}\n\n{}\n{}^\n\nSuggestion: {}",
                error_msg,
                line_num,
                col_num,
                error.message(),
                context_line,
                " ".repeat(col_num.saturating_sub(1)),
                Self::get_error_suggestion(error.message())
            )
        } else {
            anyhow::anyhow!(
                "{}\n\n{}\n\nSuggestion: {}",
                error_msg,
                error.message(),
                Self::get_error_suggestion(error.message())
            )
        }
    }

    /// Provide helpful suggestions based on common configuration errors
    fn get_error_suggestion(error_msg: &str) -> &'static str {
        if error_msg.contains("unknown variant") && error_msg.contains("text") {
            "Valid output formats are: 'text', 'json'"
        } else if error_msg.contains("unknown variant") {
            "Valid log levels are: 'error', 'warn', 'info', 'debug', 'trace'"
        } else if error_msg.contains("unknown field") {
            "Check the field name spelling and ensure it's in the correct section"
        } else if error_msg.contains("invalid type") {
            "Check the value type - strings should be in quotes, numbers and booleans should not"
        } else {
            "Please check the configuration file syntax"
        }
    }

    /// Get configuration file search paths in priority order
    fn get_config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. ~/.httpscope/config.toml (user-level config)
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".httpscope").join("config.toml"));
        }

        // 2. ./httpscope.toml (project-level config)
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join("httpscope.toml"));
        }

        paths
    }

    /// Load configuration with explicit config file path (for --config flag)
    pub fn load_with_explicit_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Specified configuration file does not exist: {}",
                path.display()
            ));
        }
        Self::load_from_file(path)
    }
}

/// 1-based line and column of byte `offset` in `content`.
fn line_and_column(content: &str, offset: usize) -> (usize, usize) {
    let before = content.get(..offset).unwrap_or(content);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before.len() - line_start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::parse("", "empty.toml").unwrap();
        assert_eq!(config.general.log_file, "httpscope.log");
        assert!(config.general.enable_logging);
        assert!(!config.general.enable_console_logging);
        assert_eq!(config.general.log_level, LogLevel::Warn);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(!config.output.graph);
        assert_eq!(
            config.output.app_id_env,
            vec!["NAME", "IDENTITY", "APP_NAME", "APP_ID"]
        );
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
[general]
log_file = "/var/log/httpscope.log"
enable_logging = false
enable_console_logging = true
log_level = "debug"

[output]
format = "json"
graph = true
app_id_env = ["SERVICE", "POD_NAME"]
"#,
            "full.toml",
        )
        .unwrap();
        assert_eq!(config.general.log_file, "/var/log/httpscope.log");
        assert!(!config.general.enable_logging);
        assert!(config.general.enable_console_logging);
        assert_eq!(config.general.log_level, LogLevel::Debug);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.graph);
        assert_eq!(config.output.app_id_env, vec!["SERVICE", "POD_NAME"]);
    }

    #[test]
    fn test_error_points_at_line_and_column() {
        let err = Config::parse("[general]\nlog_level = \"loud\"\n", "bad.toml")
            .unwrap_err()
            .to_string();
        assert!(err.contains("parsing error in 'bad.toml'"), "{err}");
        assert!(err.contains("Error at line 2"), "{err}");
        assert!(err.contains("Valid log levels"), "{err}");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = Config::parse("[output]\nfromat = \"json\"\n", "typo.toml")
            .unwrap_err()
            .to_string();
        assert!(err.contains("line 2"), "{err}");
        assert!(err.contains("field name spelling"), "{err}");
    }

    #[test]
    fn test_invalid_app_id_env() {
        let err = Config::parse("[output]\napp_id_env = [\"A=B\"]\n", "env.toml").unwrap_err();
        assert!(err.to_string().contains("app_id_env"));
    }

    #[test]
    fn test_load_from_file_and_missing_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[output]\ngraph = true\n").unwrap();
        assert!(Config::load_from_file(file.path()).unwrap().output.graph);

        let err = Config::load_with_explicit_path("/nonexistent/httpscope.toml").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!(" trace ".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_line_and_column() {
        assert_eq!(line_and_column("abc", 0), (1, 1));
        assert_eq!(line_and_column("ab\ncd\nef", 4), (2, 2));
        assert_eq!(line_and_column("ab\n", 3), (2, 1));
    }
}
