use anyhow::Result;
use std::path::Path;
use std::sync::OnceLock;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::MergedConfig;

static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Build the event filter: RUST_LOG directives if they were given, else the
/// merged log level.
fn build_filter(config: &MergedConfig) -> EnvFilter {
    config
        .log_directives
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(config.log_level.to_string()))
}

/// Install the global subscriber. Trace lines go to stdout, so the console
/// layer writes to stderr.
pub fn initialize_logging(config: &MergedConfig) -> Result<()> {
    if !config.enable_logging && !config.enable_console_logging {
        return Ok(());
    }
    if INIT_GUARD.set(()).is_err() {
        // Already initialized elsewhere; do nothing and succeed
        return Ok(());
    }

    // Capture aya's log:: output
    let _ = tracing_log::LogTracer::init();

    if !config.enable_logging {
        let _ = tracing_subscriber::registry()
            .with(console_layer(config))
            .try_init();
        return Ok(());
    }

    match open_log_file(&config.log_file) {
        Ok(log_file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_writer(log_file)
                .with_target(true)
                .with_ansi(false)
                .with_filter(build_filter(config));

            let _ = tracing_subscriber::registry()
                .with(file_layer)
                .with(console_layer(config))
                .try_init();
        }
        Err(e) => {
            // Fallback to stderr only if file creation fails
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_env_filter(build_filter(config))
                .try_init();
            tracing::warn!(
                "Cannot open log file {}: {}; logging to stderr",
                config.log_file.display(),
                e
            );
        }
    }

    Ok(())
}

fn console_layer<S>(config: &MergedConfig) -> Option<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    config.enable_console_logging.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(build_filter(config))
            .boxed()
    })
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}
