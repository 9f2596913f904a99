use anyhow::{Context, Result};
use httpscope_process::{pidns, resolve_function, AttachPoint, RoundTripLoader, TraceStream};
use std::io::Write;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::config::MergedConfig;
use crate::procfs::PROC_ROOT;
use crate::runtime::sink::TraceSink;

/// A probe attached to one target, streaming traces until shutdown.
pub struct TraceSession {
    stream: TraceStream,
    sink: TraceSink,
}

impl TraceSession {
    /// Resolve the attach point, load the probe and attach it.
    pub fn attach(config: &MergedConfig) -> Result<Self> {
        let target = config
            .target_path
            .as_deref()
            .context("No target executable to attach to")?;

        let location = resolve_function(target, &config.symbol)?;
        info!(
            "Attaching to {} in {} (file offset 0x{:x}, {} bytes, {} return(s))",
            config.symbol,
            target.display(),
            location.file_offset,
            location.size,
            location.returns.len()
        );

        let pidns = pidns::current()?;
        let mut loader = RoundTripLoader::load_embedded(pidns)?;
        let pid = config
            .pid
            .map(i32::try_from)
            .transpose()
            .context("PID out of range")?;
        let probes = loader.attach(target, &AttachPoint::returns_of(&location, pid))?;
        info!("{} HTTP probe(s) attached", probes);

        Ok(Self {
            stream: loader.into_stream()?,
            sink: TraceSink::new(
                config.format,
                config.graph,
                PROC_ROOT,
                config.app_id_env.clone(),
            ),
        })
    }

    /// Print traces until Ctrl-C or SIGTERM, then the dependency graph if
    /// one was requested.
    pub async fn run(mut self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate()).context("Cannot listen for SIGTERM")?;
        let stdout = std::io::stdout();

        loop {
            tokio::select! {
                batch = self.stream.next_batch() => {
                    let mut out = stdout.lock();
                    for trace in batch? {
                        if let Err(e) = self.sink.handle(&mut out, &trace) {
                            if e.kind() == std::io::ErrorKind::BrokenPipe {
                                info!("Output closed, shutting down...");
                                return Ok(());
                            }
                            return Err(e).context("Failed to write trace");
                        }
                    }
                    if let Err(e) = out.flush() {
                        warn!("Failed to flush output: {}", e);
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        let stats = self.sink.stats();
        info!(
            "Traced {} requests ({} partial)",
            stats.traces, stats.partial
        );

        // Detach before the slower graph work
        drop(self.stream);
        if let Some(dot) = self.sink.finish().await {
            let mut out = stdout.lock();
            if let Err(e) = writeln!(out, "{}", dot).and_then(|_| out.flush()) {
                error!("Failed to write dependency graph: {}", e);
            }
        }
        Ok(())
    }
}
