//! Where decoded traces go: printed lines and the dependency graph.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use httpscope_protocol::ParsedTrace;
use tracing::{debug, warn};

use crate::graph::{DependencyGraph, Destination};
use crate::output::{format_line, OutputFormat};
use crate::procfs::{AppNames, ListenerTable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub traces: u64,
    pub partial: u64,
}

#[derive(Debug)]
pub struct TraceSink {
    format: OutputFormat,
    proc_root: PathBuf,
    names: AppNames,
    graph: Option<DependencyGraph>,
    stats: SinkStats,
}

impl TraceSink {
    /// `graph` enables dependency tracking; `proc_root` is normally `/proc`.
    pub fn new(
        format: OutputFormat,
        graph: bool,
        proc_root: impl Into<PathBuf>,
        app_id_env: Vec<String>,
    ) -> Self {
        let proc_root = proc_root.into();
        Self {
            format,
            names: AppNames::new(proc_root.clone(), app_id_env),
            proc_root,
            graph: graph.then(DependencyGraph::new),
            stats: SinkStats::default(),
        }
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Print one trace and count it in the graph.
    pub fn handle<W: Write>(&mut self, out: &mut W, trace: &ParsedTrace) -> std::io::Result<()> {
        self.stats.traces += 1;
        if trace.partial {
            self.stats.partial += 1;
        }

        // Name the process now, while it is still around to be inspected
        let app = self.names.name_of(trace.pid);
        match format_line(self.format, app, trace) {
            Ok(line) => writeln!(out, "{}", line)?,
            Err(e) => warn!("Cannot format trace from pid {}: {}", trace.pid, e),
        }

        if let Some(graph) = &mut self.graph {
            graph.record(trace);
        }
        Ok(())
    }

    /// The dependency graph in DOT, if tracking is enabled. Destinations
    /// served by a local listener are named after the owning process.
    pub async fn finish(mut self) -> Option<String> {
        let graph = self.graph.take()?;
        let listeners = if graph.is_empty() {
            ListenerTable::default()
        } else {
            ListenerTable::scan(&self.proc_root)
        };

        let mut dest_names: HashMap<Destination, String> = HashMap::new();
        for dest in graph.destinations() {
            let name = match local_owner(dest, &listeners).await {
                Some(pid) => self.names.name_of(pid).to_string(),
                None => dest.authority.clone(),
            };
            dest_names.insert(dest.clone(), name);
        }

        let names = &mut self.names;
        Some(graph.render_dot(
            |pid| names.name_of(pid).to_string(),
            |dest| {
                dest_names
                    .get(dest)
                    .cloned()
                    .unwrap_or_else(|| dest.authority.clone())
            },
        ))
    }
}

/// PID of the local process listening on any address `dest` resolves to.
pub async fn local_owner(dest: &Destination, listeners: &ListenerTable) -> Option<u32> {
    if listeners.is_empty() {
        return None;
    }
    let port = dest.port?;
    match tokio::net::lookup_host((dest.host.as_str(), port)).await {
        Ok(addrs) => addrs.filter_map(|addr| listeners.owner_of(addr)).min(),
        Err(e) => {
            debug!("Cannot resolve {}: {}", dest.authority, e);
            None
        }
    }
}
