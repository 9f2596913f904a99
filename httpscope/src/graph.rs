//! Who calls whom: request counts from each traced process to each
//! destination host, rendered as a Graphviz digraph.

use std::collections::{BTreeMap, BTreeSet};

use httpscope_protocol::ParsedTrace;
use tracing::debug;
use url::{Host, Url};

/// Destination of a request, taken from its URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Destination {
    /// `host[:port]` as the URL names it
    pub authority: String,
    /// Host to resolve (IPv6 literals without brackets)
    pub host: String,
    /// Explicit port, else the scheme's default
    pub port: Option<u16>,
}

impl Destination {
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = match parsed.host()? {
            Host::Domain(name) => name.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let host_str = parsed.host_str()?;
        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host_str, port),
            None => host_str.to_string(),
        };
        Some(Self {
            authority,
            host,
            port: parsed.port_or_known_default(),
        })
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<u32, BTreeMap<Destination, u64>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `trace` as an edge from its process to its URL's host. Traces
    /// without a usable URL (partial ones, mostly) are not counted.
    pub fn record(&mut self, trace: &ParsedTrace) -> bool {
        let Some(dest) = Destination::from_url(&trace.url) else {
            debug!("No destination host in {:?} (pid {})", trace.url, trace.pid);
            return false;
        };
        *self
            .edges
            .entry(trace.pid)
            .or_default()
            .entry(dest)
            .or_default() += 1;
        true
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn destinations(&self) -> BTreeSet<&Destination> {
        self.edges.values().flat_map(|dests| dests.keys()).collect()
    }

    /// Render as a `strict digraph`. Edges that end up between the same
    /// pair of names are merged and their counts summed.
    pub fn render_dot<S, D>(&self, mut source_name: S, mut destination_name: D) -> String
    where
        S: FnMut(u32) -> String,
        D: FnMut(&Destination) -> String,
    {
        let mut merged: BTreeMap<(String, String), u64> = BTreeMap::new();
        for (&pid, dests) in &self.edges {
            let src = source_name(pid);
            for (dest, count) in dests {
                *merged
                    .entry((src.clone(), destination_name(dest)))
                    .or_default() += count;
            }
        }

        let mut dot = String::from("strict digraph {\n");
        for ((src, dst), count) in merged {
            dot.push_str(&format!(
                "{} -> {} [xlabel={}]\n",
                dot_quote(&src),
                dot_quote(&dst),
                count
            ));
        }
        dot.push('}');
        dot
    }
}

/// DOT ID for an arbitrary name. JSON string escaping is valid DOT quoting.
fn dot_quote(name: &str) -> String {
    serde_json::Value::from(name).to_string()
}
