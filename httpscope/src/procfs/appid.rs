//! Human readable names for the processes behind trace PIDs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Name for `pid`: its `comm`, suffixed with `@` and the values of any
/// `env_keys` variables in its environment (joined with `-`, in environment
/// order). `P-<pid>` when the process can no longer be inspected.
pub fn app_identity(proc_root: &Path, pid: u32, env_keys: &[String]) -> String {
    let pid_dir = proc_root.join(pid.to_string());
    let comm = match std::fs::read_to_string(pid_dir.join("comm")) {
        Ok(comm) => comm.trim_end_matches('\n').to_string(),
        Err(e) => {
            debug!("No comm for pid {}: {}", pid, e);
            return format!("P-{}", pid);
        }
    };

    // The environment is often unreadable for other users' processes
    let ids = std::fs::read(pid_dir.join("environ"))
        .map(|environ| env_values(&environ, env_keys))
        .unwrap_or_default();

    if ids.is_empty() {
        comm
    } else {
        format!("{}@{}", comm, ids.join("-"))
    }
}

/// Non-empty values of `keys` in a NUL separated `KEY=VALUE` block.
fn env_values(environ: &[u8], keys: &[String]) -> Vec<String> {
    environ
        .split(|&b| b == 0)
        .filter_map(|entry| {
            let eq = entry.iter().position(|&b| b == b'=')?;
            let (key, value) = (&entry[..eq], &entry[eq + 1..]);
            (!value.is_empty() && keys.iter().any(|k| k.as_bytes() == key))
                .then(|| String::from_utf8_lossy(value).into_owned())
        })
        .collect()
}

/// Caches identities so a process keeps its name after it exits.
#[derive(Debug)]
pub struct AppNames {
    proc_root: PathBuf,
    env_keys: Vec<String>,
    cache: HashMap<u32, String>,
}

impl AppNames {
    pub fn new(proc_root: impl Into<PathBuf>, env_keys: Vec<String>) -> Self {
        Self {
            proc_root: proc_root.into(),
            env_keys,
            cache: HashMap::new(),
        }
    }

    pub fn name_of(&mut self, pid: u32) -> &str {
        let (proc_root, env_keys) = (&self.proc_root, &self.env_keys);
        self.cache
            .entry(pid)
            .or_insert_with(|| app_identity(proc_root, pid, env_keys))
    }
}
