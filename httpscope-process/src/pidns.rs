//! Identity of our own PID namespace, handed to the probe so it can report
//! PIDs as we see them.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use httpscope_probe::PidNamespace;

use crate::error::{ProcessError, Result};

pub const SELF_PIDNS: &str = "/proc/self/ns/pid";

/// PID namespace of the current process.
pub fn current() -> Result<PidNamespace> {
    from_path(Path::new(SELF_PIDNS))
}

/// Device and inode of a namespace file (symlinks are followed).
pub fn from_path(path: &Path) -> Result<PidNamespace> {
    let meta = std::fs::metadata(path).map_err(|source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PidNamespace {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_reports_dev_and_inode() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let meta = std::fs::metadata(file.path()).unwrap();
        let ns = from_path(file.path()).unwrap();
        assert_eq!(ns.dev, meta.dev());
        assert_eq!(ns.ino, meta.ino());
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("pid");
        match from_path(&missing) {
            Err(ProcessError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
