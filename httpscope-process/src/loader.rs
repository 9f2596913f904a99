use std::path::Path;

use aya::programs::{ProgramError, UProbe};
use aya::{include_bytes_aligned, Ebpf, EbpfLoader, VerifierLogLevel};
use httpscope_probe::PidNamespace;
use log::{log_enabled, Level as LogLevel};
use tracing::{debug, error, info, warn};

use crate::error::{ProcessError, Result};
use crate::stream::TraceStream;
use crate::symbol::FunctionLocation;

/// Name of the return-instruction uprobe inside the object.
pub const PROGRAM_NAME: &str = "roundtrip_return";
/// Name of the ring buffer map inside the object.
pub const TRACES_MAP: &str = "TRACES";

/// The roundtrip-bpf object matching the target's endianness, copied into
/// `OUT_DIR` by the build script. Empty if it was not built.
pub fn embedded_object() -> &'static [u8] {
    let obj_le: &'static [u8] =
        include_bytes_aligned!(concat!(env!("OUT_DIR"), "/roundtrip-bpf.bpfel.o"));
    let obj_be: &'static [u8] =
        include_bytes_aligned!(concat!(env!("OUT_DIR"), "/roundtrip-bpf.bpfeb.o"));
    if cfg!(target_endian = "little") {
        obj_le
    } else {
        obj_be
    }
}

/// Where to attach the probe: one uprobe per return instruction of the
/// probed function. Uretprobes rewrite the return address on the stack,
/// which breaks when the Go runtime moves a goroutine's stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachPoint {
    /// File offsets of the return instructions
    pub offsets: Vec<u64>,
    /// Only trace this process
    pub pid: Option<i32>,
}

impl AttachPoint {
    pub fn returns_of(function: &FunctionLocation, pid: Option<i32>) -> Self {
        Self {
            offsets: function.return_offsets().collect(),
            pid,
        }
    }
}

/// Owns the loaded probe until it is turned into a [`TraceStream`].
pub struct RoundTripLoader {
    bpf: Ebpf,
}

impl std::fmt::Debug for RoundTripLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundTripLoader")
            .field("bpf", &"<eBPF object>")
            .finish()
    }
}

impl RoundTripLoader {
    /// Load `object` with the PID namespace constants rewritten to `pidns`.
    pub fn load(object: &[u8], pidns: PidNamespace) -> Result<Self> {
        if object.is_empty() {
            return Err(ProcessError::MissingObject);
        }
        raise_memlock_rlimit();

        info!(
            "Loading roundtrip-bpf ({} bytes), pidns dev={} ino={}",
            object.len(),
            pidns.dev,
            pidns.ino
        );
        let mut loader = EbpfLoader::new();
        let verbose = cfg!(debug_assertions)
            || log_enabled!(LogLevel::Trace)
            || log_enabled!(LogLevel::Debug);
        if verbose {
            loader.verifier_log_level(VerifierLogLevel::VERBOSE | VerifierLogLevel::STATS);
            debug!("Verifier logs: VERBOSE (debug build/log)");
        } else {
            loader.verifier_log_level(VerifierLogLevel::DEBUG | VerifierLogLevel::STATS);
        }
        loader
            .set_global("PIDNS_DEV", &pidns.dev, true)
            .set_global("PIDNS_INO", &pidns.ino, true);

        match loader.load(object) {
            Ok(bpf) => Ok(Self { bpf }),
            Err(e) => {
                error!("Failed to load roundtrip-bpf: {:?}", e);
                Err(ProcessError::Aya(e))
            }
        }
    }

    /// Load the embedded object.
    pub fn load_embedded(pidns: PidNamespace) -> Result<Self> {
        Self::load(embedded_object(), pidns)
    }

    /// Load the probe into the kernel and attach it at every offset of
    /// `at` in `target`. Returns the number of uprobes attached.
    pub fn attach(&mut self, target: &Path, at: &AttachPoint) -> Result<usize> {
        if at.offsets.is_empty() {
            return Err(ProcessError::NoAttachOffsets);
        }
        let program: &mut UProbe = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| ProcessError::ProgramNotFound(PROGRAM_NAME.to_string()))?
            .try_into()?;
        program.load()?;

        for &offset in &at.offsets {
            if let Err(e) = program.attach(None, offset, target, at.pid) {
                error!(
                    "Failed to attach uprobe to {} at offset 0x{:x}: {}",
                    target.display(),
                    offset,
                    e
                );
                if let ProgramError::SyscallError(syscall_error) = &e {
                    if let Some(libc::EACCES | libc::EPERM) = syscall_error.io_error.raw_os_error()
                    {
                        error!("Permission denied - make sure to run with sudo (CAP_BPF and CAP_PERFMON)");
                    }
                }
                return Err(ProcessError::Program(e));
            }
            debug!("Uprobe attached at 0x{:x}", offset);
        }
        info!(
            "{} uprobe(s) attached to {} (pid: {:?})",
            at.offsets.len(),
            target.display(),
            at.pid
        );
        Ok(at.offsets.len())
    }

    /// Take the `TRACES` ring buffer. The returned stream keeps the probe
    /// attached for as long as it lives.
    pub fn into_stream(mut self) -> Result<TraceStream> {
        let map = self
            .bpf
            .take_map(TRACES_MAP)
            .ok_or_else(|| ProcessError::MapNotFound(TRACES_MAP.to_string()))?;
        TraceStream::new(self.bpf, map.try_into()?)
    }
}

/// Kernels before 5.11 charge BPF maps against RLIMIT_MEMLOCK.
fn raise_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to remove the locked memory limit (ret {})", ret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_missing() {
        let err = RoundTripLoader::load(&[], PidNamespace::default()).unwrap_err();
        assert!(matches!(err, ProcessError::MissingObject));
    }

    #[test]
    fn test_attach_point_covers_every_return() {
        let function = FunctionLocation {
            address: 0x401000,
            size: 0x80,
            file_offset: 0x1000,
            returns: vec![0x10, 0x7f],
        };
        let at = AttachPoint::returns_of(&function, Some(42));
        assert_eq!(at.offsets, vec![0x1010, 0x107f]);
        assert_eq!(at.pid, Some(42));
    }

    #[test]
    fn test_embedded_object_is_elf_or_empty() {
        let obj = embedded_object();
        assert!(obj.is_empty() || obj.starts_with(b"\x7fELF"));
    }
}
