/// Identity of the PID namespace the consumer lives in: device and inode of
/// its `/proc/self/ns/pid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PidNamespace {
    pub dev: u64,
    pub ino: u64,
}

/// Where the probe learns which process triggered it.
pub trait PidSource {
    /// Thread group id of the current task as seen from `ns`, if the task is
    /// visible there.
    fn namespaced_tgid(&self, ns: &PidNamespace) -> Option<u32>;

    /// Thread group id in the root namespace. Always available.
    fn root_tgid(&self) -> u32;
}

impl PidNamespace {
    /// PID of the current task in this namespace, or its root-namespace PID
    /// when the lookup fails.
    #[inline(always)]
    pub fn resolve<P: PidSource>(&self, pids: &P) -> u32 {
        match pids.namespaced_tgid(self) {
            Some(tgid) => tgid,
            None => pids.root_tgid(),
        }
    }
}
