use zerocopy::{FromBytes, IntoBytes};

/// A read from the observed process failed (unmapped, paged out, or garbage
/// address). Only the faulting address is known; the sandbox helper gives
/// no reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFault {
    pub addr: u64,
}

/// Fallible access to another process's address space.
///
/// Implementations must never trust `addr`; a bad address is a `ReadFault`,
/// not a crash of the reader or the target.
pub trait RemoteMemory {
    /// Fill `dst` with the `dst.len()` bytes starting at `addr`.
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadFault>;

    /// Copy a fixed-size structure from `addr` into `dst`.
    #[inline(always)]
    fn read<T: FromBytes + IntoBytes>(&self, dst: &mut T, addr: u64) -> Result<(), ReadFault> {
        self.read_bytes(addr, dst.as_mut_bytes())
    }
}

impl<M: RemoteMemory + ?Sized> RemoteMemory for &M {
    #[inline(always)]
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadFault> {
        (**self).read_bytes(addr, dst)
    }
}
