//! Bounded, verifier-friendly string appends
//!
//! The BPF verifier cannot relate two variables, so it cannot prove
//! `used + len <= N` for a copy of runtime length. Instead every copy has a
//! constant size: the length is decomposed into its binary representation and
//! each set bit is copied as one power-of-two chunk, each behind its own
//! bounds check.

use crate::memory::RemoteMemory;
use crate::shapes::GoString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendError {
    /// A chunk read faulted after `committed` bytes were written
    Fault { committed: usize },
    /// A chunk would have overrun the buffer. Cannot happen while
    /// `used <= N`, but the check is what the verifier sees.
    Bounds { committed: usize },
}

impl AppendError {
    /// Bytes this append wrote before failing. They are valid text.
    pub fn committed(&self) -> usize {
        match *self {
            AppendError::Fault { committed } | AppendError::Bounds { committed } => committed,
        }
    }
}

/// Write cursor over a fixed-capacity byte buffer.
pub struct BoundedBuf<'b, const N: usize> {
    buf: &'b mut [u8; N],
    used: usize,
}

impl<'b, const N: usize> BoundedBuf<'b, N> {
    /// Start writing at `used` (clamped to `N`).
    #[inline(always)]
    pub fn at(buf: &'b mut [u8; N], used: usize) -> Self {
        let used = if used > N { N } else { used };
        Self { buf, used }
    }

    #[inline(always)]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Write `lit` only if it fits entirely. Returns whether it was written.
    #[inline(always)]
    pub fn push_literal(&mut self, lit: &[u8]) -> bool {
        match self.buf.get_mut(self.used..self.used + lit.len()) {
            Some(dst) => {
                for (d, s) in dst.iter_mut().zip(lit) {
                    *d = *s;
                }
                self.used += lit.len();
                true
            }
            None => false,
        }
    }

    /// Append as much of the remote string `s` as fits.
    ///
    /// Returns the number of bytes appended. Empty or negative lengths and a
    /// full buffer append nothing. On failure the bytes copied before the
    /// failing chunk stay in the buffer and are counted in `used()`.
    #[inline(always)]
    pub fn append_remote<M: RemoteMemory>(
        &mut self,
        mem: &M,
        s: &GoString,
    ) -> Result<usize, AppendError> {
        const { assert!(N < 0x200, "buffer exceeds the largest copy chunk") };

        if s.len <= 0 || self.used >= N {
            return Ok(0);
        }
        let room = N - self.used;
        let n = if (s.len as u64) < room as u64 {
            s.len as usize
        } else {
            room
        };

        let start = self.used;
        let mut src = s.ptr;
        self.copy_chunk::<0x100, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x80, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x40, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x20, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x10, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x08, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x04, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x02, M>(mem, n, &mut src, start)?;
        self.copy_chunk::<0x01, M>(mem, n, &mut src, start)?;
        Ok(n)
    }

    #[inline(always)]
    fn copy_chunk<const C: usize, M: RemoteMemory>(
        &mut self,
        mem: &M,
        n: usize,
        src: &mut u64,
        start: usize,
    ) -> Result<(), AppendError> {
        if n & C == 0 {
            return Ok(());
        }
        let committed = self.used - start;
        if C > N || self.used > N - C {
            return Err(AppendError::Bounds { committed });
        }
        let Some(dst) = self.buf.get_mut(self.used..self.used + C) else {
            return Err(AppendError::Bounds { committed });
        };
        mem.read_bytes(*src, dst)
            .map_err(|_| AppendError::Fault { committed })?;
        *src = src.wrapping_add(C as u64);
        self.used += C;
        Ok(())
    }
}
