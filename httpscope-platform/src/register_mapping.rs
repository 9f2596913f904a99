//! Register mappings for Go's ABIInternal return values
//!
//! Go (since 1.17 on amd64, 1.18 on arm64) returns results unpacked in a fixed
//! sequence of integer registers instead of on the stack. The sequence is
//! architecture specific and not a stable ABI: see https://go.dev/s/regabi.
//! A change upstream silently breaks every table in this module.

/// Number of integer registers ABIInternal assigns to results (R0..R8).
pub const GO_INT_REGISTERS: usize = 9;

/// Read-only CPU state captured when a probe fires.
pub trait RegisterSnapshot {
    /// Read the 64-bit word at `byte_offset` inside the architecture's `pt_regs`.
    fn word_at(&self, byte_offset: usize) -> u64;
}

/// Mapping of Go integer result slots onto `pt_regs` byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAbiRegisters {
    pub arch: &'static str,
    offsets: [usize; GO_INT_REGISTERS],
}

/// x86_64 mapping: RAX, RBX, RCX, RDI, RSI, R8, R9, R10, R11.
///
/// Offsets follow the kernel's pt_regs layout
/// (https://github.com/torvalds/linux/blob/master/arch/x86/include/asm/ptrace.h):
/// ```c
/// struct pt_regs {
///     unsigned long r15;    // offset 0
///     unsigned long r14;    // offset 8
///     unsigned long r13;    // offset 16
///     unsigned long r12;    // offset 24
///     unsigned long bp;     // offset 32
///     unsigned long bx;     // offset 40
///     unsigned long r11;    // offset 48
///     unsigned long r10;    // offset 56
///     unsigned long r9;     // offset 64
///     unsigned long r8;     // offset 72
///     unsigned long ax;     // offset 80
///     unsigned long cx;     // offset 88
///     unsigned long dx;     // offset 96
///     unsigned long si;     // offset 104
///     unsigned long di;     // offset 112
///     ...
/// };
/// ```
pub const X86_64: GoAbiRegisters = GoAbiRegisters {
    arch: "x86_64",
    offsets: [80, 40, 88, 112, 104, 72, 64, 56, 48],
};

/// arm64 mapping: X0..X8, which live at `user_pt_regs.regs[N]`.
pub const AARCH64: GoAbiRegisters = GoAbiRegisters {
    arch: "aarch64",
    offsets: [0, 8, 16, 24, 32, 40, 48, 56, 64],
};

/// Table for the architecture the BPF object is built for.
#[cfg(any(
    bpf_target_arch = "x86_64",
    all(not(target_arch = "bpf"), target_arch = "x86_64")
))]
pub const NATIVE: GoAbiRegisters = X86_64;

/// Table for the architecture the BPF object is built for.
#[cfg(any(
    bpf_target_arch = "aarch64",
    all(not(target_arch = "bpf"), target_arch = "aarch64")
))]
pub const NATIVE: GoAbiRegisters = AARCH64;

#[cfg(all(
    target_arch = "bpf",
    not(any(bpf_target_arch = "x86_64", bpf_target_arch = "aarch64"))
))]
compile_error!("httpscope only supports x86_64 and aarch64 targets (set bpf_target_arch)");

impl GoAbiRegisters {
    /// Byte offset of result slot `slot` inside `pt_regs`.
    pub fn offset(&self, slot: usize) -> Option<usize> {
        self.offsets.get(slot).copied()
    }

    /// Read result slot `SLOT` from a register snapshot.
    ///
    /// The slot is a const parameter so the offset folds into a constant
    /// context access in the BPF program.
    #[inline(always)]
    pub fn result<const SLOT: usize, R: RegisterSnapshot>(&self, regs: &R) -> u64 {
        const { assert!(SLOT < GO_INT_REGISTERS) };
        regs.word_at(self.offsets[SLOT])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake pt_regs where every word holds its own byte offset.
    struct OffsetEcho;

    impl RegisterSnapshot for OffsetEcho {
        fn word_at(&self, byte_offset: usize) -> u64 {
            byte_offset as u64
        }
    }

    #[test]
    fn test_x86_64_result_registers() {
        assert_eq!(X86_64.offset(0), Some(80)); // RAX
        assert_eq!(X86_64.offset(1), Some(40)); // RBX
        assert_eq!(X86_64.offset(2), Some(88)); // RCX
        assert_eq!(X86_64.offset(8), Some(48)); // R11
        assert_eq!(X86_64.offset(5), Some(72)); // R8
        assert_eq!(X86_64.offset(9), None);
    }

    #[test]
    fn test_aarch64_result_registers() {
        for slot in 0..GO_INT_REGISTERS {
            assert_eq!(AARCH64.offset(slot), Some(slot * 8));
        }
        assert_eq!(AARCH64.offset(9), None);
    }

    #[test]
    fn test_offsets_are_word_aligned_and_distinct() {
        for table in [X86_64, AARCH64] {
            for slot in 0..GO_INT_REGISTERS {
                let off = table.offset(slot).unwrap();
                assert_eq!(off % 8, 0, "{} slot {}", table.arch, slot);
                for other in slot + 1..GO_INT_REGISTERS {
                    assert_ne!(Some(off), table.offset(other));
                }
            }
        }
    }

    #[test]
    fn test_result_reads_through_snapshot() {
        assert_eq!(X86_64.result::<0, _>(&OffsetEcho), 80);
        assert_eq!(X86_64.result::<2, _>(&OffsetEcho), 88);
        assert_eq!(AARCH64.result::<1, _>(&OffsetEcho), 8);
    }
}
