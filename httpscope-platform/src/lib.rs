//! Platform-specific utilities for httpscope
//!
//! This crate maps Go's register-based internal calling convention onto the
//! kernel `pt_regs` layout of each supported architecture. It is shared by the
//! BPF program (built for `bpf*-unknown-none`, so it stays `no_std`) and by
//! userspace.
#![cfg_attr(not(test), no_std)]

pub mod register_mapping;

pub use register_mapping::{GoAbiRegisters, RegisterSnapshot, AARCH64, GO_INT_REGISTERS, X86_64};

#[cfg(any(
    bpf_target_arch = "x86_64",
    bpf_target_arch = "aarch64",
    all(not(target_arch = "bpf"), any(target_arch = "x86_64", target_arch = "aarch64"))
))]
pub use register_mapping::NATIVE;
