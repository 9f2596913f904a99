//! Attach point resolution from the target's ELF symbol tables.

use std::path::Path;

use iced_x86::{Decoder, DecoderOptions, Instruction, Mnemonic};
use object::{Architecture, Object, ObjectSegment, ObjectSymbol, SegmentFlags, SymbolKind};
use tracing::debug;

use crate::error::{ProcessError, Result};

/// Function the probe is written for.
pub const ROUND_TRIP_SYMBOL: &str = "net/http.(*Transport).RoundTrip";

/// Where a function lives, both in memory and in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLocation {
    /// Link-time virtual address (`st_value`)
    pub address: u64,
    pub size: u64,
    /// Offset of the first instruction in the ELF file, as uprobes expect
    pub file_offset: u64,
    /// Offsets of the return instructions, relative to the function start
    pub returns: Vec<u64>,
}

impl FunctionLocation {
    /// File offsets of every return instruction.
    pub fn return_offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.returns.iter().map(|ret| self.file_offset + ret)
    }
}

/// Instruction sets whose return instructions we can find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeArch {
    X86_64,
    Aarch64,
}

impl CodeArch {
    fn of(arch: Architecture) -> Option<Self> {
        match arch {
            Architecture::X86_64 => Some(CodeArch::X86_64),
            Architecture::Aarch64 => Some(CodeArch::Aarch64),
            _ => None,
        }
    }
}

/// `RET {Xn}` with the register field masked out.
const A64_RET_MASK: u32 = 0xffff_fc1f;
const A64_RET: u32 = 0xd65f_0000;

/// Offsets of the return instructions in the machine code `code`.
///
/// x86-64 has variable-length instructions, so an undecodable byte ends the
/// scan with the offset it sits at. On aarch64 every word is decoded on its
/// own and a trailing partial word is ignored.
pub fn find_returns(arch: CodeArch, code: &[u8]) -> std::result::Result<Vec<u64>, u64> {
    match arch {
        CodeArch::X86_64 => {
            let mut decoder = Decoder::with_ip(64, code, 0, DecoderOptions::NONE);
            let mut insn = Instruction::default();
            let mut returns = Vec::new();
            while decoder.can_decode() {
                let at = decoder.position() as u64;
                decoder.decode_out(&mut insn);
                if insn.is_invalid() {
                    return Err(at);
                }
                if insn.mnemonic() == Mnemonic::Ret {
                    returns.push(insn.ip());
                }
            }
            Ok(returns)
        }
        CodeArch::Aarch64 => Ok(code
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, word)| {
                let insn = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                insn & A64_RET_MASK == A64_RET
            })
            .map(|(idx, _)| idx as u64 * 4)
            .collect()),
    }
}

/// A `PT_LOAD` program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    pub vaddr: u64,
    pub memsz: u64,
    pub file_offset: u64,
    pub executable: bool,
}

impl LoadSegment {
    fn contains(&self, vaddr: u64) -> bool {
        self.vaddr <= vaddr && vaddr - self.vaddr < self.memsz
    }
}

/// Translate a virtual address into a file offset through the executable
/// segment containing it.
pub fn file_offset_of(segments: &[LoadSegment], vaddr: u64) -> Option<u64> {
    segments
        .iter()
        .find(|seg| seg.executable && seg.contains(vaddr))
        .map(|seg| seg.file_offset + (vaddr - seg.vaddr))
}

/// Find a sized function symbol in the static or dynamic symbol table of the
/// ELF file at `path`.
pub fn resolve_function(path: &Path, symbol: &str) -> Result<FunctionLocation> {
    let data = std::fs::read(path).map_err(|source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let obj = object::File::parse(&*data).map_err(|source| ProcessError::Elf {
        path: path.to_path_buf(),
        source,
    })?;

    let sym = obj
        .symbols()
        .chain(obj.dynamic_symbols())
        .find(|s| {
            s.kind() == SymbolKind::Text && s.size() != 0 && s.name().map_or(false, |n| n == symbol)
        })
        .ok_or_else(|| ProcessError::SymbolNotFound {
            symbol: symbol.to_string(),
            path: path.to_path_buf(),
        })?;

    let segments: Vec<LoadSegment> = obj
        .segments()
        .map(|seg| {
            let (file_offset, _) = seg.file_range();
            LoadSegment {
                vaddr: seg.address(),
                memsz: seg.size(),
                file_offset,
                executable: matches!(
                    seg.flags(),
                    SegmentFlags::Elf { p_flags } if p_flags & object::elf::PF_X != 0
                ),
            }
        })
        .collect();

    let address = sym.address();
    let file_offset =
        file_offset_of(&segments, address).ok_or_else(|| ProcessError::NotInSegment {
            symbol: symbol.to_string(),
            address,
        })?;

    let size = sym.size();
    let code = usize::try_from(file_offset)
        .ok()
        .zip(usize::try_from(size).ok())
        .and_then(|(start, len)| data.get(start..start.checked_add(len)?))
        .ok_or_else(|| ProcessError::Truncated {
            symbol: symbol.to_string(),
            path: path.to_path_buf(),
        })?;

    let arch = CodeArch::of(obj.architecture()).ok_or_else(|| ProcessError::UnsupportedArch {
        arch: format!("{:?}", obj.architecture()),
        path: path.to_path_buf(),
    })?;
    let returns = find_returns(arch, code).map_err(|offset| ProcessError::Decode {
        symbol: symbol.to_string(),
        offset,
    })?;
    if returns.is_empty() {
        return Err(ProcessError::NoReturns {
            symbol: symbol.to_string(),
        });
    }

    debug!(
        "Resolved {} in {}: vaddr 0x{:x}, size {}, file offset 0x{:x}, {} return(s) at {:x?}",
        symbol,
        path.display(),
        address,
        size,
        file_offset,
        returns.len(),
        returns
    );
    Ok(FunctionLocation {
        address,
        size,
        file_offset,
        returns,
    })
}
