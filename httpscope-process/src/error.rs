use std::path::PathBuf;

/// Loader error types
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("roundtrip-bpf object was not built into this binary (run `cargo run -- build-ebpf` in httpscope-process/ebpf/xtask)")]
    MissingObject,

    #[error("Aya error: {0}")]
    Aya(#[from] aya::EbpfError),

    #[error("Program error: {0}")]
    Program(#[from] aya::programs::ProgramError),

    #[error("Map error: {0}")]
    Map(#[from] aya::maps::MapError),

    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error("Map not found: {0}")]
    MapNotFound(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ELF file {}: {source}", path.display())]
    Elf {
        path: PathBuf,
        #[source]
        source: object::Error,
    },

    #[error("function {symbol} not found in {}", path.display())]
    SymbolNotFound { symbol: String, path: PathBuf },

    #[error("function {symbol} at 0x{address:x} is not in an executable segment")]
    NotInSegment { symbol: String, address: u64 },

    #[error("function {symbol} extends past the end of {}", path.display())]
    Truncated { symbol: String, path: PathBuf },

    #[error("cannot find return instructions in {} code ({arch})", path.display())]
    UnsupportedArch { arch: String, path: PathBuf },

    #[error("cannot decode function {symbol} at +0x{offset:x}")]
    Decode { symbol: String, offset: u64 },

    #[error("function {symbol} has no return instruction to attach to")]
    NoReturns { symbol: String },

    #[error("no return instruction offsets to attach to")]
    NoAttachOffsets,

    #[error("ring buffer poll failed: {0}")]
    Poll(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
