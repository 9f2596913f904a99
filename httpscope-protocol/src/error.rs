/// Errors decoding a trace record read from the ring buffer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("trace record has {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("inconsistent text offsets: method_end={method_end} url_end={url_end} (capacity {capacity})")]
    Offsets {
        method_end: u8,
        url_end: u16,
        capacity: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
