use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of one trace record.
///
/// Ring buffer entries carry an 8-byte header, so a record of this size
/// occupies exactly 512 bytes of the buffer.
pub const HTTP_TRACE_SIZE: usize = 512 - 8;

/// Capacity of the shared text buffer in [`HttpTrace`].
pub const HTTP_TRACE_BUF: usize = HTTP_TRACE_SIZE - core::mem::size_of::<TraceHead>();

/// `content_length` marker: the response reported a negative (unknown) length.
pub const CONTENT_LENGTH_UNKNOWN: u32 = u32::MAX;
/// `content_length` marker: the length does not fit the field.
pub const CONTENT_LENGTH_OVERFLOW: u32 = u32::MAX - 1;

/// Fixed-size header of every trace record.
///
/// ABI note: the BPF program writes this layout and userspace reads it back
/// with the same definition. Changing field order or sizes requires a
/// coordinated rebuild of both sides.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct TraceHead {
    /// Non-zero if reading or encoding some net/http structure failed
    pub partial: u8,
    /// HTTP version: major in the high nibble, minor in the low nibble
    pub protocol: u8,
    /// `buf[..method_end]` holds the request method
    pub method_end: u8,
    /// Alignment padding before `url_end`; always zero
    pub reserved: u8,
    /// `buf[method_end..url_end]` holds the request URL
    pub url_end: u16,
    pub status_code: u16,
    /// Response content length, sentinel-encoded (see [`encode_content_length`])
    pub content_length: u32,
    /// PID (tgid) of the observed process, in the observer's PID namespace
    pub pid: u32,
}

/// One observed HTTP round trip.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct HttpTrace {
    pub head: TraceHead,
    /// Shared buffer for the dynamically-sized strings; bytes past
    /// `head.url_end` are undefined
    pub buf: [u8; HTTP_TRACE_BUF],
}

const _: () = assert!(core::mem::size_of::<TraceHead>() == 16);
const _: () = assert!(core::mem::size_of::<HttpTrace>() == HTTP_TRACE_SIZE);
// The probe's chunked copy starts at 256-byte chunks.
const _: () = assert!(HTTP_TRACE_BUF < 0x200);
// method_end is a single byte; url_end is two.
const _: () = assert!(HTTP_TRACE_BUF <= u16::MAX as usize);

impl HttpTrace {
    /// Request method bytes, or `None` if the offsets are inconsistent.
    pub fn method(&self) -> Option<&[u8]> {
        self.buf.get(..self.head.method_end as usize)
    }

    /// Request URL bytes, or `None` if the offsets are inconsistent.
    pub fn url(&self) -> Option<&[u8]> {
        self.buf
            .get(self.head.method_end as usize..self.head.url_end as usize)
    }
}

/// Pack an HTTP version into one byte, major in the high nibble.
#[inline(always)]
pub fn encode_protocol(major: i64, minor: i64) -> u8 {
    (((major & 0x0f) << 4) | (minor & 0x0f)) as u8
}

/// Squeeze a Go `int64` content length into 32 bits.
///
/// Negative lengths (unknown) become [`CONTENT_LENGTH_UNKNOWN`], lengths that
/// do not fit become [`CONTENT_LENGTH_OVERFLOW`].
#[inline(always)]
pub fn encode_content_length(content_length: i64) -> u32 {
    if content_length < 0 {
        CONTENT_LENGTH_UNKNOWN
    } else if content_length >= u32::MAX as i64 {
        CONTENT_LENGTH_OVERFLOW
    } else {
        content_length as u32
    }
}
