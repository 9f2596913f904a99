//! Byte layouts of the Go runtime structures the probe reads
//!
//! Go lays out structs like a C compiler would, so each shape is a plain
//! `repr(C)` record with the padding spelled out. `bool` fields are `u8` so
//! that any byte pattern read from the target is a valid value. Pointers are
//! kept as `u64` addresses: they belong to the observed process and are only
//! ever handed to [`RemoteMemory`](crate::memory::RemoteMemory).
//!
//! These layouts are pinned to Go 1.20+ on 64-bit targets. Upstream changes
//! to `net/http` or `net/url` field order break them silently.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// `string` header (`unsafe.String`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct GoString {
    pub ptr: u64,
    pub len: i64,
}

/// `[]T` header (`runtime.slice`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct GoSlice {
    pub ptr: u64,
    pub len: i64,
    pub cap: i64,
}

/// Interface value (`runtime.iface` / `runtime.eface`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct GoIface {
    /// `*itab` or `*_type`
    pub typ: u64,
    pub data: u64,
}

impl GoIface {
    /// A nil interface has both words zero.
    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.typ == 0 && self.data == 0
    }
}

/// `net/url.URL`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NetUrl {
    pub scheme: GoString,
    pub opaque: GoString,
    /// `*Userinfo`
    pub user: u64,
    pub host: GoString,
    pub path: GoString,
    pub raw_path: GoString,
    pub omit_host: u8,
    pub force_query: u8,
    pub _pad0: [u8; 6],
    pub raw_query: GoString,
    pub fragment: GoString,
    pub raw_fragment: GoString,
}

/// Leading fields of `net/http.Request`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NetHttpRequest {
    pub method: GoString,
    /// `*url.URL`
    pub url: u64,
    pub proto: GoString,
    pub proto_major: i64,
    pub proto_minor: i64,
    /// `Header` (a map pointer)
    pub header: u64,
}

/// Leading fields of `net/http.Response`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NetHttpResponse {
    pub status: GoString,
    pub status_code: i64,
    pub proto: GoString,
    pub proto_major: i64,
    pub proto_minor: i64,
    pub header: u64,
    /// `io.ReadCloser`
    pub body: GoIface,
    pub content_length: i64,
    /// `[]string`
    pub transfer_encoding: GoSlice,
    pub close: u8,
    pub uncompressed: u8,
    pub _pad0: [u8; 6],
    pub trailer: u64,
    /// `*Request`
    pub request: u64,
}

macro_rules! assert_layout {
    ($ty:ty, size = $size:expr $(, $field:ident @ $off:expr)* $(,)?) => {
        const _: () = assert!(core::mem::size_of::<$ty>() == $size);
        $(const _: () = assert!(core::mem::offset_of!($ty, $field) == $off);)*
    };
}

assert_layout!(GoString, size = 16, ptr @ 0, len @ 8);
assert_layout!(GoSlice, size = 24, ptr @ 0, len @ 8, cap @ 16);
assert_layout!(GoIface, size = 16, typ @ 0, data @ 8);
assert_layout!(
    NetUrl,
    size = 144,
    scheme @ 0,
    user @ 32,
    host @ 40,
    path @ 56,
    omit_host @ 88,
    force_query @ 89,
    raw_query @ 96,
    raw_fragment @ 128,
);
assert_layout!(NetHttpRequest, size = 64, method @ 0, url @ 16, proto_major @ 40, header @ 56);
assert_layout!(
    NetHttpResponse,
    size = 136,
    status_code @ 16,
    proto_major @ 40,
    proto_minor @ 48,
    body @ 64,
    content_length @ 80,
    transfer_encoding @ 88,
    close @ 112,
    trailer @ 120,
    request @ 128,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iface_nil() {
        assert!(GoIface::default().is_nil());
        assert!(!GoIface { typ: 1, data: 0 }.is_nil());
        assert!(!GoIface { typ: 0, data: 1 }.is_nil());
    }

    #[test]
    fn test_url_decodes_from_raw_bytes() {
        let mut raw = [0u8; 144];
        raw[40..48].copy_from_slice(&0x1000u64.to_ne_bytes());
        raw[48..56].copy_from_slice(&11i64.to_ne_bytes());
        raw[89] = 1;
        let url = NetUrl::read_from_bytes(&raw[..]).unwrap();
        assert_eq!(url.host, GoString { ptr: 0x1000, len: 11 });
        assert_eq!(url.force_query, 1);
        assert_eq!(url.omit_host, 0);
    }
}
