use httpscope_protocol::{encode_content_length, encode_protocol, HttpTrace, TraceHead};

use crate::appender::{AppendError, BoundedBuf};
use crate::memory::RemoteMemory;
use crate::shapes::{GoString, NetHttpResponse, NetUrl};

/// Longest method the record can describe: `method_end` is a single byte.
pub const METHOD_CAPACITY: usize = u8::MAX as usize;

/// Fills one reserved trace record.
///
/// Keeps `method_end <= url_end <= HTTP_TRACE_BUF` after every step, so the
/// record is well formed whenever the caller stops.
pub struct TraceEncoder<'t> {
    trace: &'t mut HttpTrace,
}

impl<'t> TraceEncoder<'t> {
    /// Write the header from a response snapshot. The record starts out
    /// partial with no text.
    #[inline(always)]
    pub fn begin(trace: &'t mut HttpTrace, response: &NetHttpResponse, pid: u32) -> Self {
        trace.head = TraceHead {
            partial: 1,
            protocol: encode_protocol(response.proto_major, response.proto_minor),
            method_end: 0,
            reserved: 0,
            url_end: 0,
            status_code: response.status_code as u16,
            content_length: encode_content_length(response.content_length),
            pid,
        };
        Self { trace }
    }

    /// Write the request method at the start of the buffer.
    ///
    /// Methods longer than [`METHOD_CAPACITY`] are truncated. On failure the
    /// committed prefix still counts as the method.
    #[inline(always)]
    pub fn write_method<M: RemoteMemory>(
        &mut self,
        mem: &M,
        method: &GoString,
    ) -> Result<(), AppendError> {
        let Some((head, _)) = self.trace.buf.split_first_chunk_mut::<METHOD_CAPACITY>() else {
            return Err(AppendError::Bounds { committed: 0 });
        };
        let mut w = BoundedBuf::at(head, 0);
        let res = w.append_remote(mem, method);
        let end = w.used() as u8;
        self.trace.head.method_end = end;
        self.trace.head.url_end = end as u16;
        res.map(|_| ())
    }

    /// Write `scheme://host/path[?query]` after the method.
    ///
    /// `url_end` always reflects the bytes actually written, including when a
    /// component fails to copy.
    #[inline(always)]
    pub fn write_url<M: RemoteMemory>(&mut self, mem: &M, url: &NetUrl) -> Result<(), AppendError> {
        let mut w = BoundedBuf::at(&mut self.trace.buf, self.trace.head.method_end as usize);
        let res = synthesize_url(&mut w, mem, url);
        self.trace.head.url_end = w.used() as u16;
        res
    }

    /// Mark the record complete.
    #[inline(always)]
    pub fn complete(self) {
        self.trace.head.partial = 0;
    }
}

#[inline(always)]
fn synthesize_url<const N: usize, M: RemoteMemory>(
    w: &mut BoundedBuf<'_, N>,
    mem: &M,
    url: &NetUrl,
) -> Result<(), AppendError> {
    w.append_remote(mem, &url.scheme)?;
    w.push_literal(b"://");
    w.append_remote(mem, &url.host)?;
    w.append_remote(mem, &url.path)?;
    if url.force_query != 0 || url.raw_query.len > 0 {
        w.push_literal(b"?");
        w.append_remote(mem, &url.raw_query)?;
    }
    Ok(())
}
