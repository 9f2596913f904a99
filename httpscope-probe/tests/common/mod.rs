#![allow(dead_code)]

//! In-memory stand-ins for the BPF environment: a fake target address
//! space, a recording ring buffer, register snapshots and PID helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use httpscope_probe::platform::{GoAbiRegisters, RegisterSnapshot};
use httpscope_probe::protocol::HttpTrace;
use httpscope_probe::{
    EventChannel, GoIface, GoString, NetHttpRequest, NetHttpResponse, NetUrl, PidNamespace,
    PidSource, ReadFault, RemoteMemory, ReservedTrace,
};
use zerocopy::{FromZeros, Immutable, IntoBytes};

/// Base of the fake heap. Anything outside the written range faults.
pub const HEAP_BASE: u64 = 0xc000_0000;
/// An address that is never mapped.
pub const UNMAPPED: u64 = 0xdead_0000;

/// Bump-allocated image of a target process heap.
#[derive(Default)]
pub struct ProcessImage {
    bytes: Vec<u8>,
}

impl ProcessImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy raw bytes into the heap (8-byte aligned) and return their address.
    pub fn place_bytes(&mut self, data: &[u8]) -> u64 {
        while self.bytes.len() % 8 != 0 {
            self.bytes.push(0);
        }
        let addr = HEAP_BASE + self.bytes.len() as u64;
        self.bytes.extend_from_slice(data);
        addr
    }

    pub fn place<T: IntoBytes + Immutable>(&mut self, value: &T) -> u64 {
        self.place_bytes(value.as_bytes())
    }

    pub fn string(&mut self, s: &str) -> GoString {
        if s.is_empty() {
            return GoString::default();
        }
        GoString {
            ptr: self.place_bytes(s.as_bytes()),
            len: s.len() as i64,
        }
    }

    /// Lay out a full response -> request -> URL chain; returns the
    /// `*http.Response`.
    pub fn http_call(&mut self, call: &Call) -> u64 {
        let url = NetUrl {
            scheme: self.string(&call.scheme),
            host: self.string(&call.host),
            path: self.string(&call.path),
            raw_query: self.string(&call.raw_query),
            force_query: call.force_query as u8,
            ..Default::default()
        };
        let url_ptr = match call.url_ptr {
            Some(ptr) => ptr,
            None => self.place(&url),
        };
        let request = NetHttpRequest {
            method: self.string(&call.method),
            url: url_ptr,
            proto_major: 1,
            proto_minor: 1,
            ..Default::default()
        };
        let request_ptr = match call.request_ptr {
            Some(ptr) => ptr,
            None => self.place(&request),
        };
        let response = NetHttpResponse {
            status_code: call.status_code,
            proto_major: call.proto.0,
            proto_minor: call.proto.1,
            content_length: call.content_length,
            request: request_ptr,
            ..Default::default()
        };
        self.place(&response)
    }

    pub fn into_memory(self) -> FakeMemory {
        FakeMemory {
            bytes: Arc::new(self.bytes),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Description of one `RoundTrip` result.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub raw_query: String,
    pub force_query: bool,
    pub status_code: i64,
    pub proto: (i64, i64),
    pub content_length: i64,
    /// Override `Response.Request` (e.g. with [`UNMAPPED`])
    pub request_ptr: Option<u64>,
    /// Override `Request.URL`
    pub url_ptr: Option<u64>,
}

impl Default for Call {
    fn default() -> Self {
        Self {
            method: "GET".into(),
            scheme: "https".into(),
            host: "example.com".into(),
            path: "/x".into(),
            raw_query: "a=1".into(),
            force_query: false,
            status_code: 200,
            proto: (1, 1),
            content_length: 15,
            request_ptr: None,
            url_ptr: None,
        }
    }
}

/// Read-only view of a [`ProcessImage`]; cheap to clone across threads.
#[derive(Clone)]
pub struct FakeMemory {
    bytes: Arc<Vec<u8>>,
    reads: Arc<AtomicUsize>,
}

impl FakeMemory {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RemoteMemory for FakeMemory {
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadFault> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let start = addr.checked_sub(HEAP_BASE).ok_or(ReadFault { addr })? as usize;
        let end = start.checked_add(dst.len()).ok_or(ReadFault { addr })?;
        let src = self.bytes.get(start..end).ok_or(ReadFault { addr })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

#[derive(Default)]
struct ChannelState {
    published: Vec<HttpTrace>,
    in_flight: usize,
    reserved: usize,
    released: usize,
}

/// Bounded channel that keeps every published record.
#[derive(Clone)]
pub struct RecordingChannel {
    capacity: usize,
    state: Arc<Mutex<ChannelState>>,
}

impl RecordingChannel {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    pub fn published(&self) -> Vec<HttpTrace> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn reserved(&self) -> usize {
        self.state.lock().unwrap().reserved
    }

    pub fn released(&self) -> usize {
        self.state.lock().unwrap().released
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }
}

pub struct RecordingSlot {
    trace: Box<HttpTrace>,
    state: Arc<Mutex<ChannelState>>,
}

impl ReservedTrace for RecordingSlot {
    fn trace_mut(&mut self) -> &mut HttpTrace {
        &mut self.trace
    }

    fn submit(self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        state.published.push(*self.trace);
    }

    fn release(self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        state.released += 1;
    }
}

impl EventChannel for RecordingChannel {
    type Slot<'a> = RecordingSlot;

    fn reserve(&self) -> Option<RecordingSlot> {
        let mut state = self.state.lock().unwrap();
        if state.in_flight + state.published.len() >= self.capacity {
            return None;
        }
        state.in_flight += 1;
        state.reserved += 1;
        Some(RecordingSlot {
            trace: Box::new(HttpTrace::new_zeroed()),
            state: Arc::clone(&self.state),
        })
    }
}

/// pt_regs image addressed by byte offset; unset words read as zero.
#[derive(Debug, Clone, Default)]
pub struct FakeRegs(HashMap<usize, u64>);

impl FakeRegs {
    /// Registers as `RoundTrip` leaves them: R0 = response, (R1, R2) = error.
    pub fn returning(abi: &GoAbiRegisters, response: u64, err: GoIface) -> Self {
        let mut words = HashMap::new();
        for (slot, value) in [response, err.typ, err.data].into_iter().enumerate() {
            words.insert(abi.offset(slot).unwrap(), value);
        }
        // Garbage in the remaining result registers must not matter
        for slot in 3..9 {
            words.insert(abi.offset(slot).unwrap(), 0x5151_5151);
        }
        Self(words)
    }
}

impl RegisterSnapshot for FakeRegs {
    fn word_at(&self, byte_offset: usize) -> u64 {
        self.0.get(&byte_offset).copied().unwrap_or(0)
    }
}

/// PID helpers with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedPids {
    pub namespaced: Option<u32>,
    pub root: u32,
}

impl PidSource for FixedPids {
    fn namespaced_tgid(&self, _ns: &PidNamespace) -> Option<u32> {
        self.namespaced
    }

    fn root_tgid(&self) -> u32 {
        self.root
    }
}

pub const OBSERVER_NS: PidNamespace = PidNamespace {
    dev: 4,
    ino: 0xeffffffc,
};
