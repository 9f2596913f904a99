//! Core of the `net/http.(*Transport).RoundTrip` return probe
//!
//! Everything the BPF program does, written against small traits so it can be
//! built for the `bpf` target and tested on the host alike:
//!
//! - [`RegisterSnapshot`](httpscope_platform::RegisterSnapshot) for the CPU
//!   state at the return boundary,
//! - [`RemoteMemory`] for reads from the observed process,
//! - [`EventChannel`] for the ring buffer,
//! - [`PidSource`] for the PID namespace helpers.
//!
//! Code here must stay acceptable to the verifier: no unbounded loops, fixed
//! size copies, and small stack frames.
#![cfg_attr(not(test), no_std)]

pub mod appender;
pub mod channel;
pub mod encoder;
pub mod handler;
pub mod memory;
pub mod pid;
pub mod regs;
pub mod shapes;

pub use appender::{AppendError, BoundedBuf};
pub use channel::{EventChannel, ReservedTrace};
pub use encoder::{TraceEncoder, METHOD_CAPACITY};
pub use handler::{Outcome, ProbeState, RoundTripProbe};
pub use memory::{ReadFault, RemoteMemory};
pub use pid::{PidNamespace, PidSource};
pub use regs::RoundTripReturn;
pub use shapes::{GoIface, GoSlice, GoString, NetHttpRequest, NetHttpResponse, NetUrl};

pub use httpscope_platform as platform;
pub use httpscope_protocol as protocol;
