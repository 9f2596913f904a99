//! Userspace side of the RoundTrip probe: locate the attach point, load the
//! BPF object with our PID namespace baked in, and stream decoded traces.

pub mod error;
pub mod loader;
pub mod pidns;
pub mod stream;
pub mod symbol;

pub use error::{ProcessError, Result};
pub use loader::{embedded_object, AttachPoint, RoundTripLoader};
pub use stream::TraceStream;
pub use symbol::{resolve_function, FunctionLocation, ROUND_TRIP_SYMBOL};
