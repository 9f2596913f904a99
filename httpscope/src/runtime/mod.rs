//! Runtime module - attaches the probe and handles the trace stream

pub mod session;
pub mod sink;

pub use session::TraceSession;
