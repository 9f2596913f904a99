//! What `/proc` tells us about the processes on both ends of a request.

pub mod appid;
pub mod sockets;

pub use appid::AppNames;
pub use sockets::ListenerTable;

pub const PROC_ROOT: &str = "/proc";
