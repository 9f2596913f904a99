//! httpscope Protocol Library
//!
//! The fixed-size `HttpTrace` record written by the BPF program into the
//! `TRACES` ring buffer, and (with the `std` feature) its decoding into
//! user-facing traces.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod trace;

#[cfg(feature = "std")]
mod error;
#[cfg(feature = "std")]
pub mod parse;
#[cfg(feature = "std")]
pub mod status;

pub use trace::{
    encode_content_length, encode_protocol, HttpTrace, TraceHead, CONTENT_LENGTH_OVERFLOW,
    CONTENT_LENGTH_UNKNOWN, HTTP_TRACE_BUF, HTTP_TRACE_SIZE,
};

#[cfg(feature = "std")]
pub use error::{ProtocolError, Result};
#[cfg(feature = "std")]
pub use parse::{ContentLength, HttpVersion, ParsedTrace, Status};
#[cfg(feature = "std")]
pub use status::reason_phrase;
