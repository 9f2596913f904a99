//! The RoundTrip return handler
//!
//! One invocation moves through
//! `Start -> RegistersDecoded -> SlotReserved -> ResponseRead -> RequestRead
//! -> UrlRead -> Finalized` and ends in exactly one of: nothing happened, the
//! reserved slot was released, or a record was submitted. Once the response
//! has been read a record is always submitted, flagged partial if anything
//! later failed.

use httpscope_platform::{GoAbiRegisters, RegisterSnapshot};
use zerocopy::FromZeros;

use crate::channel::{EventChannel, ReservedTrace};
use crate::encoder::TraceEncoder;
use crate::memory::RemoteMemory;
use crate::pid::{PidNamespace, PidSource};
use crate::regs::RoundTripReturn;
use crate::shapes::{NetHttpRequest, NetHttpResponse, NetUrl};

/// Furthest point an invocation reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbeState {
    Start,
    RegistersDecoded,
    SlotReserved,
    ResponseRead,
    RequestRead,
    UrlRead,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call failed or returned no response
    Ignored,
    /// The channel was full
    Dropped,
    /// The response could not be read; the slot was given back
    Released,
    /// A record was published
    Submitted { reached: ProbeState, partial: bool },
}

impl Outcome {
    /// Return code of the BPF program.
    pub fn code(&self) -> u32 {
        match self {
            Outcome::Released => 1,
            _ => 0,
        }
    }

    pub fn state(&self) -> ProbeState {
        match *self {
            Outcome::Ignored => ProbeState::RegistersDecoded,
            Outcome::Dropped => ProbeState::RegistersDecoded,
            Outcome::Released => ProbeState::SlotReserved,
            Outcome::Submitted { reached, .. } => reached,
        }
    }
}

/// Everything one invocation needs, passed in by the entry point.
pub struct RoundTripProbe<C, M, P> {
    pub abi: GoAbiRegisters,
    pub channel: C,
    pub memory: M,
    pub pids: P,
    pub pidns: PidNamespace,
}

impl<C, M, P> RoundTripProbe<C, M, P>
where
    C: EventChannel,
    M: RemoteMemory,
    P: PidSource,
{
    /// Handle one return from `(*Transport).RoundTrip`.
    #[inline(always)]
    pub fn on_return<R: RegisterSnapshot>(&self, regs: &R) -> Outcome {
        let ret = RoundTripReturn::decode(&self.abi, regs);
        if !ret.is_traceable() {
            return Outcome::Ignored;
        }

        let Some(mut slot) = self.channel.reserve() else {
            return Outcome::Dropped;
        };

        let mut response = NetHttpResponse::new_zeroed();
        if self.memory.read(&mut response, ret.response).is_err() {
            slot.release();
            return Outcome::Released;
        }

        let pid = self.pidns.resolve(&self.pids);
        let encoder = TraceEncoder::begin(slot.trace_mut(), &response, pid);
        let reached = self.fill_text(encoder, response.request);
        slot.submit();
        Outcome::Submitted {
            reached,
            partial: reached != ProbeState::Finalized,
        }
    }

    /// Follow response -> request -> URL, writing method and URL text.
    /// Returns the last state reached.
    #[inline(always)]
    fn fill_text(&self, mut encoder: TraceEncoder<'_>, request_ptr: u64) -> ProbeState {
        let mut request = NetHttpRequest::new_zeroed();
        if self.memory.read(&mut request, request_ptr).is_err() {
            return ProbeState::ResponseRead;
        }
        if encoder.write_method(&self.memory, &request.method).is_err() {
            return ProbeState::RequestRead;
        }

        let mut url = NetUrl::new_zeroed();
        if self.memory.read(&mut url, request.url).is_err() {
            return ProbeState::RequestRead;
        }
        if encoder.write_url(&self.memory, &url).is_err() {
            return ProbeState::UrlRead;
        }
        encoder.complete();
        ProbeState::Finalized
    }
}
