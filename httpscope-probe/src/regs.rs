use httpscope_platform::{GoAbiRegisters, RegisterSnapshot};

use crate::shapes::GoIface;

/// Results of `func (t *Transport) RoundTrip(*Request) (*Response, error)`
/// as found in the result registers: R0 holds the response pointer and
/// (R1, R2) the error interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTripReturn {
    pub response: u64,
    pub err: GoIface,
}

impl RoundTripReturn {
    #[inline(always)]
    pub fn decode<R: RegisterSnapshot>(abi: &GoAbiRegisters, regs: &R) -> Self {
        Self {
            response: abi.result::<0, R>(regs),
            err: GoIface {
                typ: abi.result::<1, R>(regs),
                data: abi.result::<2, R>(regs),
            },
        }
    }

    /// Only successful calls that produced a response are traced.
    #[inline(always)]
    pub fn is_traceable(&self) -> bool {
        self.err.is_nil() && self.response != 0
    }
}
