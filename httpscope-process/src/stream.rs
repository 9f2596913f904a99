use aya::maps::{MapData, RingBuf};
use aya::Ebpf;
use httpscope_protocol::{HttpTrace, ParsedTrace};
use tokio::io::unix::AsyncFd;
use tracing::{trace, warn};

use crate::error::{ProcessError, Result};

/// Async reader over the `TRACES` ring buffer.
pub struct TraceStream {
    ring: AsyncFd<RingBuf<MapData>>,
    // Dropping the Ebpf detaches the probe.
    _bpf: Ebpf,
}

impl std::fmt::Debug for TraceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TraceStream{..}")
    }
}

impl TraceStream {
    pub(crate) fn new(bpf: Ebpf, ring: RingBuf<MapData>) -> Result<Self> {
        let ring = AsyncFd::new(ring).map_err(ProcessError::Poll)?;
        Ok(Self { ring, _bpf: bpf })
    }

    /// Wait until the ring buffer has data, then drain every available
    /// record. Malformed records are logged and skipped.
    ///
    /// May return an empty batch after a spurious wakeup.
    pub async fn next_batch(&mut self) -> Result<Vec<ParsedTrace>> {
        let mut guard = self.ring.readable_mut().await.map_err(ProcessError::Poll)?;
        let ring = guard.get_inner_mut();

        let mut batch = Vec::new();
        while let Some(item) = ring.next() {
            push_record(&mut batch, &item);
        }
        guard.clear_ready();
        trace!("Drained {} trace(s) from ring buffer", batch.len());
        Ok(batch)
    }
}

/// Decode one raw record into `batch`; returns whether it was accepted.
fn push_record(batch: &mut Vec<ParsedTrace>, raw: &[u8]) -> bool {
    match HttpTrace::parse(raw) {
        Ok(trace) => {
            batch.push(trace);
            true
        }
        Err(e) => {
            warn!("Skipping malformed trace record: {}", e);
            false
        }
    }
}
