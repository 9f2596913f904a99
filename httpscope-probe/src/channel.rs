use httpscope_protocol::HttpTrace;

/// Exclusive, zero-initialized space for one record inside an [`EventChannel`].
///
/// Dropping a slot without calling `submit` or `release` leaks the
/// reservation in the BPF ring buffer (the verifier rejects such programs),
/// so both consume the slot.
pub trait ReservedTrace {
    fn trace_mut(&mut self) -> &mut HttpTrace;

    /// Publish the record to the consumer.
    fn submit(self);

    /// Give the space back without publishing anything.
    fn release(self);
}

/// Bounded multi-producer queue of trace records.
pub trait EventChannel {
    type Slot<'a>: ReservedTrace
    where
        Self: 'a;

    /// Reserve a zeroed record, or `None` if the channel is full.
    fn reserve(&self) -> Option<Self::Slot<'_>>;
}
