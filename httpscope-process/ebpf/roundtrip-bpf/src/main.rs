#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{bpf_pidns_info, BPF_RB_NO_WAKEUP},
    helpers::{bpf_get_current_pid_tgid, bpf_probe_read_user_buf, gen::bpf_get_ns_current_pid_tgid},
    macros::{map, uprobe},
    maps::{ring_buf::RingBufEntry, RingBuf},
    programs::ProbeContext,
};
use httpscope_platform::{RegisterSnapshot, NATIVE};
use httpscope_probe::{
    EventChannel, PidNamespace, PidSource, ReadFault, RemoteMemory, ReservedTrace, RoundTripProbe,
};
use httpscope_protocol::{HttpTrace, HTTP_TRACE_SIZE};

// Reading user memory requires a GPL-compatible license.
#[link_section = "license"]
#[used]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

// 512 records of 512 bytes (504 plus the 8-byte ring buffer header).
#[map(name = "TRACES")]
static TRACES: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

// Rewritten by the loader before the program is loaded (see RoundTripLoader::load).
#[no_mangle]
static PIDNS_DEV: u64 = 0;
#[no_mangle]
static PIDNS_INO: u64 = 0;

const TRACE_WORDS: usize = HTTP_TRACE_SIZE / 8;
const _: () = assert!(HTTP_TRACE_SIZE % 8 == 0);

// Attached at every RET of RoundTrip, where the result registers are set.
#[uprobe]
pub fn roundtrip_return(ctx: ProbeContext) -> u32 {
    let probe = RoundTripProbe {
        abi: NATIVE,
        channel: TraceRing(&TRACES),
        memory: UserMemory,
        pids: KernelPids,
        pidns: pidns(),
    };
    probe.on_return(&PtRegs(&ctx)).code()
}

#[inline(always)]
fn pidns() -> PidNamespace {
    // Volatile so the compiler cannot fold the zero initializers.
    unsafe {
        PidNamespace {
            dev: core::ptr::read_volatile(&PIDNS_DEV),
            ino: core::ptr::read_volatile(&PIDNS_INO),
        }
    }
}

struct PtRegs<'a>(&'a ProbeContext);

impl RegisterSnapshot for PtRegs<'_> {
    #[inline(always)]
    fn word_at(&self, byte_offset: usize) -> u64 {
        unsafe { *((self.0.regs as *const u8).add(byte_offset) as *const u64) }
    }
}

struct UserMemory;

impl RemoteMemory for UserMemory {
    #[inline(always)]
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadFault> {
        unsafe { bpf_probe_read_user_buf(addr as *const u8, dst) }.map_err(|_| ReadFault { addr })
    }
}

struct KernelPids;

impl PidSource for KernelPids {
    #[inline(always)]
    fn namespaced_tgid(&self, ns: &PidNamespace) -> Option<u32> {
        let mut info = bpf_pidns_info { pid: 0, tgid: 0 };
        let ret = unsafe {
            bpf_get_ns_current_pid_tgid(
                ns.dev,
                ns.ino,
                &mut info,
                core::mem::size_of::<bpf_pidns_info>() as u32,
            )
        };
        (ret == 0).then_some(info.tgid)
    }

    #[inline(always)]
    fn root_tgid(&self) -> u32 {
        (bpf_get_current_pid_tgid() >> 32) as u32
    }
}

struct TraceRing(&'static RingBuf);

impl EventChannel for TraceRing {
    type Slot<'a> = TraceSlot;

    #[inline(always)]
    fn reserve(&self) -> Option<TraceSlot> {
        let mut entry = self.0.reserve::<HttpTrace>(0)?;
        // Ring buffer memory is recycled; clear it one word at a time to keep
        // the copy off the stack.
        let words = entry.as_mut_ptr() as *mut u64;
        for i in 0..TRACE_WORDS {
            unsafe { words.add(i).write(0) };
        }
        Some(TraceSlot(entry))
    }
}

struct TraceSlot(RingBufEntry<HttpTrace>);

impl ReservedTrace for TraceSlot {
    #[inline(always)]
    fn trace_mut(&mut self) -> &mut HttpTrace {
        unsafe { &mut *self.0.as_mut_ptr() }
    }

    #[inline(always)]
    fn submit(self) {
        self.0.submit(0);
    }

    #[inline(always)]
    fn release(self) {
        self.0.discard(BPF_RB_NO_WAKEUP as u64);
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
