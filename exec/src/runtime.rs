use dyna_core::{CpuContext, DynarecError, Width};
use tracing::warn;

use crate::cache::TranslationCache;
use crate::stats::ExecStats;
use crate::{GuestBus, Machine};

/// State the runtime callbacks operate on while generated code runs.
///
/// Generated code only ever reaches this through the frame's opaque
/// runtime pointer; the driver owns it the rest of the time.
pub struct Runtime<M, I> {
    pub cpu: CpuContext,
    pub machine: M,
    pub interp: I,
    pub cache: TranslationCache,
    pub stats: ExecStats,
    /// One-shot: skip the interrupt poll after the current exit.
    skip_poll: bool,
    fault: Option<DynarecError>,
}

impl<M, I> Runtime<M, I> {
    pub fn new(machine: M, interp: I) -> Self {
        Self {
            cpu: CpuContext::new(),
            machine,
            interp,
            cache: TranslationCache::new(),
            stats: ExecStats::default(),
            skip_poll: false,
            fault: None,
        }
    }

    /// Stop the driver with a fatal error.
    pub fn halt(&mut self, err: DynarecError) {
        warn!(%err, pc = format_args!("{:#010x}", self.cpu.pc), "halting dynarec");
        self.cpu.stop = true;
        self.fault.get_or_insert(err);
    }

    pub fn fault(&self) -> Option<&DynarecError> {
        self.fault.as_ref()
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Suppress the next interrupt poll. Used when a service already
    /// redirected control flow.
    pub fn skip_next_poll(&mut self) {
        self.skip_poll = true;
    }

    /// Consume the one-shot poll suppression.
    pub fn take_skip_poll(&mut self) -> bool {
        std::mem::take(&mut self.skip_poll)
    }

    pub fn is_skip_poll(&self) -> bool {
        self.skip_poll
    }
}

/// [`GuestBus`] that frees compiled code overwritten by a store.
pub struct CoherentBus<'a, M> {
    pub machine: &'a mut M,
    pub cache: &'a mut TranslationCache,
    pub stats: &'a mut ExecStats,
}

impl<M: Machine> GuestBus for CoherentBus<'_, M> {
    fn read(&mut self, cpu: &mut CpuContext, addr: u32, width: Width) -> u64 {
        self.machine.read(cpu, addr, width)
    }

    fn write(&mut self, cpu: &mut CpuContext, addr: u32, width: Width, value: u64) {
        self.machine.write(cpu, addr, width, value);
        let freed = self.cache.note_store(addr, width);
        self.stats.functions_freed += freed as u64;
    }

    fn fetch(&mut self, cpu: &mut CpuContext, addr: u32) -> u32 {
        self.machine.read(cpu, addr, Width::Word) as u32
    }

    fn exception_general(&mut self, cpu: &mut CpuContext) {
        self.machine.exception_general(cpu);
    }
}
