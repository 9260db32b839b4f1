//! Memory accesses requested by generated code.

use dyna_core::{AccessKind, MemAccess};
use tracing::trace;

use crate::runtime::{CoherentBus, Runtime};
use crate::{GuestBus, Machine};

impl<M: Machine, I> Runtime<M, I> {
    /// Perform one memory access for generated code.
    ///
    /// Loads write the extended value into the register named by the
    /// request. Stores go through the coherent bus, so compiled code
    /// covering the stored address is freed before it can run again.
    /// Returns 0 when execution continues normally, or the address to
    /// resume at when the access raised an exception.
    pub fn access(&mut self, req: MemAccess) -> u32 {
        self.cpu.pc = req.pc;
        self.cpu.delay_slot = req.delay_slot;
        self.stats.mem_accesses += 1;
        let width = req.kind.width();

        if req.kind.is_store() {
            let value = req.kind.extend(req.value);
            let mut bus = CoherentBus {
                machine: &mut self.machine,
                cache: &mut self.cache,
                stats: &mut self.stats,
            };
            bus.write(&mut self.cpu, req.addr, width, value);
        } else {
            let raw = self.machine.read(&mut self.cpu, req.addr, width);
            if self.cpu.pc == req.pc {
                let reg = req.dest_reg();
                match req.kind {
                    AccessKind::Lwc1 => self.cpu.set_fpr_single_bits(reg, raw as u32),
                    AccessKind::Ldc1 => self.cpu.set_fpr_double_bits(reg, raw),
                    kind => self.cpu.set_gpr(reg, kind.extend(raw)),
                }
            }
        }

        self.cpu.delay_slot = false;
        if self.cpu.pc != req.pc {
            trace!(
                pc = format_args!("{:#010x}", req.pc),
                to = format_args!("{:#010x}", self.cpu.pc),
                "memory access redirected"
            );
            self.skip_next_poll();
            self.cpu.pc
        } else {
            0
        }
    }

    /// [`Runtime::access`] on raw callback arguments. An unknown access
    /// kind halts the driver.
    pub fn access_raw(&mut self, value: u64, addr: u32, kind: u32, pc: u32, delay_slot: bool) -> u32 {
        match MemAccess::from_raw(value, addr, kind, pc, delay_slot) {
            Ok(req) => self.access(req),
            Err(err) => {
                self.cpu.pc = pc;
                self.halt(err);
                0
            }
        }
    }
}
