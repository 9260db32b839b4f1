//! Elapsed-cycle accounting, interrupt polling and the COP1-unusable
//! trap.

use dyna_core::cpu::{cause, cop0};
use tracing::trace;

use crate::runtime::Runtime;
use crate::Machine;

impl<M: Machine, I> Runtime<M, I> {
    /// Advance Count by half the distance from the last checkpoint to
    /// `pc`, move the checkpoint to `pc`, and return the distance to
    /// the next interrupt event (`<= 0` means due).
    ///
    /// A checkpoint ahead of `pc` (control flowed backwards since it
    /// was taken) adds nothing, so Count never goes down.
    pub fn advance_count(&mut self, pc: u32) -> i32 {
        let delta = pc.wrapping_sub(self.cpu.last_pc);
        if (delta as i32) > 0 {
            let count = self.cpu.count().wrapping_add(delta / 2);
            self.cpu.set_count(count);
        }
        self.cpu.last_pc = pc;
        self.cpu.next_interrupt.wrapping_sub(self.cpu.count()) as i32
    }

    /// Raise "coprocessor 1 unusable" for the instruction at `pc` and
    /// return the exception vector to continue at.
    pub fn raise_cop1_unusable(&mut self, pc: u32, delay_slot: bool) -> u32 {
        self.cpu.pc = pc;
        self.cpu.delay_slot = delay_slot;
        let cause = self.cpu.cop0[cop0::CAUSE] & !(cause::EXC_CODE_MASK | cause::CE_MASK);
        self.cpu.cop0[cop0::CAUSE] = cause | cause::COP1_UNUSABLE;
        self.machine.exception_general(&mut self.cpu);
        self.cpu.delay_slot = false;
        self.skip_next_poll();
        trace!(
            pc = format_args!("{:#010x}", pc),
            vector = format_args!("{:#010x}", self.cpu.pc),
            "cop1 unusable"
        );
        self.cpu.pc
    }

    /// Driver-side poll after generated code returned. Takes a
    /// checkpoint at the committed pc and services the interrupt event
    /// if it is due. Returns true when the event was serviced.
    pub fn poll_interrupts(&mut self) -> bool {
        self.cpu.last_pc = self.cpu.pc;
        let remaining = self.cpu.next_interrupt.wrapping_sub(self.cpu.count()) as i32;
        if remaining > 0 {
            return false;
        }
        trace!(
            count = self.cpu.count(),
            next = self.cpu.next_interrupt,
            "servicing interrupt"
        );
        self.machine.service_interrupt(&mut self.cpu);
        self.stats.interrupts += 1;
        true
    }
}
