use dyna_core::INSN_WIDTH;

use crate::runtime::{CoherentBus, Runtime};
use crate::{Interpreter, Machine};

impl<M: Machine, I: Interpreter> Runtime<M, I> {
    /// Execute one instruction the translator left to the interpreter.
    ///
    /// Returns 0 when execution simply falls through to `pc + 4`, or
    /// the address to continue at when the instruction changed control
    /// flow (branches, jumps, exceptions).
    pub fn interpret_one(&mut self, insn: u32, pc: u32, delay_slot: bool) -> u32 {
        self.cpu.delay_slot = delay_slot;
        self.cpu.pc = pc;
        let mut bus = CoherentBus {
            machine: &mut self.machine,
            cache: &mut self.cache,
            stats: &mut self.stats,
        };
        self.interp.execute(insn, &mut self.cpu, &mut bus);
        self.cpu.delay_slot = false;
        self.stats.interpreted += 1;

        if self.cpu.pc != pc.wrapping_add(INSN_WIDTH) {
            self.skip_next_poll();
            self.cpu.pc
        } else {
            0
        }
    }
}
