use dyna_core::cpu::{cause, cop0, status};
use dyna_core::CpuContext;
use tracing::trace;

/// General exception vector with BEV clear.
pub const GENERAL_VECTOR: u32 = 0x8000_0180;

/// Default distance between timer events, in Count units.
pub const DEFAULT_TIMER_PERIOD: u32 = 0x0100_0000;

/// Enter the general exception vector with the exception code that is
/// already in Cause.
///
/// EPC and Cause.BD are only written when Status.EXL is clear. An
/// exception in a delay slot records the branch in EPC.
pub fn exception_general(cpu: &mut CpuContext) {
    if cpu.cop0[cop0::STATUS] & status::EXL == 0 {
        if cpu.delay_slot {
            cpu.cop0[cop0::EPC] = cpu.pc.wrapping_sub(4);
            cpu.cop0[cop0::CAUSE] |= cause::BD;
        } else {
            cpu.cop0[cop0::EPC] = cpu.pc;
            cpu.cop0[cop0::CAUSE] &= !cause::BD;
        }
    }
    cpu.cop0[cop0::STATUS] |= status::EXL;
    trace!(
        epc = format_args!("{:#010x}", cpu.cop0[cop0::EPC]),
        cause = format_args!("{:#010x}", cpu.cop0[cop0::CAUSE]),
        "exception"
    );
    cpu.pc = GENERAL_VECTOR;
}

/// Set the exception code in Cause and take the exception.
pub fn raise(cpu: &mut CpuContext, code: u32) {
    let c = cpu.cop0[cop0::CAUSE] & !(cause::EXC_CODE_MASK | cause::CE_MASK);
    cpu.cop0[cop0::CAUSE] = c | (code << cause::EXC_CODE_SHIFT);
    exception_general(cpu);
}

/// Address error on `addr`.
pub fn raise_address_error(cpu: &mut CpuContext, addr: u32, store: bool) {
    cpu.cop0[cop0::BAD_VADDR] = addr;
    raise(cpu, if store { cause::EXC_ADES } else { cause::EXC_ADEL });
}

/// Whether a pending, unmasked interrupt would be taken now.
pub fn interrupt_taken(cpu: &CpuContext) -> bool {
    let sr = cpu.cop0[cop0::STATUS];
    sr & status::IE != 0
        && sr & (status::EXL | status::ERL) == 0
        && sr & cpu.cop0[cop0::CAUSE] & status::IM_MASK != 0
}

/// Periodic timer driving Cause.IP7.
#[derive(Debug, Clone)]
pub struct Vr4300Exceptions {
    period: u32,
}

impl Default for Vr4300Exceptions {
    fn default() -> Self {
        Self::new(DEFAULT_TIMER_PERIOD)
    }
}

impl Vr4300Exceptions {
    pub fn new(period: u32) -> Self {
        Self {
            period: period.clamp(1, i32::MAX as u32),
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// Schedule the first timer event relative to the current Count.
    pub fn arm(&self, cpu: &mut CpuContext) {
        cpu.next_interrupt = cpu.count().wrapping_add(self.period);
    }

    /// Timer event: raise IP7, schedule the next event and take the
    /// interrupt if the CPU accepts it.
    pub fn service(&self, cpu: &mut CpuContext) {
        cpu.cop0[cop0::CAUSE] |= cause::IP7;
        cpu.next_interrupt = cpu.count().wrapping_add(self.period);
        if interrupt_taken(cpu) {
            cpu.delay_slot = false;
            raise(cpu, cause::EXC_INT);
        }
    }
}
