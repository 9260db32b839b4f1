/// Number of general-purpose registers.
pub const NUM_GPRS: usize = 32;
/// Number of COP0 registers.
pub const NUM_COP0_REGS: usize = 32;
/// Number of floating-point registers.
pub const NUM_FPRS: usize = 32;

/// COP0 register indices.
pub mod cop0 {
    pub const INDEX: usize = 0;
    pub const BAD_VADDR: usize = 8;
    pub const COUNT: usize = 9;
    pub const COMPARE: usize = 11;
    pub const STATUS: usize = 12;
    pub const CAUSE: usize = 13;
    pub const EPC: usize = 14;
    pub const PRID: usize = 15;
    pub const CONFIG: usize = 16;
    pub const ERROR_EPC: usize = 30;
}

/// Status register bits.
pub mod status {
    pub const IE: u32 = 1 << 0;
    pub const EXL: u32 = 1 << 1;
    pub const ERL: u32 = 1 << 2;
    pub const IM_MASK: u32 = 0xFF << 8;
    pub const FR: u32 = 1 << 26;
    pub const CU0: u32 = 1 << 28;
    pub const CU1: u32 = 1 << 29;
}

/// Cause register bits and exception codes.
pub mod cause {
    pub const BD: u32 = 1 << 31;
    pub const IP_MASK: u32 = 0xFF << 8;
    /// Timer interrupt pending (Count reached the scheduled threshold).
    pub const IP7: u32 = 1 << 15;
    pub const EXC_CODE_SHIFT: u32 = 2;
    pub const EXC_CODE_MASK: u32 = 0x1F << EXC_CODE_SHIFT;
    pub const CE_SHIFT: u32 = 28;
    pub const CE_MASK: u32 = 0x3 << CE_SHIFT;

    pub const EXC_INT: u32 = 0;
    pub const EXC_ADEL: u32 = 4;
    pub const EXC_ADES: u32 = 5;
    pub const EXC_SYS: u32 = 8;
    pub const EXC_BP: u32 = 9;
    pub const EXC_RI: u32 = 10;
    pub const EXC_CPU: u32 = 11;
    pub const EXC_OV: u32 = 12;

    /// Cause value for "coprocessor 1 unusable": ExcCode = CpU, CE = 1.
    pub const COP1_UNUSABLE: u32 = (EXC_CPU << EXC_CODE_SHIFT) | (1 << CE_SHIFT);
}

/// Value of Status after reset: COP0 and COP1 usable, 64-bit FPRs.
pub const STATUS_RESET: u32 = status::CU1 | status::CU0 | status::FR;

/// Architectural state of the emulated VR4300.
///
/// The layout is `#[repr(C)]` because generated code addresses the
/// register files directly through pointers handed over at entry.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct CpuContext {
    pub gpr: [u64; NUM_GPRS],
    pub hi: u64,
    pub lo: u64,
    pub cop0: [u32; NUM_COP0_REGS],
    /// Raw FPR storage. The single and double views depend on Status.FR,
    /// see [`CpuContext::fpr_single_bits`].
    pub fpr: [u64; NUM_FPRS],
    pub fcr31: u32,
    /// Committed program counter.
    pub pc: u32,
    /// Checkpoint PC the elapsed-cycle counter last advanced from.
    pub last_pc: u32,
    /// Count value at which the next interrupt event is due.
    pub next_interrupt: u32,
    /// The instruction at `pc` executes in a branch delay slot.
    pub delay_slot: bool,
    /// Set to make the driver loop return.
    pub stop: bool,
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuContext {
    pub fn new() -> Self {
        let mut cop0 = [0u32; NUM_COP0_REGS];
        cop0[cop0::STATUS] = STATUS_RESET;
        cop0[cop0::PRID] = 0x0000_0B22;
        cop0[cop0::CONFIG] = 0x7006_E463;
        Self {
            gpr: [0; NUM_GPRS],
            hi: 0,
            lo: 0,
            cop0,
            fpr: [0; NUM_FPRS],
            fcr31: 0,
            pc: 0,
            last_pc: 0,
            next_interrupt: 0,
            delay_slot: false,
            stop: false,
        }
    }

    /// Write a GPR. Writes to `$zero` are discarded.
    #[inline]
    pub fn set_gpr(&mut self, reg: usize, value: u64) {
        if reg != 0 {
            self.gpr[reg & 31] = value;
        }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.cop0[cop0::COUNT]
    }

    #[inline]
    pub fn set_count(&mut self, value: u32) {
        self.cop0[cop0::COUNT] = value;
    }

    /// Status.FR: 32 independent 64-bit FPRs instead of 16 even/odd pairs.
    #[inline]
    pub fn fr(&self) -> bool {
        self.cop0[cop0::STATUS] & status::FR != 0
    }

    #[inline]
    pub fn cop1_usable(&self) -> bool {
        self.cop0[cop0::STATUS] & status::CU1 != 0
    }

    /// Raw bits of single-precision register `n`.
    ///
    /// With FR clear, odd singles live in the upper half of the
    /// preceding even register.
    pub fn fpr_single_bits(&self, n: usize) -> u32 {
        let n = n & 31;
        if self.fr() {
            self.fpr[n] as u32
        } else {
            let pair = self.fpr[n & !1];
            if n & 1 == 0 {
                pair as u32
            } else {
                (pair >> 32) as u32
            }
        }
    }

    pub fn set_fpr_single_bits(&mut self, n: usize, bits: u32) {
        let n = n & 31;
        if self.fr() {
            self.fpr[n] = (self.fpr[n] & !0xFFFF_FFFF) | bits as u64;
        } else {
            let pair = &mut self.fpr[n & !1];
            if n & 1 == 0 {
                *pair = (*pair & !0xFFFF_FFFF) | bits as u64;
            } else {
                *pair = (*pair & 0xFFFF_FFFF) | ((bits as u64) << 32);
            }
        }
    }

    /// Raw bits of double-precision register `n`. With FR clear the odd
    /// bit of `n` is ignored.
    pub fn fpr_double_bits(&self, n: usize) -> u64 {
        let n = n & 31;
        if self.fr() {
            self.fpr[n]
        } else {
            self.fpr[n & !1]
        }
    }

    pub fn set_fpr_double_bits(&mut self, n: usize, bits: u64) {
        let n = n & 31;
        if self.fr() {
            self.fpr[n] = bits;
        } else {
            self.fpr[n & !1] = bits;
        }
    }
}
