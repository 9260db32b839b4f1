/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    /// Low 3 bits of the register encoding (for ModR/M).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether this register requires a REX prefix (R8-R15).
    #[inline]
    pub const fn needs_rex(self) -> bool {
        (self as u8) >= 8
    }
}

/// Frame pointer, see [`crate::JitFrame`].
pub const FRAME_REG: Reg = Reg::Rbp;
/// Guest GPR file.
pub const GPR_REG: Reg = Reg::Rbx;
/// Guest main memory base.
pub const MEM_BASE_REG: Reg = Reg::R12;
/// Packed handle of the function currently executing.
pub const FUNC_REG: Reg = Reg::R13;
/// Link slot, written by the link-exit stub.
pub const LINK_REG: Reg = Reg::R14;
/// Guest COP0 register file.
pub const COP0_REG: Reg = Reg::R15;

/// Callee-saved registers the trampoline preserves (System V ABI).
pub const CALLEE_SAVED: &[Reg] = &[Reg::Rbx, Reg::Rbp, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Function argument registers (System V AMD64 ABI).
pub const CALL_ARG_REGS: &[Reg] = &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

pub const STACK_ALIGN: usize = 16;

/// Pad after the pushes so generated code starts with the stack in
/// the state a freshly called function sees.
pub const STACK_ADDEND: usize = {
    let pushed = (1 + CALLEE_SAVED.len()) * 8;
    (STACK_ALIGN - pushed % STACK_ALIGN) % STACK_ALIGN
};
