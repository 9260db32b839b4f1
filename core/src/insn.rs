//! VR4300 instruction field decoding and static control-flow shape.

use modular_bitfield::{bitfield, specifiers::*};

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct IType {
    pub imm: B16,
    pub rt: B5,
    pub rs: B5,
    pub op: B6,
}

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct JType {
    pub target: B26,
    pub op: B6,
}

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct RType {
    pub funct: B6,
    pub sa: B5,
    pub rd: B5,
    pub rt: B5,
    pub rs: B5,
    pub op: B6,
}

/// Primary opcodes.
pub mod op {
    pub const SPECIAL: u8 = 0;
    pub const REGIMM: u8 = 1;
    pub const J: u8 = 2;
    pub const JAL: u8 = 3;
    pub const BEQ: u8 = 4;
    pub const BNE: u8 = 5;
    pub const BLEZ: u8 = 6;
    pub const BGTZ: u8 = 7;
    pub const ADDI: u8 = 8;
    pub const ADDIU: u8 = 9;
    pub const SLTI: u8 = 10;
    pub const SLTIU: u8 = 11;
    pub const ANDI: u8 = 12;
    pub const ORI: u8 = 13;
    pub const XORI: u8 = 14;
    pub const LUI: u8 = 15;
    pub const COP0: u8 = 16;
    pub const COP1: u8 = 17;
    pub const BEQL: u8 = 20;
    pub const BNEL: u8 = 21;
    pub const BLEZL: u8 = 22;
    pub const BGTZL: u8 = 23;
    pub const LB: u8 = 32;
    pub const LH: u8 = 33;
    pub const LW: u8 = 35;
    pub const LBU: u8 = 36;
    pub const LHU: u8 = 37;
    pub const LWU: u8 = 39;
    pub const SB: u8 = 40;
    pub const SH: u8 = 41;
    pub const SW: u8 = 43;
    pub const CACHE: u8 = 47;
    pub const LWC1: u8 = 49;
    pub const LDC1: u8 = 53;
    pub const LD: u8 = 55;
    pub const SWC1: u8 = 57;
    pub const SDC1: u8 = 61;
    pub const SD: u8 = 63;
}

/// SPECIAL function codes.
pub mod funct {
    pub const SLL: u8 = 0;
    pub const SRL: u8 = 2;
    pub const SRA: u8 = 3;
    pub const SLLV: u8 = 4;
    pub const SRLV: u8 = 6;
    pub const SRAV: u8 = 7;
    pub const JR: u8 = 8;
    pub const JALR: u8 = 9;
    pub const SYSCALL: u8 = 12;
    pub const BREAK: u8 = 13;
    pub const SYNC: u8 = 15;
    pub const MFHI: u8 = 16;
    pub const MTHI: u8 = 17;
    pub const MFLO: u8 = 18;
    pub const MTLO: u8 = 19;
    pub const MULT: u8 = 24;
    pub const MULTU: u8 = 25;
    pub const DIV: u8 = 26;
    pub const DIVU: u8 = 27;
    pub const ADD: u8 = 32;
    pub const ADDU: u8 = 33;
    pub const SUB: u8 = 34;
    pub const SUBU: u8 = 35;
    pub const AND: u8 = 36;
    pub const OR: u8 = 37;
    pub const XOR: u8 = 38;
    pub const NOR: u8 = 39;
    pub const SLT: u8 = 42;
    pub const SLTU: u8 = 43;
}

/// REGIMM `rt` codes.
pub mod regimm {
    pub const BLTZ: u8 = 0;
    pub const BGEZ: u8 = 1;
    pub const BLTZL: u8 = 2;
    pub const BGEZL: u8 = 3;
    pub const BLTZAL: u8 = 16;
    pub const BGEZAL: u8 = 17;
}

/// COP0 `rs` codes and the CO function codes.
pub mod cop {
    pub const MF: u8 = 0;
    pub const MT: u8 = 4;
    pub const CO: u8 = 16;
    pub const ERET: u8 = 0x18;
}

/// A raw instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn(pub u32);

impl Insn {
    #[inline]
    fn i(self) -> IType {
        IType::from_bytes(self.0.to_le_bytes())
    }

    #[inline]
    fn r(self) -> RType {
        RType::from_bytes(self.0.to_le_bytes())
    }

    #[inline]
    pub fn op(self) -> u8 {
        self.r().op()
    }

    #[inline]
    pub fn rs(self) -> usize {
        self.r().rs() as usize
    }

    #[inline]
    pub fn rt(self) -> usize {
        self.r().rt() as usize
    }

    #[inline]
    pub fn rd(self) -> usize {
        self.r().rd() as usize
    }

    #[inline]
    pub fn sa(self) -> u32 {
        self.r().sa() as u32
    }

    #[inline]
    pub fn funct(self) -> u8 {
        self.r().funct()
    }

    #[inline]
    pub fn imm(self) -> u16 {
        self.i().imm()
    }

    /// Sign-extended immediate.
    #[inline]
    pub fn simm(self) -> i64 {
        self.imm() as i16 as i64
    }

    #[inline]
    pub fn target(self) -> u32 {
        JType::from_bytes(self.0.to_le_bytes()).target()
    }

    /// Destination of a conditional branch at `pc`.
    #[inline]
    pub fn branch_target(self, pc: u32) -> u32 {
        pc.wrapping_add(4)
            .wrapping_add(((self.imm() as i16 as i32) << 2) as u32)
    }

    /// Destination of a J/JAL at `pc`.
    #[inline]
    pub fn jump_target(self, pc: u32) -> u32 {
        (pc.wrapping_add(4) & 0xF000_0000) | (self.target() << 2)
    }
}

/// How an instruction leaves the straight-line path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Falls through to `pc + 4`.
    Next,
    /// Conditional branch with a delay slot.
    Branch { taken: u32, fallthrough: u32 },
    /// Unconditional direct jump with a delay slot.
    Jump { target: u32 },
    /// Register jump with a delay slot.
    Indirect,
    /// Leaves without a delay slot (traps, ERET).
    Exit,
}

/// Classify the instruction at `pc`.
pub fn flow(insn: Insn, pc: u32) -> Flow {
    let branch = || Flow::Branch {
        taken: insn.branch_target(pc),
        fallthrough: pc.wrapping_add(8),
    };
    match insn.op() {
        op::SPECIAL => match insn.funct() {
            funct::JR | funct::JALR => Flow::Indirect,
            funct::SYSCALL | funct::BREAK => Flow::Exit,
            _ => Flow::Next,
        },
        op::REGIMM => match insn.rt() as u8 {
            regimm::BLTZ
            | regimm::BGEZ
            | regimm::BLTZL
            | regimm::BGEZL
            | regimm::BLTZAL
            | regimm::BGEZAL => branch(),
            _ => Flow::Next,
        },
        op::J | op::JAL => Flow::Jump {
            target: insn.jump_target(pc),
        },
        op::BEQ
        | op::BNE
        | op::BLEZ
        | op::BGTZ
        | op::BEQL
        | op::BNEL
        | op::BLEZL
        | op::BGTZL => branch(),
        op::COP0 if insn.rs() as u8 == cop::CO && insn.funct() == cop::ERET => Flow::Exit,
        _ => Flow::Next,
    }
}
