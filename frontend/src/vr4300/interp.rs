//! Reference interpreter for the integer subset of the VR4300 plus
//! COP0 moves, ERET and the COP1 loads and stores.

use dyna_core::cpu::{cause, cop0, status};
use dyna_core::insn::{cop, funct, op, regimm};
use dyna_core::{AccessKind, CpuContext, Insn, Width};
use dyna_exec::{GuestBus, Interpreter};

use super::exceptions;

type Routine = fn(Insn, &mut CpuContext, &mut dyn GuestBus);

/// Interprets one instruction at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vr4300Interpreter;

impl Interpreter for Vr4300Interpreter {
    fn execute(&mut self, insn: u32, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
        execute(insn, cpu, bus);
    }
}

/// Execute `word` at `cpu.pc`.
pub fn execute(word: u32, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let insn = Insn(word);
    let routine: Routine = match insn.op() {
        op::SPECIAL => special,
        op::REGIMM => regimm_branch,
        op::J | op::JAL => jump,
        op::BEQ | op::BNE | op::BLEZ | op::BGTZ | op::BEQL | op::BNEL | op::BLEZL | op::BGTZL => {
            branch_cmp
        }
        op::ADDI | op::ADDIU | op::SLTI | op::SLTIU | op::ANDI | op::ORI | op::XORI | op::LUI => {
            alu_imm
        }
        op::COP0 => cop0_op,
        op::COP1 => cop1_op,
        op::LB | op::LH | op::LW | op::LBU | op::LHU | op::LWU | op::LD => load,
        op::SB | op::SH | op::SW | op::SD => store,
        op::LWC1 | op::LDC1 | op::SWC1 | op::SDC1 => cop1_mem,
        op::CACHE => nop,
        _ => reserved,
    };
    routine(insn, cpu, bus);
}

#[inline]
fn sext32(v: u32) -> u64 {
    v as i32 as i64 as u64
}

#[inline]
fn next(cpu: &mut CpuContext) {
    cpu.pc = cpu.pc.wrapping_add(4);
}

#[inline]
fn ea(insn: Insn, cpu: &CpuContext) -> u32 {
    (cpu.gpr[insn.rs()] as i64).wrapping_add(insn.simm()) as u32
}

fn nop(_: Insn, cpu: &mut CpuContext, _: &mut dyn GuestBus) {
    next(cpu);
}

fn reserved(_: Insn, cpu: &mut CpuContext, _: &mut dyn GuestBus) {
    exceptions::raise(cpu, cause::EXC_RI);
}

/// Execute the delay slot of the branch at `cpu.pc`, then continue at
/// `target` if `taken`. Branch-likely forms skip the slot when not
/// taken.
fn do_branch(cpu: &mut CpuContext, bus: &mut dyn GuestBus, taken: bool, target: u32, likely: bool) {
    let pc = cpu.pc;
    let fallthrough = pc.wrapping_add(8);
    if !taken && likely {
        cpu.pc = fallthrough;
        return;
    }

    let slot = pc.wrapping_add(4);
    let word = bus.fetch(cpu, slot);
    if cpu.pc != pc {
        return;
    }
    cpu.pc = slot;
    cpu.delay_slot = true;
    execute(word, cpu, bus);
    cpu.delay_slot = false;
    if cpu.pc != fallthrough {
        // The delay slot raised an exception.
        return;
    }
    cpu.pc = if taken { target } else { fallthrough };
}

fn jump(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let pc = cpu.pc;
    if insn.op() == op::JAL {
        cpu.set_gpr(31, sext32(pc.wrapping_add(8)));
    }
    do_branch(cpu, bus, true, insn.jump_target(pc), false);
}

fn branch_cmp(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let rs = cpu.gpr[insn.rs()];
    let rt = cpu.gpr[insn.rt()];
    let (taken, likely) = match insn.op() {
        op::BEQ => (rs == rt, false),
        op::BNE => (rs != rt, false),
        op::BLEZ => ((rs as i64) <= 0, false),
        op::BGTZ => ((rs as i64) > 0, false),
        op::BEQL => (rs == rt, true),
        op::BNEL => (rs != rt, true),
        op::BLEZL => ((rs as i64) <= 0, true),
        _ => ((rs as i64) > 0, true),
    };
    let target = insn.branch_target(cpu.pc);
    do_branch(cpu, bus, taken, target, likely);
}

fn regimm_branch(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let rs = cpu.gpr[insn.rs()] as i64;
    let pc = cpu.pc;
    let (taken, likely, link) = match insn.rt() as u8 {
        regimm::BLTZ => (rs < 0, false, false),
        regimm::BGEZ => (rs >= 0, false, false),
        regimm::BLTZL => (rs < 0, true, false),
        regimm::BGEZL => (rs >= 0, true, false),
        regimm::BLTZAL => (rs < 0, false, true),
        regimm::BGEZAL => (rs >= 0, false, true),
        _ => return reserved(insn, cpu, bus),
    };
    if link {
        cpu.set_gpr(31, sext32(pc.wrapping_add(8)));
    }
    do_branch(cpu, bus, taken, insn.branch_target(pc), likely);
}

fn special(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let rs = cpu.gpr[insn.rs()];
    let rt = cpu.gpr[insn.rt()];
    let rd = insn.rd();
    let sa = insn.sa();
    let value = match insn.funct() {
        funct::SLL => sext32((rt as u32) << sa),
        funct::SRL => sext32((rt as u32) >> sa),
        funct::SRA => sext32(((rt as i32) >> sa) as u32),
        funct::SLLV => sext32((rt as u32) << (rs & 31)),
        funct::SRLV => sext32((rt as u32) >> (rs & 31)),
        funct::SRAV => sext32(((rt as i32) >> (rs & 31)) as u32),
        funct::JR | funct::JALR => {
            let pc = cpu.pc;
            if insn.funct() == funct::JALR {
                cpu.set_gpr(rd, sext32(pc.wrapping_add(8)));
            }
            return do_branch(cpu, bus, true, rs as u32, false);
        }
        funct::SYSCALL => return exceptions::raise(cpu, cause::EXC_SYS),
        funct::BREAK => return exceptions::raise(cpu, cause::EXC_BP),
        funct::SYNC => return next(cpu),
        funct::MFHI => cpu.hi,
        funct::MFLO => cpu.lo,
        funct::MTHI => {
            cpu.hi = rs;
            return next(cpu);
        }
        funct::MTLO => {
            cpu.lo = rs;
            return next(cpu);
        }
        funct::MULT => {
            let p = (rs as i32 as i64).wrapping_mul(rt as i32 as i64);
            cpu.lo = sext32(p as u32);
            cpu.hi = sext32((p >> 32) as u32);
            return next(cpu);
        }
        funct::MULTU => {
            let p = (rs as u32 as u64).wrapping_mul(rt as u32 as u64);
            cpu.lo = sext32(p as u32);
            cpu.hi = sext32((p >> 32) as u32);
            return next(cpu);
        }
        funct::DIV => {
            let (n, d) = (rs as i32, rt as i32);
            if d != 0 {
                cpu.lo = sext32(n.wrapping_div(d) as u32);
                cpu.hi = sext32(n.wrapping_rem(d) as u32);
            }
            return next(cpu);
        }
        funct::DIVU => {
            let (n, d) = (rs as u32, rt as u32);
            if d != 0 {
                cpu.lo = sext32(n / d);
                cpu.hi = sext32(n % d);
            }
            return next(cpu);
        }
        funct::ADD => match (rs as i32).checked_add(rt as i32) {
            Some(v) => sext32(v as u32),
            None => return exceptions::raise(cpu, cause::EXC_OV),
        },
        funct::ADDU => sext32((rs as u32).wrapping_add(rt as u32)),
        funct::SUB => match (rs as i32).checked_sub(rt as i32) {
            Some(v) => sext32(v as u32),
            None => return exceptions::raise(cpu, cause::EXC_OV),
        },
        funct::SUBU => sext32((rs as u32).wrapping_sub(rt as u32)),
        funct::AND => rs & rt,
        funct::OR => rs | rt,
        funct::XOR => rs ^ rt,
        funct::NOR => !(rs | rt),
        funct::SLT => ((rs as i64) < (rt as i64)) as u64,
        funct::SLTU => (rs < rt) as u64,
        _ => return reserved(insn, cpu, bus),
    };
    cpu.set_gpr(rd, value);
    next(cpu);
}

fn alu_imm(insn: Insn, cpu: &mut CpuContext, _: &mut dyn GuestBus) {
    let rs = cpu.gpr[insn.rs()];
    let simm = insn.simm();
    let uimm = insn.imm() as u64;
    let value = match insn.op() {
        op::ADDI => match (rs as i32).checked_add(simm as i32) {
            Some(v) => sext32(v as u32),
            None => return exceptions::raise(cpu, cause::EXC_OV),
        },
        op::ADDIU => sext32((rs as u32).wrapping_add(simm as u32)),
        op::SLTI => ((rs as i64) < simm) as u64,
        op::SLTIU => (rs < simm as u64) as u64,
        op::ANDI => rs & uimm,
        op::ORI => rs | uimm,
        op::XORI => rs ^ uimm,
        _ => sext32((insn.imm() as u32) << 16),
    };
    cpu.set_gpr(insn.rt(), value);
    next(cpu);
}

fn load(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let addr = ea(insn, cpu);
    let pc = cpu.pc;
    let kind = match insn.op() {
        op::LB => AccessKind::Lb,
        op::LBU => AccessKind::Lbu,
        op::LH => AccessKind::Lh,
        op::LHU => AccessKind::Lhu,
        op::LW => AccessKind::Lw,
        op::LWU => AccessKind::Lwu,
        _ => AccessKind::Ld,
    };
    let raw = bus.read(cpu, addr, kind.width());
    if cpu.pc != pc {
        return;
    }
    cpu.set_gpr(insn.rt(), kind.extend(raw));
    next(cpu);
}

fn store(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let addr = ea(insn, cpu);
    let pc = cpu.pc;
    let width = match insn.op() {
        op::SB => Width::Byte,
        op::SH => Width::Half,
        op::SW => Width::Word,
        _ => Width::Double,
    };
    let value = cpu.gpr[insn.rt()] & width.mask();
    bus.write(cpu, addr, width, value);
    if cpu.pc == pc {
        next(cpu);
    }
}

/// Raise "coprocessor 1 unusable" unless Status.CU1 is set.
fn require_cop1(cpu: &mut CpuContext) -> bool {
    if cpu.cop1_usable() {
        return true;
    }
    let c = cpu.cop0[cop0::CAUSE] & !(cause::EXC_CODE_MASK | cause::CE_MASK);
    cpu.cop0[cop0::CAUSE] = c | cause::COP1_UNUSABLE;
    exceptions::exception_general(cpu);
    false
}

fn cop1_mem(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    if !require_cop1(cpu) {
        return;
    }
    let addr = ea(insn, cpu);
    let pc = cpu.pc;
    let ft = insn.rt();
    match insn.op() {
        op::LWC1 => {
            let raw = bus.read(cpu, addr, Width::Word);
            if cpu.pc != pc {
                return;
            }
            cpu.set_fpr_single_bits(ft, raw as u32);
        }
        op::LDC1 => {
            let raw = bus.read(cpu, addr, Width::Double);
            if cpu.pc != pc {
                return;
            }
            cpu.set_fpr_double_bits(ft, raw);
        }
        op::SWC1 => {
            let value = cpu.fpr_single_bits(ft) as u64;
            bus.write(cpu, addr, Width::Word, value);
            if cpu.pc != pc {
                return;
            }
        }
        _ => {
            let value = cpu.fpr_double_bits(ft);
            bus.write(cpu, addr, Width::Double, value);
            if cpu.pc != pc {
                return;
            }
        }
    }
    next(cpu);
}

fn cop1_op(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    if require_cop1(cpu) {
        reserved(insn, cpu, bus);
    }
}

fn cop0_op(insn: Insn, cpu: &mut CpuContext, bus: &mut dyn GuestBus) {
    let rd = insn.rd();
    match insn.rs() as u8 {
        cop::MF => {
            cpu.set_gpr(insn.rt(), sext32(cpu.cop0[rd]));
            next(cpu);
        }
        cop::MT => {
            let value = cpu.gpr[insn.rt()] as u32;
            match rd {
                cop0::COMPARE => {
                    cpu.cop0[cop0::CAUSE] &= !cause::IP7;
                    cpu.cop0[rd] = value;
                }
                cop0::CAUSE => {
                    // Only the software interrupt bits are writable.
                    let sw = 0x3 << 8;
                    cpu.cop0[rd] = (cpu.cop0[rd] & !sw) | (value & sw);
                }
                _ => cpu.cop0[rd] = value,
            }
            next(cpu);
        }
        cop::CO if insn.funct() == cop::ERET => {
            let sr = cpu.cop0[cop0::STATUS];
            if sr & status::ERL != 0 {
                cpu.pc = cpu.cop0[cop0::ERROR_EPC];
                cpu.cop0[cop0::STATUS] = sr & !status::ERL;
            } else {
                cpu.pc = cpu.cop0[cop0::EPC];
                cpu.cop0[cop0::STATUS] = sr & !status::EXL;
            }
        }
        cop::CO => next(cpu),
        _ => reserved(insn, cpu, bus),
    }
}
