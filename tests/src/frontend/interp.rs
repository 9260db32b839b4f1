use dyna_core::addr::SEGMENT_MASK;
use dyna_core::cpu::{cause, cop0, status};
use dyna_core::insn::{cop, funct, op, regimm};
use dyna_core::{CpuContext, Width};
use dyna_exec::runtime::CoherentBus;
use dyna_exec::{ExecStats, TranslationCache};
use dyna_frontend::vr4300::exceptions::GENERAL_VECTOR;
use dyna_frontend::vr4300::interp::execute;
use dyna_frontend::vr4300::FlatMachine;

use super::*;

/// CPU and machine for driving the interpreter directly.
struct Guest {
    cpu: CpuContext,
    machine: FlatMachine,
    cache: TranslationCache,
    stats: ExecStats,
}

impl Guest {
    fn new(words: &[u32]) -> Self {
        let mut machine = FlatMachine::default();
        assert!(machine.load(BASE & SEGMENT_MASK, &image(words)));
        let mut cpu = CpuContext::new();
        cpu.pc = BASE;
        Self {
            cpu,
            machine,
            cache: TranslationCache::new(),
            stats: ExecStats::default(),
        }
    }

    /// Execute the instruction at pc.
    fn step(&mut self) {
        let word = self
            .machine
            .read_phys(self.cpu.pc & SEGMENT_MASK, Width::Word) as u32;
        self.exec(word);
    }

    /// Execute `word` as if it were at pc.
    fn exec(&mut self, word: u32) {
        let mut bus = CoherentBus {
            machine: &mut self.machine,
            cache: &mut self.cache,
            stats: &mut self.stats,
        };
        execute(word, &mut self.cpu, &mut bus);
    }

    fn exc_code(&self) -> u32 {
        (self.cpu.cop0[cop0::CAUSE] & cause::EXC_CODE_MASK) >> cause::EXC_CODE_SHIFT
    }
}

fn cop0_move(rs: u8, rt: u32, rd: usize) -> u32 {
    mips_i(op::COP0, rs as u32, rt, (rd as i32) << 11)
}

#[test]
fn test_alu_immediate() {
    let mut g = Guest::new(&[]);
    g.exec(lui(8, 0x8000));
    assert_eq!(g.cpu.gpr[8], 0xFFFF_FFFF_8000_0000);
    g.exec(mips_i(op::ORI, 8, 8, 0x1234));
    assert_eq!(g.cpu.gpr[8], 0xFFFF_FFFF_8000_1234);
    g.exec(addiu(9, 0, -3));
    assert_eq!(g.cpu.gpr[9], (-3i64) as u64);
    g.exec(mips_i(op::SLTIU, 9, 10, 5));
    assert_eq!(g.cpu.gpr[10], 0);
    g.exec(mips_i(op::SLTI, 9, 10, 5));
    assert_eq!(g.cpu.gpr[10], 1);
    g.exec(mips_i(op::ANDI, 9, 11, 0xFF));
    assert_eq!(g.cpu.gpr[11], 0xFD);
    assert_eq!(g.cpu.pc, BASE + 24);
}

#[test]
fn test_alu_register() {
    let mut g = Guest::new(&[]);
    g.cpu.gpr[8] = 0xFFFF_FFFF_8000_1234;
    g.exec(mips_r(0, 8, 9, 4, funct::SRA));
    assert_eq!(g.cpu.gpr[9], 0xFFFF_FFFF_F800_0123);
    g.exec(mips_r(0, 8, 10, 4, funct::SRL));
    assert_eq!(g.cpu.gpr[10], 0x0800_0123);
    g.exec(mips_r(0, 8, 11, 4, funct::SLL));
    assert_eq!(g.cpu.gpr[11], 0x0001_2340);
    g.exec(mips_r(8, 0, 12, 0, funct::SLT));
    assert_eq!(g.cpu.gpr[12], 1);
    g.exec(mips_r(0, 8, 13, 0, funct::SLTU));
    assert_eq!(g.cpu.gpr[13], 1);
    g.exec(mips_r(0, 0, 14, 0, funct::NOR));
    assert_eq!(g.cpu.gpr[14], u64::MAX);
    g.exec(addu(15, 8, 8));
    assert_eq!(g.cpu.gpr[15], 0x2468);
}

#[test]
fn test_zero_register_is_hardwired() {
    let mut g = Guest::new(&[]);
    g.exec(addiu(0, 0, 5));
    assert_eq!(g.cpu.gpr[0], 0);
    assert_eq!(g.cpu.pc, BASE + 4);
}

#[test]
fn test_add_overflow_traps() {
    let mut g = Guest::new(&[]);
    g.cpu.gpr[8] = 0x7FFF_FFFF;
    g.cpu.gpr[9] = 0x55;
    g.exec(mips_r(8, 8, 9, 0, funct::ADD));
    assert_eq!(g.cpu.gpr[9], 0x55);
    assert_eq!(g.cpu.pc, GENERAL_VECTOR);
    assert_eq!(g.cpu.cop0[cop0::EPC], BASE);
    assert_eq!(g.exc_code(), cause::EXC_OV);
}

#[test]
fn test_mult_and_div() {
    let mut g = Guest::new(&[]);
    g.cpu.gpr[8] = (-6i64) as u64;
    g.cpu.gpr[9] = 4;
    g.exec(mips_r(8, 9, 0, 0, funct::MULT));
    assert_eq!(g.cpu.lo, (-24i64) as u64);
    assert_eq!(g.cpu.hi, u64::MAX);

    g.exec(mips_r(8, 9, 0, 0, funct::DIV));
    assert_eq!(g.cpu.lo, (-1i64) as u64);
    assert_eq!(g.cpu.hi, (-2i64) as u64);
    g.exec(mips_r(0, 0, 10, 0, funct::MFLO));
    assert_eq!(g.cpu.gpr[10], (-1i64) as u64);

    // Division by zero leaves HI/LO alone.
    g.exec(mips_r(8, 0, 0, 0, funct::DIVU));
    assert_eq!(g.cpu.lo, (-1i64) as u64);
    assert_eq!(g.cpu.hi, (-2i64) as u64);
}

#[test]
fn test_branch_runs_delay_slot() {
    let mut g = Guest::new(&[
        mips_i(op::BEQ, 0, 0, 2), // beq zero, zero, +2
        addiu(8, 0, 1),           // delay slot
        addiu(8, 0, 2),
        addiu(9, 0, 3),
    ]);
    g.step();
    assert_eq!(g.cpu.pc, BASE + 12);
    assert_eq!(g.cpu.gpr[8], 1);
    assert!(!g.cpu.delay_slot);
    g.step();
    assert_eq!(g.cpu.gpr[9], 3);
}

#[test]
fn test_branch_likely_not_taken_skips_slot() {
    let mut g = Guest::new(&[mips_i(op::BEQL, 8, 0, 2), addiu(9, 0, 7)]);
    g.cpu.gpr[8] = 1;
    g.step();
    assert_eq!(g.cpu.pc, BASE + 8);
    assert_eq!(g.cpu.gpr[9], 0);

    // Taken: the slot runs.
    let mut g = Guest::new(&[mips_i(op::BEQL, 8, 0, 2), addiu(9, 0, 7)]);
    g.step();
    assert_eq!(g.cpu.pc, BASE + 12);
    assert_eq!(g.cpu.gpr[9], 7);
}

#[test]
fn test_regimm_branch_and_link() {
    let mut g = Guest::new(&[mips_i(op::REGIMM, 8, regimm::BGEZAL as u32, 4), NOP]);
    g.step();
    assert_eq!(g.cpu.pc, BASE + 20);
    assert_eq!(g.cpu.gpr[31], 0xFFFF_FFFF_8000_1008);
}

#[test]
fn test_jal_and_jalr_link() {
    let mut g = Guest::new(&[mips_j(op::JAL, BASE + 0x100), NOP]);
    g.step();
    assert_eq!(g.cpu.pc, BASE + 0x100);
    assert_eq!(g.cpu.gpr[31], 0xFFFF_FFFF_8000_1008);

    let mut g = Guest::new(&[mips_r(8, 0, 31, 0, funct::JALR), NOP]);
    g.cpu.gpr[8] = 0xFFFF_FFFF_8000_1040;
    g.step();
    assert_eq!(g.cpu.pc, BASE + 0x40);
    assert_eq!(g.cpu.gpr[31], 0xFFFF_FFFF_8000_1008);
}

#[test]
fn test_fault_in_delay_slot_reports_branch() {
    let mut g = Guest::new(&[
        j(BASE + 0x100),
        mips_i(op::LW, 0, 8, 1), // lw t0, 1(zero)
    ]);
    g.step();
    assert_eq!(g.cpu.pc, GENERAL_VECTOR);
    assert_eq!(g.cpu.cop0[cop0::EPC], BASE);
    assert_ne!(g.cpu.cop0[cop0::CAUSE] & cause::BD, 0);
    assert_eq!(g.cpu.cop0[cop0::BAD_VADDR], 1);
    assert_eq!(g.exc_code(), cause::EXC_ADEL);
    assert!(!g.cpu.delay_slot);
}

#[test]
fn test_loads_and_stores() {
    let mut g = Guest::new(&[]);
    g.cpu.gpr[8] = 0xFFFF_FFFF_8000_2000;
    g.cpu.gpr[9] = 0x0102_0304_8586_8788;

    g.exec(mips_i(op::SD, 8, 9, 0));
    assert_eq!(
        &g.machine.rdram()[0x2000..0x2008],
        &[0x01, 0x02, 0x03, 0x04, 0x85, 0x86, 0x87, 0x88]
    );
    g.exec(mips_i(op::LW, 8, 10, 4));
    assert_eq!(g.cpu.gpr[10], 0xFFFF_FFFF_8586_8788);
    g.exec(mips_i(op::LWU, 8, 10, 4));
    assert_eq!(g.cpu.gpr[10], 0x8586_8788);
    g.exec(mips_i(op::LB, 8, 11, 4));
    assert_eq!(g.cpu.gpr[11], 0xFFFF_FFFF_FFFF_FF85);
    g.exec(mips_i(op::LBU, 8, 11, 4));
    assert_eq!(g.cpu.gpr[11], 0x85);
    g.exec(mips_i(op::LD, 8, 12, 0));
    assert_eq!(g.cpu.gpr[12], 0x0102_0304_8586_8788);

    g.exec(mips_i(op::SH, 8, 9, 8));
    assert_eq!(&g.machine.rdram()[0x2008..0x200A], &[0x87, 0x88]);
}

#[test]
fn test_misaligned_store_faults() {
    let mut g = Guest::new(&[]);
    g.cpu.gpr[8] = 0xFFFF_FFFF_8000_2002;
    g.exec(sw(0, 8, 0));
    assert_eq!(g.cpu.pc, GENERAL_VECTOR);
    assert_eq!(g.exc_code(), cause::EXC_ADES);
    assert_eq!(g.cpu.cop0[cop0::BAD_VADDR], 0x8000_2002);
}

#[test]
fn test_fpu_load_store() {
    let mut g = Guest::new(&[]);
    g.cpu.gpr[8] = 0xFFFF_FFFF_8000_2000;
    g.cpu.set_fpr_double_bits(2, 0x4009_21FB_5444_2D18);

    g.exec(mips_i(op::SDC1, 8, 2, 0));
    g.exec(mips_i(op::LWC1, 8, 4, 0));
    assert_eq!(g.cpu.fpr_single_bits(4), 0x4009_21FB);
    g.exec(mips_i(op::LDC1, 8, 6, 0));
    assert_eq!(g.cpu.fpr_double_bits(6), 0x4009_21FB_5444_2D18);
}

#[test]
fn test_cop1_unusable() {
    let mut g = Guest::new(&[]);
    g.cpu.cop0[cop0::STATUS] &= !status::CU1;
    g.exec(mips_i(op::LWC1, 0, 4, 0));
    assert_eq!(g.cpu.pc, GENERAL_VECTOR);
    assert_eq!(g.exc_code(), cause::EXC_CPU);
    assert_eq!(
        g.cpu.cop0[cop0::CAUSE] & cause::CE_MASK,
        1 << cause::CE_SHIFT
    );
}

#[test]
fn test_cop0_moves() {
    let mut g = Guest::new(&[]);
    g.cpu.cop0[cop0::CAUSE] |= cause::IP7;
    g.cpu.gpr[8] = 0x1234;
    g.exec(cop0_move(cop::MT, 8, cop0::COMPARE));
    assert_eq!(g.cpu.cop0[cop0::COMPARE], 0x1234);
    assert_eq!(g.cpu.cop0[cop0::CAUSE] & cause::IP7, 0);

    // Only the software interrupt bits of Cause are writable.
    g.cpu.gpr[8] = 0xFFFF_FFFF;
    g.exec(cop0_move(cop::MT, 8, cop0::CAUSE));
    assert_eq!(g.cpu.cop0[cop0::CAUSE], 0x300);

    g.cpu.cop0[cop0::EPC] = 0x8000_4000;
    g.exec(cop0_move(cop::MF, 9, cop0::EPC));
    assert_eq!(g.cpu.gpr[9], 0xFFFF_FFFF_8000_4000);
}

#[test]
fn test_eret() {
    let mut g = Guest::new(&[]);
    g.cpu.cop0[cop0::STATUS] |= status::EXL;
    g.cpu.cop0[cop0::EPC] = 0x8000_2000;
    g.exec(0x4200_0018);
    assert_eq!(g.cpu.pc, 0x8000_2000);
    assert_eq!(g.cpu.cop0[cop0::STATUS] & status::EXL, 0);

    g.cpu.cop0[cop0::STATUS] |= status::ERL;
    g.cpu.cop0[cop0::ERROR_EPC] = 0x8000_3000;
    g.exec(0x4200_0018);
    assert_eq!(g.cpu.pc, 0x8000_3000);
    assert_eq!(g.cpu.cop0[cop0::STATUS] & status::ERL, 0);
}

#[test]
fn test_trapping_instructions() {
    let mut g = Guest::new(&[]);
    g.exec(mips_r(0, 0, 0, 0, funct::BREAK));
    assert_eq!(g.exc_code(), cause::EXC_BP);

    let mut g = Guest::new(&[]);
    g.exec(0x7C00_0000);
    assert_eq!(g.exc_code(), cause::EXC_RI);
    assert_eq!(g.cpu.pc, GENERAL_VECTOR);
}
