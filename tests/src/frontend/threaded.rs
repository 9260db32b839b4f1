use dyna_backend::X86_64Abi;
use dyna_core::addr::SEGMENT_MASK;
use dyna_core::cpu::{cause, cop0, status};
use dyna_core::insn::op;
use dyna_core::{Backing, TranslateError};
use dyna_exec::{Dynarec, DynarecConfig, GuestCode, Translator};
use dyna_frontend::vr4300::exceptions::GENERAL_VECTOR;
use dyna_frontend::vr4300::{FlatMachine, ThreadedTranslator, Vr4300Exceptions, Vr4300Interpreter};

use super::*;

type Vr4300Dynarec = Dynarec<FlatMachine, Vr4300Interpreter, ThreadedTranslator, X86_64Abi>;

fn guest_code<'a>(machine: &'a FlatMachine, end: u32, max_insns: u32) -> GuestCode<'a> {
    GuestCode {
        block_start: BASE,
        block_end: end,
        backing: Some(Backing::Ram {
            phys: BASE & SEGMENT_MASK,
        }),
        max_insns,
        machine,
    }
}

fn machine_with(words: &[u32], timer: u32) -> FlatMachine {
    let mut machine = FlatMachine::new(Vr4300Exceptions::new(timer));
    assert!(machine.load(BASE & SEGMENT_MASK, &image(words)));
    machine
}

/// Halt as soon as an exception reaches the general vector.
fn halt_at_vector(machine: &mut FlatMachine) {
    let handler = [lui(9, 0xBFF0), sw(0, 9, 0), j(GENERAL_VECTOR + 8), NOP];
    assert!(machine.load(GENERAL_VECTOR & SEGMENT_MASK, &image(&handler)));
}

fn dynarec(machine: FlatMachine) -> Vr4300Dynarec {
    let config = DynarecConfig {
        code_cache_size: 1 << 20,
        dispatch_limit: Some(1000),
        ..DynarecConfig::default()
    };
    let mut d = Dynarec::new(
        machine,
        Vr4300Interpreter,
        ThreadedTranslator::new().unwrap(),
        X86_64Abi::new(),
        config,
    )
    .unwrap();
    let timer = d.machine().exceptions().clone();
    timer.arm(d.cpu_mut());
    d
}

#[test]
fn test_function_ends_after_delay_slot() {
    let machine = machine_with(&countdown_program(), 1000);
    let mut t = ThreadedTranslator::new().unwrap();

    let c = t.compile(&guest_code(&machine, BASE + 0x1000, 1024), BASE).unwrap();
    assert_eq!(c.start_addr, BASE);
    assert_eq!(c.end_addr, BASE + 0x10);
    let addrs: Vec<u32> = c.entries.iter().map(|&(addr, _)| addr).collect();
    assert_eq!(addrs, vec![BASE, BASE + 4, BASE + 8]);
    assert_eq!(c.entries[0].1, 0);
    assert!(c.entries.windows(2).all(|w| w[0].1 < w[1].1));
    assert!(c.code.len() > c.entries[2].1);

    let c = t.compile(&guest_code(&machine, BASE + 0x1000, 1024), BASE + 0x10).unwrap();
    assert_eq!(c.end_addr, BASE + 0x20);
    assert_eq!(c.entries.len(), 3);
}

#[test]
fn test_function_stops_at_limits() {
    let machine = machine_with(&countdown_program(), 1000);
    let mut t = ThreadedTranslator::new().unwrap();

    let c = t.compile(&guest_code(&machine, BASE + 0x1000, 1), BASE).unwrap();
    assert_eq!(c.end_addr, BASE + 4);
    assert_eq!(c.entries.len(), 1);

    // End of the block.
    let c = t.compile(&guest_code(&machine, BASE + 8, 1024), BASE).unwrap();
    assert_eq!(c.end_addr, BASE + 8);
    assert_eq!(c.entries.len(), 2);
}

#[test]
fn test_untranslatable_source() {
    let machine = machine_with(&countdown_program(), 1000);
    let mut t = ThreadedTranslator::new().unwrap();

    let mut src = guest_code(&machine, BASE + 0x1000, 1024);
    assert_eq!(
        t.compile(&src, BASE + 0x1000).unwrap_err(),
        TranslateError::Fetch(BASE + 0x1000)
    );
    src.backing = None;
    assert_eq!(t.compile(&src, BASE).unwrap_err(), TranslateError::NoCode(BASE));
}

#[test]
fn test_countdown_runs_to_halt() {
    let mut d = dynarec(machine_with(&countdown_program(), 0x0100_0000));
    assert_eq!(d.run(BASE), Ok(BASE + 0x18));

    let cpu = d.cpu();
    assert!(cpu.stop);
    assert_eq!(cpu.gpr[8], 0);
    assert_eq!(cpu.gpr[9], 0xFFFF_FFFF_BFF0_0000);

    let stats = d.stats();
    assert_eq!(stats.dispatches, 3);
    assert_eq!(stats.compiles, 2);
    assert_eq!(stats.cache_hits, 1);
    // The loop back edge links to itself, its exit to the tail.
    assert_eq!(stats.links_patched, 2);
    // The halt store goes through the memory callback.
    assert_eq!(stats.interpreted, 13);
    assert_eq!(stats.mem_accesses, 1);
    assert_eq!(stats.interrupts, 0);
    assert!(d.fault().is_none());
}

#[test]
fn test_due_timer_breaks_links() {
    // Every checkpoint finds the timer due, so every exit comes back to
    // the driver and nothing is linked.
    let mut d = dynarec(machine_with(&countdown_program(), 4));
    assert_eq!(d.run(BASE), Ok(BASE + 0x18));
    assert_eq!(d.cpu().gpr[8], 0);

    let stats = d.stats();
    assert_eq!(stats.dispatches, 6);
    assert_eq!(stats.compiles, 2);
    assert_eq!(stats.cache_hits, 4);
    assert_eq!(stats.links_patched, 0);
    assert_eq!(stats.interrupts, 6);
    assert_eq!(stats.interpreted, 13);
}

#[test]
fn test_runs_from_rom() {
    let mut machine = FlatMachine::default();
    machine.set_rom(image(&[lui(9, 0xBFF0), sw(0, 9, 0), j(0xB000_0008), NOP]));
    let mut d = dynarec(machine);

    assert_eq!(d.run(0xB000_0000), Ok(0xB000_0008));
    assert!(d.cpu().stop);
    assert_eq!(d.stats().compiles, 1);
    assert_eq!(d.stats().interpreted, 2);
    assert_eq!(d.stats().mem_accesses, 1);
}

#[test]
fn test_rerun_reuses_code() {
    let mut d = dynarec(machine_with(&countdown_program(), 0x0100_0000));
    d.run(BASE).unwrap();
    d.cpu_mut().stop = false;
    assert_eq!(d.run(BASE), Ok(BASE + 0x18));
    assert_eq!(d.stats().compiles, 2);
    assert_eq!(d.cpu().gpr[8], 0);
}

#[test]
fn test_reloaded_image_recompiles() {
    let mut d = dynarec(machine_with(&countdown_program(), 0x0100_0000));
    d.run(BASE).unwrap();
    let freed = d.stats().functions_freed;

    let program = image(&[addiu(8, 0, 7), lui(9, 0xBFF0), sw(0, 9, 0), j(BASE + 0x0C), NOP]);
    assert!(d.machine_mut().load(BASE & SEGMENT_MASK, &program));
    d.mark_dirty(BASE, program.len() as u32);
    d.cpu_mut().stop = false;

    assert_eq!(d.run(BASE), Ok(BASE + 0x0C));
    assert_eq!(d.cpu().gpr[8], 7);
    assert_eq!(d.stats().compiles, 3);
    // Both functions of the old image went with the page.
    assert_eq!(d.stats().functions_freed, freed + 2);
}

#[test]
fn test_store_into_linked_target_takes_effect() {
    // The function at 0x20 rewrites the first word of the one at 0x40
    // into `addiu t0, t0, k` and jumps there. Once both are linked, the
    // jump must still see each new word.
    let program = [
        addiu(8, 0, 0),       // 0x00: t0 = 0
        addiu(11, 0, 0),      // 0x04: k = 0
        addiu(12, 0, 5),      // 0x08
        lui(13, 0x8000),      // 0x0c
        j(BASE + 0x20),       // 0x10
        NOP,                  // 0x14
        NOP,                  // 0x18
        NOP,                  // 0x1c
        addiu(11, 11, 1),     // 0x20: k += 1
        lui(14, 0x2508),      // 0x24: addiu t0, t0, 0
        addu(14, 14, 11),     // 0x28
        sw(14, 13, 0x1040),   // 0x2c
        j(BASE + 0x40),       // 0x30
        NOP,                  // 0x34
        NOP,                  // 0x38
        NOP,                  // 0x3c
        NOP,                  // 0x40: rewritten
        bne(11, 12, -10),     // 0x44: back to 0x20
        NOP,                  // 0x48
        lui(9, 0xBFF0),       // 0x4c
        sw(0, 9, 0),          // 0x50
        j(BASE + 0x54),       // 0x54
        NOP,                  // 0x58
    ];
    let mut d = dynarec(machine_with(&program, 0x0100_0000));

    assert_eq!(d.run(BASE), Ok(BASE + 0x54));
    assert_eq!(d.cpu().gpr[11], 5);
    assert_eq!(d.cpu().gpr[8], 1 + 2 + 3 + 4 + 5);
    // Every store after the first hits compiled code.
    assert_eq!(d.stats().functions_freed, 4);
    assert!(d.stats().links_patched > 0);
    assert!(d.fault().is_none());
}

#[test]
fn test_loads_through_memory_callback() {
    let program = [
        lui(10, 0x8000),      // 0x00
        lw(11, 10, 0x1040),   // 0x04
        lbu(12, 10, 0x1041),  // 0x08
        lw(13, 10, 0x1042),   // 0x0c: unaligned
        addiu(14, 0, 1),      // 0x10
        j(BASE + 0x14),       // 0x14
        NOP,                  // 0x18
        NOP,                  // 0x1c
        NOP,                  // 0x20
        NOP,                  // 0x24
        NOP,                  // 0x28
        NOP,                  // 0x2c
        NOP,                  // 0x30
        NOP,                  // 0x34
        NOP,                  // 0x38
        NOP,                  // 0x3c
        0x8012_3456,          // 0x40
    ];
    let mut machine = machine_with(&program, 0x0100_0000);
    halt_at_vector(&mut machine);
    let mut d = dynarec(machine);

    assert_eq!(d.run(BASE), Ok(GENERAL_VECTOR + 8));
    let cpu = d.cpu();
    assert_eq!(cpu.gpr[11], 0xFFFF_FFFF_8012_3456);
    assert_eq!(cpu.gpr[12], 0x12);
    assert_eq!(cpu.gpr[13], 0);
    // The faulting load left the function before the next instruction.
    assert_eq!(cpu.gpr[14], 0);
    assert_eq!(cpu.cop0[cop0::EPC], BASE + 0x0c);
    assert_eq!(cpu.cop0[cop0::BAD_VADDR], BASE + 0x42);
    assert_eq!(
        (cpu.cop0[cop0::CAUSE] & cause::EXC_CODE_MASK) >> cause::EXC_CODE_SHIFT,
        cause::EXC_ADEL
    );
    // Three loads plus the halt store.
    assert_eq!(d.stats().mem_accesses, 4);
}

#[test]
fn test_cop1_access_traps_when_unusable() {
    let program = [
        addiu(8, 0, 1),                    // 0x00
        mips_i(op::LWC1, 0, 2, 0x100),     // 0x04
        addiu(8, 0, 2),                    // 0x08
        j(BASE + 0x0c),                    // 0x0c
        NOP,                               // 0x10
    ];
    let mut machine = machine_with(&program, 0x0100_0000);
    halt_at_vector(&mut machine);
    let mut d = dynarec(machine);
    d.cpu_mut().cop0[cop0::STATUS] &= !status::CU1;

    assert_eq!(d.run(BASE), Ok(GENERAL_VECTOR + 8));
    let cpu = d.cpu();
    assert_eq!(cpu.gpr[8], 1);
    assert_eq!(cpu.cop0[cop0::EPC], BASE + 4);
    assert_eq!(
        cpu.cop0[cop0::CAUSE] & (cause::EXC_CODE_MASK | cause::CE_MASK),
        cause::COP1_UNUSABLE
    );
    // Only the halt store reached memory.
    assert_eq!(d.stats().mem_accesses, 1);
}

#[test]
fn test_cop1_stores_read_register_halves() {
    let program = [
        lui(10, 0x8000),                   // 0x00
        mips_i(op::SWC1, 10, 3, 0x1080),   // 0x04: upper half of f2
        mips_i(op::SWC1, 10, 2, 0x1084),   // 0x08: lower half of f2
        mips_i(op::SDC1, 10, 3, 0x1088),   // 0x0c: f2 as a whole
        lui(9, 0xBFF0),                    // 0x10
        sw(0, 9, 0),                       // 0x14
        j(BASE + 0x18),                    // 0x18
        NOP,                               // 0x1c
    ];
    let mut d = dynarec(machine_with(&program, 0x0100_0000));
    d.cpu_mut().cop0[cop0::STATUS] &= !status::FR;
    d.cpu_mut().fpr[2] = 0x1122_3344_5566_7788;

    assert_eq!(d.run(BASE), Ok(BASE + 0x18));
    let phys = ((BASE + 0x80) & SEGMENT_MASK) as usize;
    assert_eq!(
        &d.machine().rdram()[phys..phys + 16],
        &[
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
            0x77, 0x88
        ]
    );
    assert_eq!(d.stats().mem_accesses, 4);
}
