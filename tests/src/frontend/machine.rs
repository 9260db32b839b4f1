use dyna_core::cpu::{cause, cop0};
use dyna_core::{Backing, CpuContext, Width};
use dyna_exec::Machine;
use dyna_frontend::vr4300::exceptions::GENERAL_VECTOR;
use dyna_frontend::vr4300::machine::{HALT_PHYS, RDRAM_SIZE};
use dyna_frontend::vr4300::{FlatMachine, Vr4300Exceptions};

use super::{image, BASE};

fn exc_code(cpu: &CpuContext) -> u32 {
    (cpu.cop0[cop0::CAUSE] & cause::EXC_CODE_MASK) >> cause::EXC_CODE_SHIFT
}

#[test]
fn test_load_bounds() {
    let mut m = FlatMachine::default();
    assert!(m.load(0x100, &[1, 2, 3, 4]));
    assert_eq!(&m.rdram()[0x100..0x104], &[1, 2, 3, 4]);
    assert!(!m.load(RDRAM_SIZE as u32 - 2, &[0; 4]));
}

#[test]
fn test_big_endian_access_through_both_segments() {
    let mut m = FlatMachine::default();
    let mut cpu = CpuContext::new();
    m.write(&mut cpu, 0x8000_0010, Width::Word, 0x1122_3344);
    assert_eq!(&m.rdram()[0x10..0x14], &[0x11, 0x22, 0x33, 0x44]);
    assert_eq!(m.read(&mut cpu, 0xA000_0010, Width::Half), 0x1122);
    assert_eq!(m.read(&mut cpu, 0x8000_0013, Width::Byte), 0x44);
    assert_eq!(m.read(&mut cpu, 0x8000_0010, Width::Double), 0x1122_3344_0000_0000);
    assert_eq!(cpu.pc, 0);
}

#[test]
fn test_misaligned_access_faults() {
    let mut m = FlatMachine::default();
    let mut cpu = CpuContext::new();
    cpu.pc = BASE;
    assert_eq!(m.read(&mut cpu, 0x8000_0002, Width::Word), 0);
    assert_eq!(cpu.pc, GENERAL_VECTOR);
    assert_eq!(cpu.cop0[cop0::BAD_VADDR], 0x8000_0002);
    assert_eq!(exc_code(&cpu), cause::EXC_ADEL);
}

#[test]
fn test_mapped_store_faults() {
    let mut m = FlatMachine::default();
    let mut cpu = CpuContext::new();
    cpu.pc = BASE;
    m.write(&mut cpu, 0xC000_0000, Width::Word, 1);
    assert_eq!(cpu.pc, GENERAL_VECTOR);
    assert_eq!(exc_code(&cpu), cause::EXC_ADES);
    assert_eq!(cpu.cop0[cop0::BAD_VADDR], 0xC000_0000);
}

#[test]
fn test_halt_register_stops() {
    let mut m = FlatMachine::default();
    let mut cpu = CpuContext::new();
    assert!(m.write_phys(HALT_PHYS, Width::Word, 0));
    assert!(!cpu.stop);
    m.write(&mut cpu, 0xBFF0_0000, Width::Word, 0);
    assert!(cpu.stop);
}

#[test]
fn test_rom_reads() {
    let mut m = FlatMachine::default();
    let mut cpu = CpuContext::new();
    m.set_rom(image(&[0xDEAD_BEEF, 0x0102_0304]));
    assert_eq!(m.read(&mut cpu, 0xB000_0000, Width::Word), 0xDEAD_BEEF);
    assert_eq!(m.read(&mut cpu, 0x9000_0004, Width::Half), 0x0102);
    // Past the end of the image.
    assert_eq!(m.read(&mut cpu, 0xB000_0100, Width::Word), 0);
    // ROM is read-only.
    m.write(&mut cpu, 0xB000_0000, Width::Word, 0);
    assert_eq!(m.read(&mut cpu, 0xB000_0000, Width::Word), 0xDEAD_BEEF);
}

#[test]
fn test_fetch_code() {
    let mut m = FlatMachine::default();
    m.load(0x1000, &image(&[0x2408_0005, 0x2508_FFFF]));
    m.set_rom(image(&[0x3C09_BFF0]));

    let ram = Backing::Ram { phys: 0x1000 };
    assert_eq!(m.fetch_code(ram, 0), Some(0x2408_0005));
    assert_eq!(m.fetch_code(ram, 4), Some(0x2508_FFFF));
    assert_eq!(
        m.fetch_code(Backing::Ram { phys: RDRAM_SIZE as u32 - 4 }, 4),
        None
    );

    let rom = Backing::Rom { offset: 0 };
    assert_eq!(m.fetch_code(rom, 0), Some(0x3C09_BFF0));
    assert_eq!(m.fetch_code(rom, 4), None);
}

#[test]
fn test_translate_addr() {
    let mut m = FlatMachine::default();
    let mut cpu = CpuContext::new();
    cpu.pc = 0x0040_0000;
    assert_eq!(m.translate_addr(&mut cpu, 0x8000_1000), Some(0x8000_1000));
    assert_eq!(m.translate_addr(&mut cpu, 0xB000_0000), Some(0xB000_0000));

    assert_eq!(m.translate_addr(&mut cpu, 0x0040_0000), None);
    assert_eq!(cpu.pc, GENERAL_VECTOR);
    assert_eq!(cpu.cop0[cop0::EPC], 0x0040_0000);
    assert_eq!(cpu.cop0[cop0::BAD_VADDR], 0x0040_0000);
    assert_eq!(exc_code(&cpu), cause::EXC_ADEL);
}

#[test]
fn test_machine_services_timer() {
    let mut m = FlatMachine::new(Vr4300Exceptions::new(500));
    let mut cpu = CpuContext::new();
    assert_eq!(m.exceptions().period(), 500);
    m.service_interrupt(&mut cpu);
    assert_eq!(cpu.next_interrupt, 500);
    assert_ne!(cpu.cop0[cop0::CAUSE] & cause::IP7, 0);
    assert_eq!(m.memory_base(), m.rdram().as_ptr() as *mut u8);
}
