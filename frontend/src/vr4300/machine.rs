use dyna_core::addr::{is_unmapped, SEGMENT_MASK};
use dyna_core::{Backing, CpuContext, Width};
use dyna_exec::Machine;
use tracing::{debug, trace};

use super::exceptions::{self, Vr4300Exceptions};

/// Size of main memory.
pub const RDRAM_SIZE: usize = 8 * 1024 * 1024;
/// Physical base of the cartridge ROM.
pub const ROM_PHYS_BASE: u32 = 0x1000_0000;
pub const ROM_PHYS_END: u32 = 0x1FC0_0000;
/// Physical address of the halt register. Any store stops the run.
pub const HALT_PHYS: u32 = 0x1FF0_0000;

/// A bare machine: RDRAM, a cartridge ROM, a halt register and the
/// Count/Compare timer. Big-endian like the real bus. There is no TLB,
/// so only KSEG0 and KSEG1 addresses are valid.
#[derive(Debug)]
pub struct FlatMachine {
    rdram: Vec<u8>,
    rom: Vec<u8>,
    exceptions: Vr4300Exceptions,
}

impl Default for FlatMachine {
    fn default() -> Self {
        Self::new(Vr4300Exceptions::default())
    }
}

impl FlatMachine {
    pub fn new(exceptions: Vr4300Exceptions) -> Self {
        Self {
            rdram: vec![0; RDRAM_SIZE],
            rom: Vec::new(),
            exceptions,
        }
    }

    pub fn exceptions(&self) -> &Vr4300Exceptions {
        &self.exceptions
    }

    /// Copy `data` into RDRAM at physical address `phys`. Returns false
    /// if it does not fit.
    pub fn load(&mut self, phys: u32, data: &[u8]) -> bool {
        let start = phys as usize;
        let Some(dst) = self.rdram.get_mut(start..start + data.len()) else {
            return false;
        };
        dst.copy_from_slice(data);
        debug!(phys = format_args!("{:#x}", phys), len = data.len(), "loaded into RDRAM");
        true
    }

    pub fn set_rom(&mut self, rom: Vec<u8>) {
        self.rom = rom;
    }

    pub fn rdram(&self) -> &[u8] {
        &self.rdram
    }

    /// Big-endian read of `width` bytes at physical address `phys`.
    /// Unbacked addresses read as zero.
    pub fn read_phys(&self, phys: u32, width: Width) -> u64 {
        let len = width.bytes() as usize;
        let bytes = if (phys as usize) < self.rdram.len() {
            self.rdram.get(phys as usize..phys as usize + len)
        } else if (ROM_PHYS_BASE..ROM_PHYS_END).contains(&phys) {
            let off = (phys - ROM_PHYS_BASE) as usize;
            self.rom.get(off..off + len)
        } else {
            None
        };
        bytes.map_or(0, |b| b.iter().fold(0u64, |acc, &x| (acc << 8) | x as u64))
    }

    /// Big-endian write. Returns true when the write hit the halt
    /// register.
    pub fn write_phys(&mut self, phys: u32, width: Width, value: u64) -> bool {
        if phys == HALT_PHYS {
            return true;
        }
        let len = width.bytes() as usize;
        if let Some(dst) = self.rdram.get_mut(phys as usize..phys as usize + len) {
            for (i, byte) in dst.iter_mut().enumerate() {
                *byte = (value >> (8 * (len - 1 - i))) as u8;
            }
        } else {
            trace!(phys = format_args!("{:#x}", phys), "write to unbacked address dropped");
        }
        false
    }

    fn to_phys(&mut self, cpu: &mut CpuContext, addr: u32, width: Width, store: bool) -> Option<u32> {
        if !is_unmapped(addr) || addr % width.bytes() != 0 {
            exceptions::raise_address_error(cpu, addr, store);
            return None;
        }
        Some(addr & SEGMENT_MASK)
    }
}

impl Machine for FlatMachine {
    fn translate_addr(&mut self, cpu: &mut CpuContext, vaddr: u32) -> Option<u32> {
        if is_unmapped(vaddr) {
            Some(vaddr)
        } else {
            exceptions::raise_address_error(cpu, vaddr, false);
            None
        }
    }

    fn read(&mut self, cpu: &mut CpuContext, addr: u32, width: Width) -> u64 {
        match self.to_phys(cpu, addr, width, false) {
            Some(phys) => self.read_phys(phys, width),
            None => 0,
        }
    }

    fn write(&mut self, cpu: &mut CpuContext, addr: u32, width: Width, value: u64) {
        let Some(phys) = self.to_phys(cpu, addr, width, true) else {
            return;
        };
        if self.write_phys(phys, width, value) {
            debug!(pc = format_args!("{:#010x}", cpu.pc), "halt requested");
            cpu.stop = true;
        }
    }

    fn fetch_code(&self, backing: Backing, offset: u32) -> Option<u32> {
        let (bytes, at) = match backing {
            Backing::Ram { phys } => (&self.rdram, phys.wrapping_add(offset) as usize),
            Backing::Rom { offset: base } => (&self.rom, base.wrapping_add(offset) as usize),
        };
        let b = bytes.get(at..at + 4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn exception_general(&mut self, cpu: &mut CpuContext) {
        exceptions::exception_general(cpu);
    }

    fn service_interrupt(&mut self, cpu: &mut CpuContext) {
        self.exceptions.service(cpu);
    }

    fn memory_base(&mut self) -> *mut u8 {
        self.rdram.as_mut_ptr()
    }
}
