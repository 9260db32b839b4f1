//! Guest address policy: page granularity, segment windows and the
//! rules for where a page's code is backed.

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;
pub const PAGE_MASK: u32 = !(PAGE_SIZE - 1);

/// Size of one guest instruction in bytes.
pub const INSN_WIDTH: u32 = 4;

pub const KSEG0_BASE: u32 = 0x8000_0000;
pub const KSEG1_BASE: u32 = 0xA000_0000;
pub const KSEG2_BASE: u32 = 0xC000_0000;
/// Distance between a KSEG0 address and its KSEG1 alias.
pub const KSEG_ALIAS_DELTA: u32 = KSEG1_BASE - KSEG0_BASE;
/// Mask from an unmapped segment address to its physical address.
pub const SEGMENT_MASK: u32 = 0x1FFF_FFFF;
/// Mask from a cartridge-window address to its ROM offset.
pub const ROM_OFFSET_MASK: u32 = 0x0FFF_FFFF;

/// Where the instruction words of a page come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Main memory, starting at physical address `phys`.
    Ram { phys: u32 },
    /// Cartridge ROM, starting at byte `offset`.
    Rom { offset: u32 },
}

#[inline]
pub fn page_index(addr: u32) -> u32 {
    addr >> PAGE_SHIFT
}

#[inline]
pub fn page_base(addr: u32) -> u32 {
    addr & PAGE_MASK
}

/// True for the cached and uncached cartridge windows
/// (0x9000_0000..0xA000_0000 and 0xB000_0000..0xC000_0000).
#[inline]
pub fn is_rom_window(addr: u32) -> bool {
    matches!(addr >> 28, 0x9 | 0xB)
}

/// True when `addr` lies in KSEG0 or KSEG1.
#[inline]
pub fn is_unmapped(addr: u32) -> bool {
    (KSEG0_BASE..KSEG2_BASE).contains(&addr)
}

/// Backing for the page holding `paddr`, an address already resolved
/// into an unmapped segment. Pages in the cartridge windows get no
/// backing here; their ROM pointer is attached when code is first
/// compiled from them.
pub fn backing_for(paddr: u32) -> Option<Backing> {
    if is_rom_window(paddr) {
        None
    } else {
        Some(Backing::Ram {
            phys: page_base(paddr) & SEGMENT_MASK,
        })
    }
}

/// ROM backing for the page holding `paddr`.
pub fn rom_backing(paddr: u32) -> Backing {
    Backing::Rom {
        offset: page_base(paddr) & ROM_OFFSET_MASK,
    }
}

/// Every virtual address that names the same physical byte as `addr`
/// through the direct-mapped segments. Mapped addresses alias only
/// themselves.
pub fn aliases(addr: u32) -> [Option<u32>; 2] {
    if (KSEG0_BASE..KSEG1_BASE).contains(&addr) {
        [Some(addr), Some(addr + KSEG_ALIAS_DELTA)]
    } else if (KSEG1_BASE..KSEG2_BASE).contains(&addr) {
        [Some(addr), Some(addr - KSEG_ALIAS_DELTA)]
    } else {
        [Some(addr), None]
    }
}
