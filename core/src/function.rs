use crate::addr::{page_index, Backing, INSN_WIDTH, PAGE_SIZE};

/// Handle naming one compiled function.
///
/// Slots in the function arena are reused after their code is
/// reclaimed; the generation makes a handle to the previous occupant
/// compare unequal to the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId {
    index: u32,
    generation: u32,
}

impl FuncId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packed form stored in the code header generated code reports
    /// back on exit.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Location of a function's host code inside the code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion {
    /// Offset of the region start (the handle header).
    pub offset: usize,
    /// Total length including the header.
    pub len: usize,
}

/// A patched exit: `site` is the offset of the exit sequence in the
/// code buffer, `peer` the function on the other side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRecord {
    pub site: usize,
    pub peer: FuncId,
}

/// A compiled contiguous guest range inside one page.
#[derive(Debug, Clone)]
pub struct Function {
    /// First guest address covered.
    pub start_addr: u32,
    /// One past the last guest address covered.
    pub end_addr: u32,
    pub region: CodeRegion,
    /// Host entry offset for each instruction slot, indexed by
    /// `(addr - start_addr) / 4`.
    pub entries: Vec<Option<usize>>,
    /// Exits in other functions patched to jump here.
    pub links_in: Vec<LinkRecord>,
    /// Exits in this function patched to jump elsewhere.
    pub links_out: Vec<LinkRecord>,
    /// Recency tick for eviction.
    pub last_used: u64,
}

impl Function {
    pub fn new(start_addr: u32, end_addr: u32, region: CodeRegion) -> Self {
        let slots = (end_addr.wrapping_sub(start_addr) / INSN_WIDTH) as usize;
        Self {
            start_addr,
            end_addr,
            region,
            entries: vec![None; slots],
            links_in: Vec::new(),
            links_out: Vec::new(),
            last_used: 0,
        }
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        (self.start_addr..self.end_addr).contains(&addr)
    }

    #[inline]
    pub fn page(&self) -> u32 {
        page_index(self.start_addr)
    }

    /// Host offset of the entry point for `addr`, if one was emitted.
    pub fn entry(&self, addr: u32) -> Option<usize> {
        if !self.contains(addr) || addr % INSN_WIDTH != 0 {
            return None;
        }
        let slot = ((addr - self.start_addr) / INSN_WIDTH) as usize;
        self.entries.get(slot).copied().flatten()
    }

    pub fn set_entry(&mut self, addr: u32, host_offset: usize) {
        if self.contains(addr) {
            let slot = ((addr - self.start_addr) / INSN_WIDTH) as usize;
            self.entries[slot] = Some(host_offset);
        }
    }
}

/// Per-page record in the translation cache.
#[derive(Debug, Clone)]
pub struct Block {
    pub start_address: u32,
    pub end_address: u32,
    /// Where the page's instruction words are read from. `None` until
    /// a cartridge-window page gets its ROM backing attached.
    pub code: Option<Backing>,
    /// Live functions compiled from this page.
    pub funcs: Vec<FuncId>,
}

impl Block {
    pub fn new(start_address: u32, code: Option<Backing>) -> Self {
        Self {
            start_address,
            end_address: start_address.wrapping_add(PAGE_SIZE),
            code,
            funcs: Vec::new(),
        }
    }
}
