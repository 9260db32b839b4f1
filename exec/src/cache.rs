use std::collections::HashMap;
use std::mem;

use dyna_core::addr::{aliases, page_index};
use dyna_core::{Block, FuncId, Function, Width, INSN_WIDTH};
use tracing::trace;

/// Cache entry for one guest page.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub block: Block,
    /// Bumped every time the page's block is replaced or invalidated.
    pub generation: u32,
    /// Contents changed behind the cache's back; compiled code must not
    /// be reused before the page is invalidated.
    pub dirty: bool,
}

#[derive(Debug)]
enum SlotState {
    Vacant,
    Live(Function),
    /// Freed, code not reclaimed yet.
    Freed(Function),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    state: SlotState,
}

/// Page table of blocks plus the arena of compiled functions.
///
/// Freeing a function is two-phase: [`TranslationCache::free_function`]
/// makes it unreachable for lookup and linking but leaves its record
/// and code in place, so exits of code already running keep pointing
/// at valid memory. [`TranslationCache::take_freed`] hands the records
/// over for reclamation and retires the handles.
#[derive(Debug, Default)]
pub struct TranslationCache {
    pages: HashMap<u32, PageEntry>,
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    freed: Vec<FuncId>,
    /// Prefix of `freed` whose link records are already detached.
    detached: usize,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Blocks --

    pub fn get(&self, page: u32) -> Option<&Block> {
        self.pages.get(&page).map(|e| &e.block)
    }

    pub fn get_mut(&mut self, page: u32) -> Option<&mut Block> {
        self.pages.get_mut(&page).map(|e| &mut e.block)
    }

    pub fn entry(&self, page: u32) -> Option<&PageEntry> {
        self.pages.get(&page)
    }

    /// Install `block` for `page`. Functions of a block it replaces
    /// are freed.
    pub fn set(&mut self, page: u32, block: Block) {
        let generation = match self.pages.get(&page) {
            Some(old) => {
                let generation = old.generation.wrapping_add(1);
                self.free_page_functions(page);
                generation
            }
            None => 0,
        };
        self.pages.insert(
            page,
            PageEntry {
                block,
                generation,
                dirty: false,
            },
        );
    }

    /// Install the block built by `make` unless `page` already has one.
    /// Returns true when a block was created.
    pub fn get_or_insert_with(&mut self, page: u32, make: impl FnOnce() -> Block) -> bool {
        if self.pages.contains_key(&page) {
            return false;
        }
        self.set(page, make());
        true
    }

    pub fn generation(&self, page: u32) -> Option<u32> {
        self.pages.get(&page).map(|e| e.generation)
    }

    pub fn mark_dirty(&mut self, page: u32) {
        if let Some(entry) = self.pages.get_mut(&page) {
            entry.dirty = true;
        }
    }

    pub fn is_dirty(&self, page: u32) -> bool {
        self.pages.get(&page).is_some_and(|e| e.dirty)
    }

    /// Free every function compiled from `page` and clear its dirty
    /// mark. Returns the number of functions freed.
    pub fn invalidate_page(&mut self, page: u32) -> usize {
        let freed = self.free_page_functions(page);
        if let Some(entry) = self.pages.get_mut(&page) {
            entry.generation = entry.generation.wrapping_add(1);
            entry.dirty = false;
        }
        freed
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    // -- Functions --

    /// Live function in `block` covering `addr`. One with an entry
    /// point at `addr` wins over one that merely covers it.
    pub fn find_function(&self, block: &Block, addr: u32) -> Option<FuncId> {
        let mut covering = None;
        for &id in &block.funcs {
            let Some(func) = self.function(id) else {
                continue;
            };
            if !func.contains(addr) {
                continue;
            }
            if func.entry(addr).is_some() {
                return Some(id);
            }
            covering.get_or_insert(id);
        }
        covering
    }

    /// [`TranslationCache::find_function`] on the block of `page`.
    pub fn find_in_page(&self, page: u32, addr: u32) -> Option<FuncId> {
        self.get(page).and_then(|block| self.find_function(block, addr))
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        match self.slot(id)? {
            Slot {
                state: SlotState::Live(func),
                ..
            } => Some(func),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        match self.slot_mut(id)? {
            Slot {
                state: SlotState::Live(func),
                ..
            } => Some(func),
            _ => None,
        }
    }

    /// Live or freed-but-unreclaimed function. Its code is still in
    /// place.
    pub fn allocated_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        match &mut self.slot_mut(id)?.state {
            SlotState::Live(func) | SlotState::Freed(func) => Some(func),
            SlotState::Vacant => None,
        }
    }

    #[inline]
    pub fn is_live(&self, id: FuncId) -> bool {
        self.function(id).is_some()
    }

    /// True once `id` no longer names a live function, whether it is
    /// awaiting reclamation or already gone.
    #[inline]
    pub fn was_freed(&self, id: FuncId) -> bool {
        !self.is_live(id)
    }

    /// Add a function to the block of its page, which must exist.
    pub fn insert_function(&mut self, func: Function) -> Option<FuncId> {
        let page = func.page();
        if !self.pages.contains_key(&page) {
            return None;
        }
        let id = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.state = SlotState::Live(func);
                FuncId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Live(func),
                });
                FuncId::new(index, 0)
            }
        };
        if let Some(entry) = self.pages.get_mut(&page) {
            entry.block.funcs.push(id);
        }
        Some(id)
    }

    /// First phase of freeing: detach the function from lookup and
    /// linking. Returns false if it was not live.
    pub fn free_function(&mut self, id: FuncId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        let func = match mem::replace(&mut slot.state, SlotState::Vacant) {
            SlotState::Live(func) => func,
            other => {
                slot.state = other;
                return false;
            }
        };
        let page = func.page();
        trace!(
            start = format_args!("{:#010x}", func.start_addr),
            end = format_args!("{:#010x}", func.end_addr),
            "free function"
        );
        slot.state = SlotState::Freed(func);
        if let Some(entry) = self.pages.get_mut(&page) {
            entry.block.funcs.retain(|&f| f != id);
        }
        self.freed.push(id);
        true
    }

    /// Free the live function whose range contains `addr`.
    pub fn free_at(&mut self, addr: u32) -> Option<FuncId> {
        let page = page_index(addr);
        let id = self
            .get(page)?
            .funcs
            .iter()
            .copied()
            .find(|&id| self.function(id).is_some_and(|f| f.contains(addr)))?;
        self.free_function(id).then_some(id)
    }

    /// Free every live function in `addr`'s page whose range contains
    /// `addr`.
    pub fn free_covering(&mut self, addr: u32) -> usize {
        let mut freed = 0;
        while self.free_at(addr).is_some() {
            freed += 1;
        }
        freed
    }

    /// Write-through invalidation for a guest store of `width` at
    /// `addr`. Every instruction word the store overlaps is checked
    /// under each of its direct-mapped aliases. Returns the number of
    /// functions freed.
    pub fn note_store(&mut self, addr: u32, width: Width) -> usize {
        let first = addr & !(INSN_WIDTH - 1);
        let last = addr.wrapping_add(width.bytes() - 1) & !(INSN_WIDTH - 1);
        let mut freed = 0;
        let mut word = first;
        loop {
            freed += aliases(word)
                .into_iter()
                .flatten()
                .map(|alias| self.free_covering(alias))
                .sum::<usize>();
            if word == last {
                break freed;
            }
            word = word.wrapping_add(INSN_WIDTH);
        }
    }

    /// Drop the link records of every function freed since the last
    /// call, on both ends of each link. Returns the exit sites that
    /// still jump into freed code; the caller must reset them before
    /// generated code can reach them again.
    pub fn detach_freed_links(&mut self) -> Vec<usize> {
        let ids = self.freed[self.detached..].to_vec();
        self.detached = self.freed.len();
        let mut sites = Vec::new();
        for id in ids {
            let Some(func) = self.allocated_mut(id) else {
                continue;
            };
            let links_in = mem::take(&mut func.links_in);
            let links_out = mem::take(&mut func.links_out);
            for rec in links_in {
                if let Some(origin) = self.allocated_mut(rec.peer) {
                    origin.links_out.retain(|r| r.site != rec.site);
                    sites.push(rec.site);
                }
            }
            for rec in links_out {
                if let Some(target) = self.allocated_mut(rec.peer) {
                    target
                        .links_in
                        .retain(|r| !(r.peer == id && r.site == rec.site));
                }
            }
        }
        sites
    }

    /// Second phase of freeing: hand over every freed function for
    /// reclamation. Their handles become stale.
    pub fn take_freed(&mut self) -> Vec<(FuncId, Function)> {
        let ids = mem::take(&mut self.freed);
        self.detached = 0;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(slot) = self.slot_mut(id) else {
                continue;
            };
            if let SlotState::Freed(func) = mem::replace(&mut slot.state, SlotState::Vacant) {
                slot.generation = slot.generation.wrapping_add(1);
                self.vacant.push(id.index() as u32);
                out.push((id, func));
            }
        }
        out
    }

    pub fn pending_frees(&self) -> usize {
        self.freed.len()
    }

    /// Live function with the oldest recency tick.
    pub fn least_recently_used(&self) -> Option<FuncId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Live(func) => {
                    Some((func.last_used, FuncId::new(index as u32, slot.generation)))
                }
                _ => None,
            })
            .min_by_key(|&(tick, _)| tick)
            .map(|(_, id)| id)
    }

    pub fn live_functions(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Live(_)))
            .count()
    }

    /// Drop every page and function. All handles become stale.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.freed.clear();
        self.detached = 0;
        self.vacant.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.state = SlotState::Vacant;
            slot.generation = slot.generation.wrapping_add(1);
            self.vacant.push(index as u32);
        }
    }

    fn free_page_functions(&mut self, page: u32) -> usize {
        let funcs = match self.pages.get(&page) {
            Some(entry) => entry.block.funcs.clone(),
            None => return 0,
        };
        funcs
            .into_iter()
            .filter(|&id| self.free_function(id))
            .count()
    }

    fn slot(&self, id: FuncId) -> Option<&Slot> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation())
    }

    fn slot_mut(&mut self, id: FuncId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation())
    }
}
