use std::ffi::c_void;
use std::io;
use std::ptr;

use dyna_backend::{HostAbi, JitFrame, RawExit};
use dyna_core::addr::{backing_for, is_rom_window, page_base, page_index, rom_backing};
use dyna_core::{Block, CpuContext, DynarecError, FuncId};
use tracing::{debug, trace, warn};

use crate::callbacks;
use crate::link::Linker;
use crate::runtime::Runtime;
use crate::stats::ExecStats;
use crate::{DynarecConfig, GuestCode, Interpreter, Machine, Translator};

/// Exit recorded by a linkable exit, waiting for its target to be
/// resolved on the next dispatch.
#[derive(Debug, Clone, Copy)]
struct PendingLink {
    origin: FuncId,
    site: usize,
    target: u32,
}

/// Resolved dispatch target.
#[derive(Debug, Clone, Copy)]
struct Target {
    addr: u32,
    func: FuncId,
    entry: usize,
}

/// The translation driver.
///
/// Owns the CPU context, the machine, the translation cache and the
/// code cache, and runs the dispatch loop that moves between them and
/// generated code.
pub struct Dynarec<M, I, T, H: HostAbi> {
    rt: Runtime<M, I>,
    linker: Linker<H>,
    translator: T,
    frame: Box<JitFrame>,
    config: DynarecConfig,
    pending: Option<PendingLink>,
}

impl<M, I, T, H> Dynarec<M, I, T, H>
where
    M: Machine,
    I: Interpreter,
    T: Translator,
    H: HostAbi,
{
    pub fn new(machine: M, interp: I, translator: T, host: H, config: DynarecConfig) -> io::Result<Self> {
        let linker = Linker::new(host, config.code_cache_size)?;
        let frame = Box::new(JitFrame::new(callbacks::table::<M, I, H>(linker.link_exit_addr())));
        Ok(Self {
            rt: Runtime::new(machine, interp),
            linker,
            translator,
            frame,
            config,
            pending: None,
        })
    }

    pub fn cpu(&self) -> &CpuContext {
        &self.rt.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuContext {
        &mut self.rt.cpu
    }

    pub fn machine(&self) -> &M {
        &self.rt.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.rt.machine
    }

    pub fn runtime(&self) -> &Runtime<M, I> {
        &self.rt
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<M, I> {
        &mut self.rt
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn translator_mut(&mut self) -> &mut T {
        &mut self.translator
    }

    pub fn linker(&self) -> &Linker<H> {
        &self.linker
    }

    pub fn stats(&self) -> &ExecStats {
        &self.rt.stats
    }

    pub fn config(&self) -> &DynarecConfig {
        &self.config
    }

    /// The error that stopped the last run, if any.
    pub fn fault(&self) -> Option<&DynarecError> {
        self.rt.fault()
    }

    /// Mark the pages covering `start..start + len` as modified behind
    /// the cache's back (DMA and the like). Their compiled code is
    /// dropped the next time they are dispatched to.
    pub fn mark_dirty(&mut self, start: u32, len: u32) {
        if len == 0 {
            return;
        }
        let first = page_index(start);
        let last = page_index(start.wrapping_add(len - 1));
        for page in first..=last {
            self.rt.cache.mark_dirty(page);
        }
    }

    /// Drop every compiled function and block.
    pub fn flush(&mut self) {
        self.pending = None;
        self.linker.flush(&mut self.rt.cache);
    }

    /// Run guest code from `addr` until the stop flag is raised or the
    /// dispatch limit is hit. Returns the address execution would
    /// resume at.
    pub fn run(&mut self, addr: u32) -> Result<u32, DynarecError> {
        let mut addr = addr;
        let mut dispatches = 0u64;
        self.rt.clear_fault();
        self.rt.cpu.pc = addr;
        self.rt.cpu.last_pc = addr;
        debug!(pc = format_args!("{:#010x}", addr), "dynarec run");

        while !self.rt.cpu.stop {
            if self.config.dispatch_limit.is_some_and(|limit| dispatches >= limit) {
                debug!(dispatches, "dispatch limit reached");
                break;
            }
            dispatches += 1;
            self.rt.stats.dispatches += 1;

            let target = match self.resolve(addr) {
                Ok(target) => target,
                Err(err) => {
                    self.rt.halt(err);
                    break;
                }
            };
            addr = target.addr;

            if let Some(pending) = self.pending.take() {
                self.try_link(pending, target);
            }
            self.linker.clear_freed(&mut self.rt.cache);

            trace!(pc = format_args!("{:#010x}", addr), func = ?target.func, "enter");
            let exit = self.enter(target);
            addr = exit.next;
            self.rt.cpu.pc = addr;

            self.pending = self.linker.link_site(exit.link_slot).map(|site| PendingLink {
                origin: FuncId::from_bits(exit.func),
                site,
                target: addr,
            });

            if !self.rt.take_skip_poll() && self.config.interrupt_polling && self.rt.poll_interrupts() {
                if self.rt.cpu.pc != addr {
                    self.pending = None;
                }
                addr = self.rt.cpu.pc;
            }
        }

        self.rt.cpu.pc = addr;
        match self.rt.fault() {
            Some(err) => Err(err.clone()),
            None => Ok(addr),
        }
    }

    /// Map a dispatch address to a compiled entry point, translating
    /// on a miss.
    fn resolve(&mut self, addr: u32) -> Result<Target, DynarecError> {
        let (addr, paddr) = match self.rt.machine.translate_addr(&mut self.rt.cpu, addr) {
            Some(paddr) => (addr, paddr),
            None => {
                // The failed translation raised an exception; retry once
                // at wherever it sent the CPU.
                let retry = self.rt.cpu.pc;
                warn!(
                    addr = format_args!("{:#010x}", addr),
                    retry = format_args!("{:#010x}", retry),
                    "dispatch address not mapped"
                );
                match self.rt.machine.translate_addr(&mut self.rt.cpu, retry) {
                    Some(paddr) => (retry, paddr),
                    None => return Err(DynarecError::Untranslatable(retry)),
                }
            }
        };

        let page = page_index(addr);
        let created = self
            .rt
            .cache
            .get_or_insert_with(page, || Block::new(page_base(addr), backing_for(paddr)));
        if created {
            trace!(page = format_args!("{:#x}", page), "new block");
        } else if self.rt.cache.is_dirty(page) {
            let freed = self.rt.cache.invalidate_page(page);
            self.rt.stats.functions_freed += freed as u64;
            debug!(page = format_args!("{:#x}", page), freed, "invalidated dirty page");
        }

        let hit = self.rt.cache.find_in_page(page, addr).and_then(|id| {
            let entry = self.rt.cache.function(id)?.entry(addr)?;
            Some((id, entry))
        });
        let (func, entry) = match hit {
            Some((id, entry)) => {
                self.linker.update(&mut self.rt.cache, id);
                self.rt.stats.cache_hits += 1;
                (id, entry)
            }
            None => self.compile(page, addr, paddr)?,
        };

        Ok(Target { addr, func, entry })
    }

    fn compile(&mut self, page: u32, addr: u32, paddr: u32) -> Result<(FuncId, usize), DynarecError> {
        if let Some(block) = self.rt.cache.get_mut(page) {
            if block.code.is_none() && is_rom_window(paddr) {
                block.code = Some(rom_backing(paddr));
            }
        }
        // Code covering addr without an entry there is superseded.
        let freed = self.rt.cache.free_covering(addr);
        self.rt.stats.functions_freed += freed as u64;

        let (block_start, block_end, backing) = match self.rt.cache.get(page) {
            Some(block) => (block.start_address, block.end_address, block.code),
            None => return Err(DynarecError::NoEntry(addr)),
        };
        let src = GuestCode {
            block_start,
            block_end,
            backing,
            max_insns: self.config.max_function_insns,
            machine: &self.rt.machine,
        };
        let compiled = self
            .translator
            .compile(&src, addr)
            .map_err(|source| DynarecError::Translate { addr, source })?;

        let id = self.linker.install(&mut self.rt.cache, compiled, &mut self.rt.stats)?;
        let entry = self
            .rt
            .cache
            .function(id)
            .and_then(|f| f.entry(addr))
            .ok_or(DynarecError::NoEntry(addr))?;
        debug!(pc = format_args!("{:#010x}", addr), func = ?id, "compiled");
        Ok((id, entry))
    }

    fn try_link(&mut self, pending: PendingLink, target: Target) {
        if pending.target != target.addr || self.rt.cache.was_freed(pending.origin) {
            self.rt.stats.links_skipped += 1;
            return;
        }
        if self.linker.link(
            &mut self.rt.cache,
            pending.origin,
            pending.site,
            target.func,
            target.entry,
        ) {
            self.rt.stats.links_patched += 1;
        } else {
            self.rt.stats.links_skipped += 1;
        }
    }

    /// Point the frame at the current state and run generated code.
    fn enter(&mut self, target: Target) -> RawExit {
        let rt: *mut Runtime<M, I> = &mut self.rt;
        let linker: *mut Linker<H> = &mut self.linker;
        let frame: *mut JitFrame = &mut *self.frame;

        // SAFETY: every pointer in the frame is derived from `rt` or
        // `linker`, and nothing touches `self.rt` or `self.linker`
        // except through them until `enter` returns. The callbacks
        // reach the runtime through `frame.runtime` and the code cache
        // through `frame.code_cache`.
        unsafe {
            (*frame).gpr = ptr::addr_of_mut!((*rt).cpu.gpr).cast();
            (*frame).cop0 = ptr::addr_of_mut!((*rt).cpu.cop0).cast();
            (*frame).fpr = ptr::addr_of_mut!((*rt).cpu.fpr).cast();
            (*frame).fcr31 = ptr::addr_of_mut!((*rt).cpu.fcr31);
            (*frame).last_pc = ptr::addr_of_mut!((*rt).cpu.last_pc);
            (*frame).next_interrupt = ptr::addr_of_mut!((*rt).cpu.next_interrupt);
            (*frame).mem_base = (*rt).machine.memory_base();
            (*frame).func = target.func.to_bits();
            (*frame).runtime = rt.cast::<c_void>();
            (*frame).code_cache = linker.cast::<c_void>();
            Linker::enter(linker, frame, target.entry)
        }
    }
}
