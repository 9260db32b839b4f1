use std::io;

use dyna_backend::{CodeBuffer, HostAbi, JitFrame, RawExit};
use dyna_core::{CodeRegion, DynarecError, FuncId, Function, LinkRecord};
use tracing::{debug, trace};

use crate::cache::TranslationCache;
use crate::heap::CodeHeap;
use crate::stats::ExecStats;
use crate::Compiled;

/// Owner of the code cache: installs compiled functions, patches and
/// unpatches exits between them, and reclaims freed code.
pub struct Linker<H: HostAbi> {
    host: H,
    buf: CodeBuffer,
    heap: CodeHeap,
    tick: u64,
}

impl<H: HostAbi> Linker<H> {
    /// Map a code cache of `size` bytes and emit the host trampoline
    /// at its start.
    pub fn new(mut host: H, size: usize) -> io::Result<Self> {
        let mut buf = CodeBuffer::new(size)?;
        host.emit_trampoline(&mut buf);
        let heap = CodeHeap::new(buf.offset(), buf.capacity());
        debug!(
            capacity = buf.capacity(),
            reserved = buf.offset(),
            "code cache ready"
        );
        Ok(Self {
            host,
            buf,
            heap,
            tick: 0,
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn code_buffer(&self) -> &CodeBuffer {
        &self.buf
    }

    pub fn free_bytes(&self) -> usize {
        self.heap.free_bytes()
    }

    /// Absolute host address of the link-exit stub.
    pub fn link_exit_addr(&self) -> usize {
        self.buf.ptr_at(self.host.link_exit_offset()) as usize
    }

    /// Copy `compiled` into the code cache and register it with the
    /// block of its page. Least recently used functions are evicted
    /// when the cache is full.
    pub fn install(
        &mut self,
        cache: &mut TranslationCache,
        compiled: Compiled,
        stats: &mut ExecStats,
    ) -> Result<FuncId, DynarecError> {
        let needed = H::HEADER_LEN + compiled.code.len();
        let offset = loop {
            if let Some(offset) = self.heap.alloc(needed) {
                break offset;
            }
            let Some(victim) = cache.least_recently_used() else {
                return Err(DynarecError::CodeCacheFull { needed });
            };
            debug!(?victim, "code cache full, evicting");
            cache.free_function(victim);
            stats.functions_evicted += 1;
            self.clear_freed(cache);
        };

        let code = offset + H::HEADER_LEN;
        self.buf.patch_bytes(code, &compiled.code);

        let mut func = Function::new(
            compiled.start_addr,
            compiled.end_addr,
            CodeRegion {
                offset,
                len: needed,
            },
        );
        for &(addr, entry) in &compiled.entries {
            func.set_entry(addr, code + entry);
        }
        self.tick += 1;
        func.last_used = self.tick;

        let Some(id) = cache.insert_function(func) else {
            self.heap.release(offset, needed);
            return Err(DynarecError::NoEntry(compiled.start_addr));
        };
        self.buf.patch_u64(offset, id.to_bits());
        stats.compiles += 1;
        trace!(
            start = format_args!("{:#010x}", compiled.start_addr),
            end = format_args!("{:#010x}", compiled.end_addr),
            offset,
            len = needed,
            "installed function"
        );
        Ok(id)
    }

    /// Record that `id` was dispatched to, for eviction order.
    pub fn update(&mut self, cache: &mut TranslationCache, id: FuncId) {
        self.tick += 1;
        if let Some(func) = cache.function_mut(id) {
            func.last_used = self.tick;
        }
    }

    /// Patch the exit at `site` in `origin` to jump straight to `entry`
    /// in `target`. Returns false, leaving the code untouched, if
    /// either function is no longer live or the site is not inside
    /// `origin`.
    pub fn link(
        &mut self,
        cache: &mut TranslationCache,
        origin: FuncId,
        site: usize,
        target: FuncId,
        entry: usize,
    ) -> bool {
        let Some(from) = cache.function(origin) else {
            return false;
        };
        let region = from.region;
        if site < region.offset + H::HEADER_LEN
            || site + H::LINK_SITE_LEN > region.offset + region.len
        {
            return false;
        }
        if from.links_out.iter().any(|r| r.site == site) {
            return true;
        }
        let Some(to) = cache.function_mut(target) else {
            return false;
        };
        to.links_in.push(LinkRecord { site, peer: origin });
        if let Some(from) = cache.function_mut(origin) {
            from.links_out.push(LinkRecord { site, peer: target });
        }
        self.host.patch_link(&mut self.buf, site, entry);
        trace!(site, entry, "linked exit");
        true
    }

    /// Free the function compiled for `addr`, if any.
    pub fn free(&mut self, cache: &mut TranslationCache, addr: u32) -> bool {
        cache.free_at(addr).is_some()
    }

    /// Reset every exit still linked into a function freed since the
    /// last call. Returns the number of exits reset.
    pub fn unlink_freed(&mut self, cache: &mut TranslationCache) -> usize {
        reset_links(&self.host, &mut self.buf, cache)
    }

    /// [`Linker::unlink_freed`] from a callback, while generated code is
    /// running.
    ///
    /// # Safety
    ///
    /// `this` must point to a live linker that is only borrowed by an
    /// [`Linker::enter`] in progress.
    pub(crate) unsafe fn unlink_freed_raw(this: *mut Self, cache: &mut TranslationCache) -> usize {
        reset_links(&(*this).host, &mut (*this).buf, cache)
    }

    /// Reclaim the code of every freed function. Exits linked to a
    /// reclaimed function are reset first, so nothing jumps into the
    /// released memory. Returns the number of functions reclaimed.
    pub fn clear_freed(&mut self, cache: &mut TranslationCache) -> usize {
        self.unlink_freed(cache);
        let freed = cache.take_freed();
        for (_, func) in &freed {
            self.heap.release(func.region.offset, func.region.len);
        }
        if !freed.is_empty() {
            trace!(count = freed.len(), "reclaimed functions");
        }
        freed.len()
    }

    /// Drop all compiled code.
    pub fn flush(&mut self, cache: &mut TranslationCache) {
        cache.clear();
        self.heap.reset();
        debug!("code cache flushed");
    }

    /// Enter generated code at `entry`. Takes a raw pointer because
    /// callbacks reset links through the frame while the code runs.
    ///
    /// # Safety
    ///
    /// Same contract as [`HostAbi::enter`]. `this` must stay valid and
    /// unborrowed until this returns.
    pub unsafe fn enter(this: *mut Self, frame: *mut JitFrame, entry: usize) -> RawExit {
        let trampoline = (*this).buf.ptr_at((*this).host.trampoline_offset());
        let code = (*this).buf.ptr_at(entry);
        (*this).host.enter(trampoline, frame, code)
    }

    /// Normalize a raw link slot into the offset of the exit site.
    pub fn link_site(&self, slot: u64) -> Option<usize> {
        self.host.link_site(&self.buf, slot)
    }
}

fn reset_links<H: HostAbi>(host: &H, buf: &mut CodeBuffer, cache: &mut TranslationCache) -> usize {
    let sites = cache.detach_freed_links();
    for &site in &sites {
        host.reset_link(buf, site);
    }
    if !sites.is_empty() {
        trace!(count = sites.len(), "unlinked exits into freed code");
    }
    sites.len()
}
