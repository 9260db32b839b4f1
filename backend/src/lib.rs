pub mod code_buffer;
pub mod frame;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

pub use code_buffer::CodeBuffer;
pub use frame::{Callbacks, JitFrame, RawExit};
#[cfg(target_arch = "x86_64")]
pub use x86_64::X86_64Abi;

/// Host-specific half of the context switch and the link patcher.
///
/// Each host architecture implements this trait once. The trampoline
/// it emits is the only way into generated code: it saves the host
/// callee-saved state, pins the frame pointer and the state pointers,
/// clears the link slot and calls the entry point. Generated code
/// leaves either with a plain return (no link requested) or through
/// the link-exit stub, which records the return address of the exit
/// site in the link slot.
pub trait HostAbi {
    /// Bytes of a linkable exit site. A linked site is overwritten in
    /// place with a direct jump of at most this length.
    const LINK_SITE_LEN: usize;

    /// Bytes reserved in front of every function for its handle.
    const HEADER_LEN: usize = 8;

    /// Emit the trampoline and the link-exit stub at the current
    /// offset of `buf`.
    fn emit_trampoline(&mut self, buf: &mut CodeBuffer);

    fn trampoline_offset(&self) -> usize;

    /// Offset of the trampoline's return site, the instruction right
    /// after its call into generated code.
    fn return_site_offset(&self) -> usize;

    fn link_exit_offset(&self) -> usize;

    /// Enter generated code at `code` through the trampoline at
    /// `trampoline`.
    ///
    /// Callbacks may patch the code buffer while generated code runs,
    /// so no reference to it is held across the call.
    ///
    /// # Safety
    ///
    /// `trampoline` must be where [`HostAbi::emit_trampoline`] put the
    /// trampoline. `frame` must point to a fully bound frame whose
    /// pointers stay valid until this returns, and `code` must be an
    /// entry point emitted by a translator targeting this host.
    unsafe fn enter(&self, trampoline: *const u8, frame: *mut JitFrame, code: *const u8) -> RawExit;

    /// Rewrite the exit site at `site` into a direct jump to `target`.
    fn patch_link(&self, buf: &mut CodeBuffer, site: usize, target: usize);

    /// Restore the exit site at `site` to an unlinked exit.
    fn reset_link(&self, buf: &mut CodeBuffer, site: usize);

    /// Turn a raw link slot into the offset of the exit site to patch.
    ///
    /// Zero and the trampoline's own return site mean no link was
    /// requested. Anything else is the return address pushed by the
    /// exit site, which starts `LINK_SITE_LEN` bytes earlier.
    fn link_site(&self, buf: &CodeBuffer, slot: u64) -> Option<usize> {
        if slot == 0 {
            return None;
        }
        let ret = buf.offset_of(slot)?;
        if ret == self.return_site_offset() {
            return None;
        }
        ret.checked_sub(Self::LINK_SITE_LEN)
    }
}
