//! `extern "C"` entry points generated code calls through the frame.

use dyna_backend::{Callbacks, HostAbi, JitFrame};

use crate::cache::TranslationCache;
use crate::link::Linker;
use crate::runtime::Runtime;
use crate::{Interpreter, Machine};

/// Recover the runtime from the frame generated code passed back.
///
/// # Safety
///
/// `frame` must be the frame the driver bound before entering
/// generated code, with `runtime` pointing at a live `Runtime<M, I>`
/// nothing else is borrowing.
unsafe fn runtime<'a, M, I>(frame: *mut JitFrame) -> &'a mut Runtime<M, I> {
    &mut *((*frame).runtime as *mut Runtime<M, I>)
}

/// Reset exits linked into code a store just freed, before generated
/// code can take one of them.
///
/// # Safety
///
/// `frame.code_cache` must point at the `Linker<H>` that entered
/// generated code.
unsafe fn unlink_freed<H: HostAbi>(frame: *mut JitFrame, cache: &mut TranslationCache) {
    if cache.pending_frees() > 0 {
        Linker::unlink_freed_raw((*frame).code_cache as *mut Linker<H>, cache);
    }
}

unsafe extern "C" fn mem_access<M: Machine, I: Interpreter, H: HostAbi>(
    frame: *mut JitFrame,
    value: u64,
    addr: u32,
    kind: u32,
    pc: u32,
    delay_slot: u32,
) -> u32 {
    let rt = runtime::<M, I>(frame);
    let next = rt.access_raw(value, addr, kind, pc, delay_slot != 0);
    unlink_freed::<H>(frame, &mut rt.cache);
    next
}

unsafe extern "C" fn interpret<M: Machine, I: Interpreter, H: HostAbi>(
    frame: *mut JitFrame,
    insn: u32,
    pc: u32,
    delay_slot: u32,
) -> u32 {
    let rt = runtime::<M, I>(frame);
    let next = rt.interpret_one(insn, pc, delay_slot != 0);
    unlink_freed::<H>(frame, &mut rt.cache);
    next
}

/// Count checkpoint from generated code. A stop request reads as an
/// interrupt being due so generated code returns to the driver.
unsafe extern "C" fn update_count<M: Machine, I: Interpreter>(
    frame: *mut JitFrame,
    pc: u32,
) -> i32 {
    let rt = runtime::<M, I>(frame);
    // A checkpoint taken in generated code consumes a pending skip.
    rt.take_skip_poll();
    let remaining = rt.advance_count(pc);
    if rt.cpu.stop {
        0
    } else {
        remaining
    }
}

unsafe extern "C" fn cop1_unusable<M: Machine, I: Interpreter>(
    frame: *mut JitFrame,
    pc: u32,
    delay_slot: u32,
) -> u32 {
    runtime::<M, I>(frame).raise_cop1_unusable(pc, delay_slot != 0)
}

/// Callback table for a runtime of type `Runtime<M, I>` running code
/// owned by a `Linker<H>`.
pub(crate) fn table<M: Machine, I: Interpreter, H: HostAbi>(link_exit: usize) -> Callbacks {
    Callbacks {
        link_exit,
        mem_access: mem_access::<M, I, H>,
        interpret: interpret::<M, I, H>,
        update_count: update_count::<M, I>,
        cop1_unusable: cop1_unusable::<M, I>,
    }
}
