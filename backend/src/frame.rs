//! The block of pointers and callbacks generated code runs against.
//!
//! The trampoline pins a pointer to a [`JitFrame`] in a host register
//! for the whole time generated code runs. Everything generated code
//! touches outside its own instructions is reached through a field of
//! this frame at a fixed offset.

use std::ffi::c_void;
use std::mem::offset_of;
use std::ptr;

/// Memory access: `(frame, value, addr, kind, pc, delay_slot) -> redirect`.
///
/// `value` is the destination register index for loads and the data for
/// stores. Returns 0, or the address execution must continue at when
/// the access raised an exception.
pub type MemAccessFn = unsafe extern "C" fn(*mut JitFrame, u64, u32, u32, u32, u32) -> u32;

/// Interpreter fallback: `(frame, insn, pc, delay_slot) -> redirect`.
pub type InterpretFn = unsafe extern "C" fn(*mut JitFrame, u32, u32, u32) -> u32;

/// Cycle counter: `(frame, pc) -> next_interrupt - count`.
pub type UpdateCountFn = unsafe extern "C" fn(*mut JitFrame, u32) -> i32;

/// COP1-unusable trap: `(frame, pc, delay_slot) -> exception vector`.
pub type Cop1UnusableFn = unsafe extern "C" fn(*mut JitFrame, u32, u32) -> u32;

/// Runtime services generated code calls into.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Callbacks {
    /// Absolute address of the link-exit stub. A linkable exit is an
    /// indirect call through this slot.
    pub link_exit: usize,
    pub mem_access: MemAccessFn,
    pub interpret: InterpretFn,
    pub update_count: UpdateCountFn,
    pub cop1_unusable: Cop1UnusableFn,
}

#[repr(C)]
pub struct JitFrame {
    pub gpr: *mut u64,
    pub cop0: *mut u32,
    pub fpr: *mut u64,
    pub fcr31: *mut u32,
    /// Base of guest main memory, or null.
    pub mem_base: *mut u8,
    pub last_pc: *mut u32,
    pub next_interrupt: *mut u32,
    /// Packed handle of the function being entered.
    pub func: u64,
    /// Opaque pointer handed back to the callbacks.
    pub runtime: *mut c_void,
    /// Opaque pointer to the code cache, for callbacks that free code.
    pub code_cache: *mut c_void,
    /// Scratch slot generated code may spill one value into.
    pub spill: u64,
    /// Written by the trampoline on exit: link slot value.
    pub exit_link: u64,
    /// Written by the trampoline on exit: handle of the exiting function.
    pub exit_func: u64,
    pub callbacks: Callbacks,
}

pub const FRAME_GPR: i32 = offset_of!(JitFrame, gpr) as i32;
pub const FRAME_COP0: i32 = offset_of!(JitFrame, cop0) as i32;
pub const FRAME_FPR: i32 = offset_of!(JitFrame, fpr) as i32;
pub const FRAME_FCR31: i32 = offset_of!(JitFrame, fcr31) as i32;
pub const FRAME_MEM_BASE: i32 = offset_of!(JitFrame, mem_base) as i32;
pub const FRAME_LAST_PC: i32 = offset_of!(JitFrame, last_pc) as i32;
pub const FRAME_NEXT_INTERRUPT: i32 = offset_of!(JitFrame, next_interrupt) as i32;
pub const FRAME_FUNC: i32 = offset_of!(JitFrame, func) as i32;
pub const FRAME_SPILL: i32 = offset_of!(JitFrame, spill) as i32;
pub const FRAME_EXIT_LINK: i32 = offset_of!(JitFrame, exit_link) as i32;
pub const FRAME_EXIT_FUNC: i32 = offset_of!(JitFrame, exit_func) as i32;

const CALLBACKS: usize = offset_of!(JitFrame, callbacks);
pub const FRAME_LINK_EXIT: i32 = (CALLBACKS + offset_of!(Callbacks, link_exit)) as i32;
pub const FRAME_MEM_ACCESS: i32 = (CALLBACKS + offset_of!(Callbacks, mem_access)) as i32;
pub const FRAME_INTERPRET: i32 = (CALLBACKS + offset_of!(Callbacks, interpret)) as i32;
pub const FRAME_UPDATE_COUNT: i32 = (CALLBACKS + offset_of!(Callbacks, update_count)) as i32;
pub const FRAME_COP1_UNUSABLE: i32 = (CALLBACKS + offset_of!(Callbacks, cop1_unusable)) as i32;

impl JitFrame {
    /// Frame with every pointer unbound.
    pub fn new(callbacks: Callbacks) -> Self {
        Self {
            gpr: ptr::null_mut(),
            cop0: ptr::null_mut(),
            fpr: ptr::null_mut(),
            fcr31: ptr::null_mut(),
            mem_base: ptr::null_mut(),
            last_pc: ptr::null_mut(),
            next_interrupt: ptr::null_mut(),
            func: 0,
            runtime: ptr::null_mut(),
            code_cache: ptr::null_mut(),
            spill: 0,
            exit_link: 0,
            exit_func: 0,
            callbacks,
        }
    }
}

/// What the trampoline reports when generated code returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExit {
    /// Guest address execution continues at.
    pub next: u32,
    /// Raw link slot: 0, the trampoline's own return site, or the
    /// return address pushed by a linkable exit.
    pub link_slot: u64,
    /// Packed handle of the function that exited.
    pub func: u64,
}
