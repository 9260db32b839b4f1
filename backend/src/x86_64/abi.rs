use tracing::debug;

use super::emitter::*;
use super::regs::*;
use crate::code_buffer::CodeBuffer;
use crate::frame::*;
use crate::HostAbi;

/// Entry trampoline signature: `(frame, code) -> next address`.
type TrampolineFn = unsafe extern "C" fn(*mut JitFrame, *const u8) -> u32;

/// System V x86-64 host.
///
/// Register contract while generated code runs:
///
/// | register | holds                                  |
/// |----------|----------------------------------------|
/// | rbp      | [`JitFrame`] pointer                   |
/// | rbx      | guest GPR file                         |
/// | r12      | guest main memory base                 |
/// | r13      | packed handle of the running function  |
/// | r14      | link slot                              |
/// | r15      | guest COP0 file                        |
///
/// Generated code returns the next guest address in eax.
#[derive(Debug, Default)]
pub struct X86_64Abi {
    trampoline: usize,
    return_site: usize,
    link_exit: usize,
}

impl X86_64Abi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit the entry sequence of a function entry point: load the
    /// function's handle from the header in front of the code. `code`
    /// is the buffer offset where the function's code starts.
    pub fn emit_entry(buf: &mut CodeBuffer, code: usize) {
        emit_load_rip(buf, FUNC_REG, code - Self::HEADER_LEN);
    }

    /// Emit a call to the runtime callback stored at frame offset
    /// `slot`. Arguments must already be in place apart from the frame
    /// pointer, which is loaded into rdi here.
    pub fn emit_callback(buf: &mut CodeBuffer, slot: i32) {
        emit_mov_rr(buf, true, CALL_ARG_REGS[0], FRAME_REG);
        emit_arith_ri(buf, ArithOp::Sub, true, Reg::Rsp, 8);
        emit_call_mem32(buf, FRAME_REG, slot);
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, 8);
    }

    /// Emit a linkable exit. The next guest address must be in eax.
    /// Returns the offset of the exit site.
    pub fn emit_link_exit(buf: &mut CodeBuffer) -> usize {
        let site = buf.offset();
        emit_call_mem32(buf, FRAME_REG, FRAME_LINK_EXIT);
        site
    }

    /// Emit a plain exit returning `next`.
    pub fn emit_exit(buf: &mut CodeBuffer, next: u32) {
        emit_mov_ri(buf, false, Reg::Rax, next as u64);
        emit_ret(buf);
    }
}

impl HostAbi for X86_64Abi {
    const LINK_SITE_LEN: usize = CALL_MEM32_LEN;

    fn emit_trampoline(&mut self, buf: &mut CodeBuffer) {
        self.trampoline = buf.offset();

        for &reg in CALLEE_SAVED {
            emit_push(buf, reg);
        }
        if STACK_ADDEND != 0 {
            emit_arith_ri(buf, ArithOp::Sub, true, Reg::Rsp, STACK_ADDEND as i32);
        }

        emit_mov_rr(buf, true, FRAME_REG, CALL_ARG_REGS[0]);
        emit_load(buf, true, GPR_REG, FRAME_REG, FRAME_GPR);
        emit_load(buf, true, MEM_BASE_REG, FRAME_REG, FRAME_MEM_BASE);
        emit_load(buf, true, COP0_REG, FRAME_REG, FRAME_COP0);
        emit_load(buf, true, FUNC_REG, FRAME_REG, FRAME_FUNC);
        emit_mov_ri(buf, false, LINK_REG, 0);
        emit_call_reg(buf, CALL_ARG_REGS[1]);

        // Both exits arrive here with the next address in eax.
        self.return_site = buf.offset();
        emit_store(buf, true, LINK_REG, FRAME_REG, FRAME_EXIT_LINK);
        emit_store(buf, true, FUNC_REG, FRAME_REG, FRAME_EXIT_FUNC);
        if STACK_ADDEND != 0 {
            emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, STACK_ADDEND as i32);
        }
        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(buf, reg);
        }
        emit_ret(buf);

        let pad = (STACK_ALIGN - buf.offset() % STACK_ALIGN) % STACK_ALIGN;
        emit_nops(buf, pad);

        // Link-exit stub: record where the exit came from, then return
        // straight to the trampoline.
        self.link_exit = buf.offset();
        emit_pop(buf, LINK_REG);
        emit_ret(buf);

        debug!(
            trampoline = self.trampoline,
            return_site = self.return_site,
            link_exit = self.link_exit,
            "emitted x86-64 trampoline"
        );
    }

    fn trampoline_offset(&self) -> usize {
        self.trampoline
    }

    fn return_site_offset(&self) -> usize {
        self.return_site
    }

    fn link_exit_offset(&self) -> usize {
        self.link_exit
    }

    unsafe fn enter(&self, trampoline: *const u8, frame: *mut JitFrame, code: *const u8) -> RawExit {
        let entry: TrampolineFn = std::mem::transmute(trampoline);
        let next = entry(frame, code);
        RawExit {
            next,
            link_slot: (*frame).exit_link,
            func: (*frame).exit_func,
        }
    }

    fn patch_link(&self, buf: &mut CodeBuffer, site: usize, target: usize) {
        buf.patch_bytes(site, &jmp_over_call(site, target));
    }

    fn reset_link(&self, buf: &mut CodeBuffer, site: usize) {
        let end = buf.offset();
        buf.set_offset(site);
        emit_call_mem32(buf, FRAME_REG, FRAME_LINK_EXIT);
        buf.set_offset(end);
    }
}
