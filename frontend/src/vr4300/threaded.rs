//! Threaded-code translator for x86-64 hosts.
//!
//! Loads and stores become calls to the memory callback with the
//! effective address computed inline. Every other guest instruction
//! becomes a call to the interpreter callback with the instruction word
//! baked in as an immediate. Exits out of a function take a count
//! checkpoint and, for statically known destinations, leave through a
//! linkable exit so the driver can chain them directly to the next
//! function.

use std::io;

use dyna_backend::frame::{
    FRAME_COP1_UNUSABLE, FRAME_FPR, FRAME_INTERPRET, FRAME_LAST_PC, FRAME_MEM_ACCESS, FRAME_SPILL,
    FRAME_UPDATE_COUNT,
};
use dyna_backend::x86_64::emitter::*;
use dyna_backend::x86_64::regs::{Reg, COP0_REG, FRAME_REG, GPR_REG};
use dyna_backend::{CodeBuffer, HostAbi, X86_64Abi};
use dyna_core::cpu::{cop0, status};
use dyna_core::insn::{flow, op, Flow};
use dyna_core::{AccessKind, Insn, TranslateError, INSN_WIDTH};
use dyna_exec::{Compiled, GuestCode, Translator};
use tracing::trace;

use crate::DisasJumpType;

/// Scratch space for one function.
const SCRATCH_SIZE: usize = 512 * 1024;

/// Upper bound of host code emitted for one guest instruction,
/// including the largest exit sequence.
const MAX_INSN_CODE: usize = 256;

pub struct ThreadedTranslator {
    buf: CodeBuffer,
}

impl ThreadedTranslator {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            buf: CodeBuffer::new(SCRATCH_SIZE)?,
        })
    }
}

impl Translator for ThreadedTranslator {
    fn compile(&mut self, src: &GuestCode<'_>, addr: u32) -> Result<Compiled, TranslateError> {
        if src.backing.is_none() {
            return Err(TranslateError::NoCode(addr));
        }
        let first = src.word(addr).ok_or(TranslateError::Fetch(addr))?;

        let buf = &mut self.buf;
        let code_start = X86_64Abi::HEADER_LEN;
        buf.set_offset(code_start);

        let max_insns = src.max_insns.max(1);
        let mut entries = Vec::new();
        let mut pc = addr;
        let mut word = first;
        let mut num_insns = 0u32;

        let is_jmp = loop {
            entries.push((pc, buf.offset() - code_start));
            X86_64Abi::emit_entry(buf, code_start);
            match access_kind(Insn(word)) {
                Some(kind) => emit_mem_access(buf, Insn(word), kind, pc),
                None => emit_interpret(buf, word, pc),
            }
            num_insns += 1;

            match flow(Insn(word), pc) {
                Flow::Next => {
                    emit_redirect_check(buf);
                    pc = pc.wrapping_add(INSN_WIDTH);
                    let next_word = if num_insns < max_insns
                        && pc < src.block_end
                        && buf.remaining() >= MAX_INSN_CODE
                    {
                        src.word(pc)
                    } else {
                        None
                    };
                    match next_word {
                        Some(w) => word = w,
                        None => {
                            emit_mov_ri(buf, false, Reg::Rax, pc as u64);
                            emit_checkpoint_exit(buf, pc, &[pc]);
                            break DisasJumpType::TooMany;
                        }
                    }
                }
                Flow::Branch { taken, fallthrough } => {
                    emit_fix_fallthrough(buf, pc);
                    let targets: &[u32] = if taken == fallthrough {
                        &[taken]
                    } else {
                        &[taken, fallthrough]
                    };
                    pc = pc.wrapping_add(2 * INSN_WIDTH);
                    emit_checkpoint_exit(buf, pc, targets);
                    break DisasJumpType::NoReturn;
                }
                Flow::Jump { target } => {
                    emit_fix_fallthrough(buf, pc);
                    pc = pc.wrapping_add(2 * INSN_WIDTH);
                    emit_checkpoint_exit(buf, pc, &[target]);
                    break DisasJumpType::NoReturn;
                }
                Flow::Indirect => {
                    emit_fix_fallthrough(buf, pc);
                    pc = pc.wrapping_add(2 * INSN_WIDTH);
                    emit_checkpoint_exit(buf, pc, &[]);
                    break DisasJumpType::NoReturn;
                }
                Flow::Exit => {
                    emit_fix_fallthrough(buf, pc);
                    pc = pc.wrapping_add(INSN_WIDTH);
                    emit_checkpoint_exit(buf, pc, &[]);
                    break DisasJumpType::NoReturn;
                }
            }
        };

        let len = buf.offset() - code_start;
        trace!(
            start = format_args!("{:#010x}", addr),
            end = format_args!("{:#010x}", pc),
            insns = num_insns,
            bytes = len,
            ?is_jmp,
            "translated"
        );
        Ok(Compiled {
            start_addr: addr,
            end_addr: pc,
            code: buf.bytes(code_start, len).to_vec(),
            entries,
        })
    }
}

/// `interpret(frame, word, pc, 0)`, redirect in eax.
fn emit_interpret(buf: &mut CodeBuffer, word: u32, pc: u32) {
    emit_mov_ri(buf, false, Reg::Rsi, word as u64);
    emit_mov_ri(buf, false, Reg::Rdx, pc as u64);
    emit_mov_ri(buf, false, Reg::Rcx, 0);
    X86_64Abi::emit_callback(buf, FRAME_INTERPRET);
}

fn access_kind(insn: Insn) -> Option<AccessKind> {
    let kind = match insn.op() {
        op::LB => AccessKind::Lb,
        op::LBU => AccessKind::Lbu,
        op::LH => AccessKind::Lh,
        op::LHU => AccessKind::Lhu,
        op::LW => AccessKind::Lw,
        op::LWU => AccessKind::Lwu,
        op::LD => AccessKind::Ld,
        op::SB => AccessKind::Sb,
        op::SH => AccessKind::Sh,
        op::SW => AccessKind::Sw,
        op::SD => AccessKind::Sd,
        op::LWC1 => AccessKind::Lwc1,
        op::LDC1 => AccessKind::Ldc1,
        op::SWC1 => AccessKind::Swc1,
        op::SDC1 => AccessKind::Sdc1,
        _ => return None,
    };
    Some(kind)
}

/// Displacement of COP0 Status from the pinned COP0 pointer.
const STATUS_DISP: i32 = (cop0::STATUS * 4) as i32;

/// `ecx = Status & mask`, flags set.
fn emit_status_test(buf: &mut CodeBuffer, mask: u32) {
    emit_load(buf, false, Reg::Rcx, COP0_REG, STATUS_DISP);
    emit_arith_ri(buf, ArithOp::And, false, Reg::Rcx, mask as i32);
}

/// `mem_access(frame, value, gpr[rs] + imm, kind, pc, 0)`, redirect in
/// eax. COP1 accesses first check Status.CU1 and leave through the
/// unusable trap when it is clear.
fn emit_mem_access(buf: &mut CodeBuffer, insn: Insn, kind: AccessKind, pc: u32) {
    let rt = insn.rt();
    if kind.is_fpu() {
        emit_status_test(buf, status::CU1);
        let usable = emit_jcc_fwd(buf, X86Cond::Jne);
        emit_mov_ri(buf, false, Reg::Rsi, pc as u64);
        emit_mov_ri(buf, false, Reg::Rdx, 0);
        X86_64Abi::emit_callback(buf, FRAME_COP1_UNUSABLE);
        emit_ret(buf);
        patch_rel32(buf, usable);
    }

    match kind {
        AccessKind::Swc1 | AccessKind::Sdc1 => emit_fpr_value(buf, kind, rt),
        _ if kind.is_store() => emit_load(buf, true, Reg::Rsi, GPR_REG, 8 * rt as i32),
        _ => emit_mov_ri(buf, false, Reg::Rsi, rt as u64),
    }
    emit_load(buf, false, Reg::Rdx, GPR_REG, 8 * insn.rs() as i32);
    if insn.simm() != 0 {
        emit_arith_ri(buf, ArithOp::Add, false, Reg::Rdx, insn.simm() as i32);
    }
    emit_mov_ri(buf, false, Reg::Rcx, kind as u64);
    emit_mov_ri(buf, false, Reg::R8, pc as u64);
    emit_mov_ri(buf, false, Reg::R9, 0);
    X86_64Abi::emit_callback(buf, FRAME_MEM_ACCESS);
}

/// Raw bits of FPR `ft` into rsi for a COP1 store. With Status.FR
/// clear an odd single lives in the upper half of the even register
/// below it and an odd double names the even one.
fn emit_fpr_value(buf: &mut CodeBuffer, kind: AccessKind, ft: usize) {
    let wide = kind == AccessKind::Sdc1;
    let own = 8 * ft as i32;
    let paired = if wide { 8 * (ft & !1) as i32 } else { 8 * (ft & !1) as i32 + 4 };
    emit_load(buf, true, Reg::Rax, FRAME_REG, FRAME_FPR);
    if ft & 1 == 0 {
        emit_load(buf, wide, Reg::Rsi, Reg::Rax, own);
        return;
    }
    emit_status_test(buf, status::FR);
    let split = emit_jcc_fwd(buf, X86Cond::Je);
    emit_load(buf, wide, Reg::Rsi, Reg::Rax, own);
    let done = emit_jmp_fwd(buf);
    patch_rel32(buf, split);
    emit_load(buf, wide, Reg::Rsi, Reg::Rax, paired);
    patch_rel32(buf, done);
}

/// Straight-line instruction: leave with the redirect if there is one.
fn emit_redirect_check(buf: &mut CodeBuffer) {
    emit_test_rr(buf, false, Reg::Rax, Reg::Rax);
    let cont = emit_jcc_fwd(buf, X86Cond::Je);
    emit_ret(buf);
    patch_rel32(buf, cont);
}

/// A control transfer landing on `pc + 4` reports 0; turn it back into
/// an address.
fn emit_fix_fallthrough(buf: &mut CodeBuffer, pc: u32) {
    emit_test_rr(buf, false, Reg::Rax, Reg::Rax);
    let done = emit_jcc_fwd(buf, X86Cond::Jne);
    emit_mov_ri(buf, false, Reg::Rax, pc.wrapping_add(INSN_WIDTH) as u64);
    patch_rel32(buf, done);
}

/// Function exit with the next address in eax.
///
/// Takes a count checkpoint at `pc`. When an interrupt is due the exit
/// is a plain return; otherwise a next address equal to one of
/// `targets` leaves through a linkable exit for that target.
fn emit_checkpoint_exit(buf: &mut CodeBuffer, pc: u32, targets: &[u32]) {
    emit_store(buf, false, Reg::Rax, FRAME_REG, FRAME_SPILL);
    emit_mov_ri(buf, false, Reg::Rsi, pc as u64);
    X86_64Abi::emit_callback(buf, FRAME_UPDATE_COUNT);
    emit_mov_rr(buf, false, Reg::Rcx, Reg::Rax);
    emit_load(buf, false, Reg::Rax, FRAME_REG, FRAME_SPILL);

    emit_test_rr(buf, false, Reg::Rcx, Reg::Rcx);
    let due = emit_jcc_fwd(buf, X86Cond::Jle);
    for &target in targets {
        emit_arith_ri(buf, ArithOp::Cmp, false, Reg::Rax, target as i32);
        let other = emit_jcc_fwd(buf, X86Cond::Jne);
        // Linked code continues at the target without passing the
        // driver, so the checkpoint moves there.
        emit_load(buf, true, Reg::Rdx, FRAME_REG, FRAME_LAST_PC);
        emit_store_imm(buf, false, Reg::Rdx, 0, target as i32);
        X86_64Abi::emit_link_exit(buf);
        patch_rel32(buf, other);
    }
    patch_rel32(buf, due);
    emit_ret(buf);
}
