//! x86-64 instruction encoder.
//!
//! Only the forms the trampoline and the translators need. Everything
//! goes through [`encode`], which takes care of REX and ModR/M.

use super::regs::Reg;
use crate::code_buffer::CodeBuffer;

pub const NOP: u8 = 0x90;
pub const RET: u8 = 0xC3;
pub const JMP_REL32: u8 = 0xE9;
/// Group 5: `/2` is an indirect call.
pub const GRP5: u8 = 0xFF;
const GRP5_CALL: u8 = 2;

/// Length of `call [base + disp32]` for a base below r8.
pub const CALL_MEM32_LEN: usize = 6;

/// Group 1 arithmetic, the value is the `/digit` of 0x81/0x83.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Condition nibble of `Jcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    Je = 0x4,
    Jne = 0x5,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

/// The r/m side of an instruction.
#[derive(Debug, Clone, Copy)]
enum Rm {
    Reg(Reg),
    /// `[base + disp]`, shortest displacement.
    Mem(Reg, i32),
    /// `[base + disp32]`, fixed length.
    Mem32(Reg, i32),
    /// `[rip + disp32]`.
    Rip(i32),
}

/// Emit `opcode` with an optional REX prefix, then the ModR/M byte
/// (and SIB and displacement) for `field` and `rm`. `field` is either a
/// register number or a `/digit` extension.
fn encode(buf: &mut CodeBuffer, opcode: &[u8], wide: bool, field: u8, rm: Rm) {
    let base = match rm {
        Rm::Reg(r) | Rm::Mem(r, _) | Rm::Mem32(r, _) => r as u8,
        Rm::Rip(_) => 0,
    };
    let rex = ((wide as u8) << 3) | ((field >> 3) << 2) | (base >> 3);
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    buf.emit_bytes(opcode);

    let reg = (field & 7) << 3;
    match rm {
        Rm::Reg(r) => buf.emit_u8(0xC0 | reg | r.low3()),
        Rm::Rip(disp) => {
            buf.emit_u8(reg | 0b101);
            buf.emit_u32(disp as u32);
        }
        Rm::Mem(r, disp) | Rm::Mem32(r, disp) => {
            let fixed = matches!(rm, Rm::Mem32(..));
            // rbp and r13 have no displacement-free form.
            let md = if fixed || !(-128..=127).contains(&disp) {
                0x80
            } else if disp == 0 && r.low3() != 5 {
                0x00
            } else {
                0x40
            };
            buf.emit_u8(md | reg | r.low3());
            // rsp and r12 as a base need a SIB byte.
            if r.low3() == 4 {
                buf.emit_u8(0x24);
            }
            match md {
                0x40 => buf.emit_u8(disp as u8),
                0x80 => buf.emit_u32(disp as u32),
                _ => {}
            }
        }
    }
}

/// `op dst, imm`, sign-extended imm8 when it fits.
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, wide: bool, dst: Reg, imm: i32) {
    if let Ok(imm8) = i8::try_from(imm) {
        encode(buf, &[0x83], wide, op as u8, Rm::Reg(dst));
        buf.emit_u8(imm8 as u8);
    } else {
        encode(buf, &[0x81], wide, op as u8, Rm::Reg(dst));
        buf.emit_u32(imm as u32);
    }
}

pub fn emit_test_rr(buf: &mut CodeBuffer, wide: bool, a: Reg, b: Reg) {
    encode(buf, &[0x85], wide, b as u8, Rm::Reg(a));
}

pub fn emit_mov_rr(buf: &mut CodeBuffer, wide: bool, dst: Reg, src: Reg) {
    encode(buf, &[0x89], wide, src as u8, Rm::Reg(dst));
}

/// `mov reg, imm`. Zero is a 32-bit xor, values that fit in 32 bits use
/// the zero-extending 32-bit form.
pub fn emit_mov_ri(buf: &mut CodeBuffer, wide: bool, reg: Reg, val: u64) {
    if val == 0 {
        encode(buf, &[0x31], false, reg as u8, Rm::Reg(reg));
        return;
    }
    let long = wide && val > u32::MAX as u64;
    let rex = ((long as u8) << 3) | ((reg as u8) >> 3);
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    buf.emit_u8(0xB8 + reg.low3());
    if long {
        buf.emit_u64(val);
    } else {
        buf.emit_u32(val as u32);
    }
}

/// `mov dst, [base + offset]`
pub fn emit_load(buf: &mut CodeBuffer, wide: bool, dst: Reg, base: Reg, offset: i32) {
    encode(buf, &[0x8B], wide, dst as u8, Rm::Mem(base, offset));
}

/// `mov [base + offset], src`
pub fn emit_store(buf: &mut CodeBuffer, wide: bool, src: Reg, base: Reg, offset: i32) {
    encode(buf, &[0x89], wide, src as u8, Rm::Mem(base, offset));
}

/// `mov [base + offset], imm32`
pub fn emit_store_imm(buf: &mut CodeBuffer, wide: bool, base: Reg, offset: i32, imm: i32) {
    encode(buf, &[0xC7], wide, 0, Rm::Mem(base, offset));
    buf.emit_u32(imm as u32);
}

/// `mov dst, qword [rip + disp]` reading the operand at buffer offset
/// `target`.
pub fn emit_load_rip(buf: &mut CodeBuffer, dst: Reg, target: usize) {
    // REX.W, opcode, ModR/M, disp32
    let end = buf.offset() + 7;
    encode(buf, &[0x8B], true, dst as u8, Rm::Rip((target as i64 - end as i64) as i32));
}

/// `jcc rel32` with the displacement left open. Returns the offset of
/// the displacement for [`patch_rel32`].
pub fn emit_jcc_fwd(buf: &mut CodeBuffer, cond: X86Cond) -> usize {
    buf.emit_bytes(&[0x0F, 0x80 | cond as u8]);
    let at = buf.offset();
    buf.emit_u32(0);
    at
}

/// `jmp rel32` with the displacement left open, see [`emit_jcc_fwd`].
pub fn emit_jmp_fwd(buf: &mut CodeBuffer) -> usize {
    buf.emit_u8(JMP_REL32);
    let at = buf.offset();
    buf.emit_u32(0);
    at
}

/// Point the rel32 displacement at `at` to the current offset.
pub fn patch_rel32(buf: &mut CodeBuffer, at: usize) {
    let disp = buf.offset() as i64 - (at as i64 + 4);
    buf.patch_u32(at, disp as u32);
}

/// `call reg`
pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    encode(buf, &[GRP5], false, GRP5_CALL, Rm::Reg(reg));
}

/// `call [base + disp32]`. The displacement is always 32 bits wide so
/// the length does not depend on `offset`.
pub fn emit_call_mem32(buf: &mut CodeBuffer, base: Reg, offset: i32) {
    assert!(base.low3() != 4, "SIB base not supported");
    encode(buf, &[GRP5], false, GRP5_CALL, Rm::Mem32(base, offset));
}

/// Bytes of `jmp rel32` from `site` to `target`, padded with NOPs to
/// [`CALL_MEM32_LEN`] so it can overwrite a memory call in place.
pub fn jmp_over_call(site: usize, target: usize) -> [u8; CALL_MEM32_LEN] {
    let disp = (target as i64 - (site as i64 + 5)) as i32;
    let mut bytes = [NOP; CALL_MEM32_LEN];
    bytes[0] = JMP_REL32;
    bytes[1..5].copy_from_slice(&disp.to_le_bytes());
    bytes
}

pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    if reg.needs_rex() {
        buf.emit_u8(0x41);
    }
    buf.emit_u8(0x50 + reg.low3());
}

pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    if reg.needs_rex() {
        buf.emit_u8(0x41);
    }
    buf.emit_u8(0x58 + reg.low3());
}

pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(RET);
}

/// `n` bytes of padding in the recommended multi-byte NOP forms.
pub fn emit_nops(buf: &mut CodeBuffer, mut n: usize) {
    const FORMS: [&[u8]; 5] = [
        &[NOP],
        &[0x66, NOP],
        &[0x0F, 0x1F, 0x00],
        &[0x0F, 0x1F, 0x40, 0x00],
        &[0x0F, 0x1F, 0x44, 0x00, 0x00],
    ];
    while n > 0 {
        let len = n.min(FORMS.len());
        buf.emit_bytes(FORMS[len - 1]);
        n -= len;
    }
}
