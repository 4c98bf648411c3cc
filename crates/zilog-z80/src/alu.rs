//! Flag-producing arithmetic and logic.
//!
//! Every function is pure: it takes operands (and the incoming F where the
//! instruction keeps some of it) and returns the result with a complete new
//! F. The executor decides where the value goes.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

/// Value and flags produced by an 8-bit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

impl AluResult {
    const fn new(value: u8, flags: u8) -> Self {
        Self { value, flags }
    }
}

/// The eight accumulator operations selected by bits 3-5 of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub(crate) const ALL: [AluOp; 8] = [
        AluOp::Add,
        AluOp::Adc,
        AluOp::Sub,
        AluOp::Sbc,
        AluOp::And,
        AluOp::Xor,
        AluOp::Or,
        AluOp::Cp,
    ];
}

/// The CB-page rotate and shift group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    /// Undocumented: shift left, bit 0 set.
    Sll,
    Srl,
}

impl ShiftOp {
    pub(crate) const ALL: [ShiftOp; 8] = [
        ShiftOp::Rlc,
        ShiftOp::Rrc,
        ShiftOp::Rl,
        ShiftOp::Rr,
        ShiftOp::Sla,
        ShiftOp::Sra,
        ShiftOp::Sll,
        ShiftOp::Srl,
    ];

    /// Rotate/shift `value`, returning `(result, carry_out)`.
    #[must_use]
    pub const fn apply(self, value: u8, carry_in: bool) -> (u8, bool) {
        let top = value & 0x80 != 0;
        let bottom = value & 0x01 != 0;
        let result = match self {
            ShiftOp::Rlc => value.rotate_left(1),
            ShiftOp::Rrc => value.rotate_right(1),
            ShiftOp::Rl => (value << 1) | carry_in as u8,
            ShiftOp::Rr => (value >> 1) | ((carry_in as u8) << 7),
            ShiftOp::Sla => value << 1,
            ShiftOp::Sra => (value >> 1) | (value & 0x80),
            ShiftOp::Sll => (value << 1) | 0x01,
            ShiftOp::Srl => value >> 1,
        };
        let carry = match self {
            ShiftOp::Rlc | ShiftOp::Rl | ShiftOp::Sla | ShiftOp::Sll => top,
            ShiftOp::Rrc | ShiftOp::Rr | ShiftOp::Sra | ShiftOp::Srl => bottom,
        };
        (result, carry)
    }
}

#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let wide = u16::from(a) + u16::from(b) + u16::from(c);
    let value = wide as u8;
    let mut flags = sz53(value);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if wide > 0xFF {
        flags |= CF;
    }
    AluResult::new(value, flags)
}

#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let mut flags = sz53(value) | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }
    AluResult::new(value, flags)
}

/// Run one accumulator operation. For `Cp` the value is `a` unchanged and
/// X/Y come from the operand rather than the difference.
#[must_use]
pub fn alu8(op: AluOp, a: u8, b: u8, carry: bool) -> AluResult {
    match op {
        AluOp::Add => add8(a, b, false),
        AluOp::Adc => add8(a, b, carry),
        AluOp::Sub => sub8(a, b, false),
        AluOp::Sbc => sub8(a, b, carry),
        AluOp::And => AluResult::new(a & b, sz53p(a & b) | HF),
        AluOp::Xor => AluResult::new(a ^ b, sz53p(a ^ b)),
        AluOp::Or => AluResult::new(a | b, sz53p(a | b)),
        AluOp::Cp => {
            let diff = sub8(a, b, false);
            AluResult::new(a, (diff.flags & !(YF | XF)) | (b & (YF | XF)))
        }
    }
}

/// INC r. Carry is carried over from `f`.
#[must_use]
pub fn inc8(value: u8, f: u8) -> AluResult {
    let result = value.wrapping_add(1);
    let mut flags = sz53(result) | (f & CF);
    if value & 0x0F == 0x0F {
        flags |= HF;
    }
    if value == 0x7F {
        flags |= PF;
    }
    AluResult::new(result, flags)
}

/// DEC r. Carry is carried over from `f`.
#[must_use]
pub fn dec8(value: u8, f: u8) -> AluResult {
    let result = value.wrapping_sub(1);
    let mut flags = sz53(result) | NF | (f & CF);
    if value & 0x0F == 0 {
        flags |= HF;
    }
    if value == 0x80 {
        flags |= PF;
    }
    AluResult::new(result, flags)
}

/// CB-page rotate/shift: S, Z, P from the result, H and N cleared.
#[must_use]
pub fn shift8(op: ShiftOp, value: u8, f: u8) -> AluResult {
    let (result, carry) = op.apply(value, f & CF != 0);
    AluResult::new(result, sz53p(result) | u8::from(carry))
}

/// RLCA/RRCA/RLA/RRA. Unlike the CB forms these keep S, Z and P/V.
#[must_use]
pub fn rotate_acc(op: ShiftOp, a: u8, f: u8) -> AluResult {
    let (result, carry) = op.apply(a, f & CF != 0);
    AluResult::new(
        result,
        (f & (SF | ZF | PF)) | (result & (YF | XF)) | u8::from(carry),
    )
}

/// BIT n. `xy` supplies the undocumented X/Y bits: the operand for
/// registers, the high byte of WZ for memory forms. Carry is kept from `f`.
#[must_use]
pub fn bit(n: u8, value: u8, xy: u8, f: u8) -> u8 {
    let set = value & (1 << n) != 0;
    let mut flags = HF | (xy & (YF | XF)) | (f & CF);
    if !set {
        flags |= ZF | PF;
    }
    if n == 7 && set {
        flags |= SF;
    }
    flags
}

/// Decimal adjust after BCD add or subtract.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let subtract = f & NF != 0;
    let half = f & HF != 0;
    let carry = f & CF != 0;
    let low = a & 0x0F;

    let mut correction = 0u8;
    let mut carry_out = carry;
    if half || low > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry_out = true;
    }

    let (value, half_out) = if subtract {
        (a.wrapping_sub(correction), half && low < 6)
    } else {
        (a.wrapping_add(correction), low > 9)
    };

    let mut flags = sz53p(value) | (f & NF);
    if half_out {
        flags |= HF;
    }
    if carry_out {
        flags |= CF;
    }
    AluResult::new(value, flags)
}

/// NEG: A = 0 - A.
#[must_use]
pub fn neg(a: u8) -> AluResult {
    let value = 0u8.wrapping_sub(a);
    let mut flags = sz53(value) | NF;
    if a & 0x0F != 0 {
        flags |= HF;
    }
    if a == 0x80 {
        flags |= PF;
    }
    if a != 0 {
        flags |= CF;
    }
    AluResult::new(value, flags)
}

/// CPL: H and N set, S/Z/P/C kept.
#[must_use]
pub fn cpl(a: u8, f: u8) -> AluResult {
    let value = !a;
    AluResult::new(
        value,
        (f & (SF | ZF | PF | CF)) | HF | NF | (value & (YF | XF)),
    )
}

/// SCF. X/Y follow A.
#[must_use]
pub fn scf(a: u8, f: u8) -> u8 {
    (f & (SF | ZF | PF)) | (a & (YF | XF)) | CF
}

/// CCF. H takes the old carry.
#[must_use]
pub fn ccf(a: u8, f: u8) -> u8 {
    let old_carry = f & CF;
    let mut flags = (f & (SF | ZF | PF)) | (a & (YF | XF));
    if old_carry != 0 {
        flags |= HF;
    } else {
        flags |= CF;
    }
    flags
}

/// Result of a nibble rotate through memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitRotate {
    pub a: u8,
    pub memory: u8,
    pub flags: u8,
}

/// RLD: the low nibble of A goes into (HL) from the right, the high nibble
/// of (HL) drops into A.
#[must_use]
pub fn rld(a: u8, memory: u8, f: u8) -> DigitRotate {
    let new_a = (a & 0xF0) | (memory >> 4);
    DigitRotate {
        a: new_a,
        memory: (memory << 4) | (a & 0x0F),
        flags: sz53p(new_a) | (f & CF),
    }
}

/// RRD: the mirror of [`rld`].
#[must_use]
pub fn rrd(a: u8, memory: u8, f: u8) -> DigitRotate {
    let new_a = (a & 0xF0) | (memory & 0x0F);
    DigitRotate {
        a: new_a,
        memory: (a << 4) | (memory >> 4),
        flags: sz53p(new_a) | (f & CF),
    }
}

/// ADD HL,rr. Only H, C and X/Y change; the caller keeps S, Z and P/V.
#[must_use]
pub fn add16(a: u16, b: u16) -> (u16, u8) {
    let wide = u32::from(a) + u32::from(b);
    let value = wide as u16;
    let mut flags = ((value >> 8) as u8) & (YF | XF);
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }
    if wide > 0xFFFF {
        flags |= CF;
    }
    (value, flags)
}

#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let wide = u32::from(a) + u32::from(b) + u32::from(c);
    let value = wide as u16;
    let mut flags = flags16(value);
    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if wide > 0xFFFF {
        flags |= CF;
    }
    (value, flags)
}

#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let mut flags = flags16(value) | NF;
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if u32::from(a) < u32::from(b) + u32::from(c) {
        flags |= CF;
    }
    (value, flags)
}

const fn flags16(value: u16) -> u8 {
    let hi = (value >> 8) as u8;
    let mut flags = hi & (SF | YF | XF);
    if value == 0 {
        flags |= ZF;
    }
    flags
}
