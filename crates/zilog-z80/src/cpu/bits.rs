//! CB-page rotate, shift and bit operations.

use emu_core::Bus;

use super::{Target, Z80};
use crate::alu::{self, ShiftOp};
use crate::decode::{Operand, Reg8};

impl Z80 {
    pub(super) fn shift<B: Bus>(
        &mut self,
        bus: &mut B,
        op: ShiftOp,
        operand: Operand,
        copy: Option<Reg8>,
    ) {
        let target = self.resolve(bus, operand);
        let value = self.load(bus, target);
        let result = alu::shift8(op, value, self.regs.f);
        self.store(bus, target, result.value);
        if let Some(reg) = copy {
            self.set_reg8(reg, result.value);
        }
        self.regs.f = result.flags;
    }

    /// BIT n. Memory forms leak WZ's high byte into X/Y.
    pub(super) fn bit_test<B: Bus>(&mut self, bus: &mut B, bit: u8, operand: Operand) {
        let target = self.resolve(bus, operand);
        let value = self.load(bus, target);
        let xy = match target {
            Target::Reg(_) => value,
            Target::Addr(_) | Target::Value(_) => (self.regs.wz >> 8) as u8,
        };
        self.regs.f = alu::bit(bit, value, xy, self.regs.f);
    }

    /// RES n / SET n. Flags are untouched.
    pub(super) fn bit_write<B: Bus>(
        &mut self,
        bus: &mut B,
        bit: u8,
        operand: Operand,
        copy: Option<Reg8>,
        set: bool,
    ) {
        let target = self.resolve(bus, operand);
        let value = self.load(bus, target);
        let mask = 1u8 << bit;
        let result = if set { value | mask } else { value & !mask };
        self.store(bus, target, result);
        if let Some(reg) = copy {
            self.set_reg8(reg, result);
        }
    }
}
