//! Per-operation semantics.

use emu_core::Bus;

use super::{Target, Z80, read_word, write_word};
use crate::alu::{self, AluOp};
use crate::decode::{Op, Operand, Ptr};
use crate::flags::{CF, PF, SF, ZF, sz53, sz53p};
use crate::registers::read_pair;

/// Surcharges for the taken side of conditional control flow.
const JR_TAKEN: u32 = 5;
const CALL_TAKEN: u32 = 7;
const RET_TAKEN: u32 = 6;

impl Z80 {
    /// Run `op` and return the T-states it cost, starting from the table's
    /// base figure.
    pub(super) fn execute<B: Bus>(&mut self, bus: &mut B, op: Op, base: u32) -> u32 {
        match op {
            Op::Nop => {}
            Op::Halt => self.regs.halted = true,

            // 8-bit loads
            Op::Ld { dst, src } => {
                // Destination first: LD (IX+d),n has d before n.
                let dst = self.resolve(bus, dst);
                let src = self.resolve(bus, src);
                let value = self.load(bus, src);
                self.store(bus, dst, value);
            }
            Op::LoadA(ptr) => {
                let addr = self.pointer(bus, ptr);
                self.regs.a = bus.read(addr);
                self.regs.wz = addr.wrapping_add(1);
            }
            Op::StoreA(ptr) => {
                let addr = self.pointer(bus, ptr);
                bus.write(addr, self.regs.a);
                self.regs.wz = read_pair(self.regs.a, addr.wrapping_add(1) as u8);
            }
            Op::LdIA => self.regs.i = self.regs.a,
            Op::LdRA => self.regs.r = self.regs.a,
            Op::LdAI => self.load_a_special(self.regs.i),
            Op::LdAR => self.load_a_special(self.regs.r),

            // 16-bit loads and stack
            Op::LdImm16(reg) => {
                let value = self.fetch_word(bus);
                self.set_reg16(reg, value);
            }
            Op::LoadWord(reg) => {
                let addr = self.fetch_word(bus);
                let value = read_word(bus, addr);
                self.set_reg16(reg, value);
                self.regs.wz = addr.wrapping_add(1);
            }
            Op::StoreWord(reg) => {
                let addr = self.fetch_word(bus);
                write_word(bus, addr, self.reg16(reg));
                self.regs.wz = addr.wrapping_add(1);
            }
            Op::LdSp(reg) => self.regs.sp = self.reg16(reg),
            Op::Push(reg) => self.push(bus, self.reg16(reg)),
            Op::Pop(reg) => {
                let value = self.pop(bus);
                self.set_reg16(reg, value);
            }

            // Exchanges
            Op::ExDeHl => {
                let de = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(de);
            }
            Op::ExAf => self.regs.exchange_af(),
            Op::Exx => self.regs.exchange_main(),
            Op::ExSp(reg) => {
                let sp = self.regs.sp;
                let value = read_word(bus, sp);
                write_word(bus, sp, self.reg16(reg));
                self.set_reg16(reg, value);
                self.regs.wz = value;
            }

            // 8-bit arithmetic
            Op::Alu { op, src } => {
                let src = self.resolve(bus, src);
                let value = self.load(bus, src);
                let result = alu::alu8(op, self.regs.a, value, self.regs.f & CF != 0);
                if op != AluOp::Cp {
                    self.regs.a = result.value;
                }
                self.regs.f = result.flags;
            }
            Op::Inc(target) => self.read_modify_write(bus, target, alu::inc8),
            Op::Dec(target) => self.read_modify_write(bus, target, alu::dec8),
            Op::RotateA(op) => {
                let result = alu::rotate_acc(op, self.regs.a, self.regs.f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            Op::Daa => {
                let result = alu::daa(self.regs.a, self.regs.f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            Op::Cpl => {
                let result = alu::cpl(self.regs.a, self.regs.f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            Op::Neg => {
                let result = alu::neg(self.regs.a);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            Op::Scf => self.regs.f = alu::scf(self.regs.a, self.regs.f),
            Op::Ccf => self.regs.f = alu::ccf(self.regs.a, self.regs.f),
            Op::Rld | Op::Rrd => {
                let hl = self.regs.hl();
                let memory = bus.read(hl);
                let result = if op == Op::Rld {
                    alu::rld(self.regs.a, memory, self.regs.f)
                } else {
                    alu::rrd(self.regs.a, memory, self.regs.f)
                };
                bus.write(hl, result.memory);
                self.regs.a = result.a;
                self.regs.f = result.flags;
                self.regs.wz = hl.wrapping_add(1);
            }

            // 16-bit arithmetic
            Op::Inc16(reg) => self.set_reg16(reg, self.reg16(reg).wrapping_add(1)),
            Op::Dec16(reg) => self.set_reg16(reg, self.reg16(reg).wrapping_sub(1)),
            Op::Add16 { dst, src } => {
                let a = self.reg16(dst);
                let (value, flags) = alu::add16(a, self.reg16(src));
                self.set_reg16(dst, value);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
                self.regs.wz = a.wrapping_add(1);
            }
            Op::Adc16(reg) | Op::Sbc16(reg) => {
                let hl = self.regs.hl();
                let carry = self.regs.f & CF != 0;
                let (value, flags) = if matches!(op, Op::Adc16(_)) {
                    alu::adc16(hl, self.reg16(reg), carry)
                } else {
                    alu::sbc16(hl, self.reg16(reg), carry)
                };
                self.regs.set_hl(value);
                self.regs.f = flags;
                self.regs.wz = hl.wrapping_add(1);
            }

            // Control flow
            Op::Jp(cond) => {
                let addr = self.fetch_word(bus);
                self.regs.wz = addr;
                if self.condition(cond) {
                    self.regs.pc = addr;
                }
            }
            Op::JpInd(reg) => self.regs.pc = self.reg16(reg),
            Op::Jr(cond) => {
                let offset = self.fetch_byte(bus) as i8;
                if self.condition(cond) {
                    self.relative_jump(offset);
                    if cond.is_some() {
                        return base + JR_TAKEN;
                    }
                }
            }
            Op::Djnz => {
                let offset = self.fetch_byte(bus) as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.relative_jump(offset);
                    return base + JR_TAKEN;
                }
            }
            Op::Call(cond) => {
                let addr = self.fetch_word(bus);
                self.regs.wz = addr;
                if self.condition(cond) {
                    self.push(bus, self.regs.pc);
                    self.regs.pc = addr;
                    if cond.is_some() {
                        return base + CALL_TAKEN;
                    }
                }
            }
            Op::Ret(cond) => {
                if self.condition(cond) {
                    self.regs.pc = self.pop(bus);
                    self.regs.wz = self.regs.pc;
                    if cond.is_some() {
                        return base + RET_TAKEN;
                    }
                }
            }
            Op::Reti | Op::Retn => {
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop(bus);
                self.regs.wz = self.regs.pc;
            }
            Op::Rst(vector) => {
                self.push(bus, self.regs.pc);
                self.regs.pc = u16::from(vector);
                self.regs.wz = self.regs.pc;
            }

            // Interrupt control
            Op::Di => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }
            Op::Ei => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.ei_delay = true;
            }
            Op::Im(mode) => self.regs.im = mode,

            // I/O
            Op::InImm => {
                let n = self.fetch_byte(bus);
                let port = read_pair(self.regs.a, n);
                self.regs.a = bus.io_read(port);
                self.regs.wz = port.wrapping_add(1);
            }
            Op::OutImm => {
                let n = self.fetch_byte(bus);
                let port = read_pair(self.regs.a, n);
                bus.io_write(port, self.regs.a);
                self.regs.wz = read_pair(self.regs.a, n.wrapping_add(1));
            }
            Op::InC(reg) => {
                let port = self.regs.bc();
                let value = bus.io_read(port);
                if let Some(reg) = reg {
                    self.set_reg8(reg, value);
                }
                self.regs.f = sz53p(value) | (self.regs.f & CF);
                self.regs.wz = port.wrapping_add(1);
            }
            Op::OutC(reg) => {
                let port = self.regs.bc();
                let value = reg.map_or(0, |r| self.reg8(r));
                bus.io_write(port, value);
                self.regs.wz = port.wrapping_add(1);
            }

            Op::Block(block) => return self.block(bus, block, base),

            Op::Shift { op, target, copy } => self.shift(bus, op, target, copy),
            Op::Bit { bit, target } => self.bit_test(bus, bit, target),
            Op::Res { bit, target, copy } => self.bit_write(bus, bit, target, copy, false),
            Op::Set { bit, target, copy } => self.bit_write(bus, bit, target, copy, true),
        }
        base
    }

    fn pointer<B: Bus>(&mut self, bus: &mut B, ptr: Ptr) -> u16 {
        match ptr {
            Ptr::Bc => self.regs.bc(),
            Ptr::De => self.regs.de(),
            Ptr::Abs => self.fetch_word(bus),
        }
    }

    /// LD A,I / LD A,R: P/V reports IFF2.
    fn load_a_special(&mut self, value: u8) {
        self.regs.a = value;
        let mut flags = sz53(value) | (self.regs.f & CF);
        if self.regs.iff2 {
            flags |= PF;
        }
        self.regs.f = flags;
    }

    fn relative_jump(&mut self, offset: i8) {
        self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(offset));
        self.regs.wz = self.regs.pc;
    }

    fn read_modify_write<B: Bus>(
        &mut self,
        bus: &mut B,
        operand: Operand,
        f: fn(u8, u8) -> alu::AluResult,
    ) {
        let target: Target = self.resolve(bus, operand);
        let value = self.load(bus, target);
        let result = f(value, self.regs.f);
        self.store(bus, target, result.value);
        self.regs.f = result.flags;
    }
}
