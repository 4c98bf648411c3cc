//! Z80 CPU core: fetch, prefix handling, interrupts.

mod bits;
mod block;
mod execute;

use std::fmt;

use emu_core::{Bus, Cpu, Observable, Step, Ticks, Value};
use log::trace;

use crate::decode::{self, Condition, Index, MemRef, Operand, Prefix, Reg8, Reg16};
use crate::flags::{CF, HF, NF, PF, SF, ZF};
use crate::registers::{InterruptMode, Registers, read_pair, write_pair};

/// Stack pointer after reset. CP/M loaders expect a usable stack below the
/// BDOS before they set their own.
pub const RESET_SP: u16 = 0xF000;

/// Data bus value during interrupt acknowledge.
const FLOATING_BUS: u8 = 0xFF;

/// The CPU fetched a byte sequence with no decode-table entry.
///
/// PC has already moved past the fetched bytes and the nominal cost has been
/// charged; nothing else changed. The caller decides whether to stop or
/// carry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub prefix: Prefix,
    pub opcode: u8,
    /// Address of the first byte of the instruction.
    pub address: u16,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unimplemented instruction")?;
        for byte in self.prefix.bytes() {
            write!(f, " {byte:02X}")?;
        }
        write!(f, " {:02X} at {:04X}", self.opcode, self.address)
    }
}

impl std::error::Error for DecodeError {}

/// Where a resolved 8-bit operand lives.
#[derive(Debug, Clone, Copy)]
enum Target {
    Reg(Reg8),
    Addr(u16),
    Value(u8),
}

/// Zilog Z80, stepped one instruction at a time.
pub struct Z80 {
    pub regs: Registers,
    cycles: Ticks,
    /// Displacement fetched ahead of the opcode in DDCB/FDCB forms.
    displacement: Option<i8>,
    /// Set by EI; blocks interrupt acceptance until the next instruction
    /// has run.
    ei_delay: bool,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers {
                sp: RESET_SP,
                ..Registers::default()
            },
            cycles: Ticks::ZERO,
            displacement: None,
            ei_delay: false,
        }
    }

    /// Power-on state. The cycle counter is a session statistic and survives.
    pub fn reset(&mut self) {
        self.regs = Registers {
            sp: RESET_SP,
            ..Registers::default()
        };
        self.displacement = None;
        self.ei_delay = false;
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    #[must_use]
    pub fn sp(&self) -> u16 {
        self.regs.sp
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.regs.sp = sp;
    }

    #[must_use]
    pub fn cycles(&self) -> Ticks {
        self.cycles
    }

    pub fn set_cycles(&mut self, cycles: Ticks) {
        self.cycles = cycles;
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// True between EI and the end of the instruction after it.
    #[must_use]
    pub fn in_ei_shadow(&self) -> bool {
        self.ei_delay
    }

    /// Execute one instruction.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<Step, DecodeError> {
        if self.regs.halted {
            self.regs.increment_r();
            self.cycles += 4;
            return Ok(Step::Halted);
        }

        self.ei_delay = false;
        let start = self.regs.pc;
        let (prefix, opcode, superseded) = self.fetch_instruction(bus);

        let Some(instr) = decode::lookup(prefix, opcode) else {
            let fetched = u32::from(self.regs.pc.wrapping_sub(start));
            self.cycles += 4 * fetched;
            self.displacement = None;
            return Err(DecodeError {
                prefix,
                opcode,
                address: start,
            });
        };

        let cycles = self.execute(bus, instr.op, u32::from(instr.cycles)) + 4 * superseded;
        self.displacement = None;
        self.cycles += cycles;

        if self.regs.halted {
            Ok(Step::Halted)
        } else {
            Ok(Step::Executed { cycles })
        }
    }

    /// Maskable interrupt.
    ///
    /// The data bus floats at 0xFF during acknowledge. IM 0 and IM 1 both
    /// land on 0x0038 (0xFF is RST 38h); IM 2 jumps through the vector at
    /// `I:FF`.
    pub fn interrupt<B: Bus>(&mut self, bus: &mut B) -> bool {
        if !self.regs.iff1 || self.ei_delay {
            return false;
        }
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.halted = false;
        self.regs.increment_r();
        self.push(bus, self.regs.pc);

        let (target, cost) = match self.regs.im {
            InterruptMode::Mode0 | InterruptMode::Mode1 => (0x0038, 13),
            InterruptMode::Mode2 => {
                let vector = read_pair(self.regs.i, FLOATING_BUS);
                (read_word(bus, vector), 19)
            }
        };
        trace!(
            "IM {} interrupt from {:04X} to {target:04X}",
            self.regs.im.number(),
            self.regs.pc
        );
        self.regs.pc = target;
        self.regs.wz = target;
        self.cycles += cost;
        true
    }

    /// Non-maskable interrupt. IFF1 is parked in IFF2 for RETN.
    pub fn nmi<B: Bus>(&mut self, bus: &mut B) {
        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;
        self.regs.halted = false;
        self.regs.increment_r();
        self.push(bus, self.regs.pc);
        trace!("NMI from {:04X}", self.regs.pc);
        self.regs.pc = 0x0066;
        self.regs.wz = 0x0066;
        self.cycles += 11;
    }

    /// Fetch prefix bytes and the opcode. Returns the page, the opcode and
    /// how many DD/FD prefixes were overridden by a later prefix.
    fn fetch_instruction<B: Bus>(&mut self, bus: &mut B) -> (Prefix, u8, u32) {
        let mut prefix = Prefix::None;
        let mut superseded = 0;
        let mut opcode = self.fetch_opcode(bus);
        loop {
            match opcode {
                0xDD | 0xFD => {
                    if prefix != Prefix::None {
                        superseded += 1;
                    }
                    prefix = if opcode == 0xDD { Prefix::Dd } else { Prefix::Fd };
                    opcode = self.fetch_opcode(bus);
                }
                0xED => {
                    if prefix != Prefix::None {
                        superseded += 1;
                    }
                    return (Prefix::Ed, self.fetch_opcode(bus), superseded);
                }
                0xCB if prefix == Prefix::None => {
                    return (Prefix::Cb, self.fetch_opcode(bus), superseded);
                }
                0xCB => {
                    // DD CB d op: the displacement comes first and neither
                    // byte is an M1 cycle.
                    self.displacement = Some(self.fetch_byte(bus) as i8);
                    let page = if prefix == Prefix::Dd {
                        Prefix::DdCb
                    } else {
                        Prefix::FdCb
                    };
                    return (page, self.fetch_byte(bus), superseded);
                }
                _ => return (prefix, opcode, superseded),
            }
        }
    }

    /// M1 fetch: bumps R.
    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.regs.increment_r();
        self.fetch_byte(bus)
    }

    fn fetch_byte<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        read_pair(hi, lo)
    }

    fn push<B: Bus>(&mut self, bus: &mut B, value: u16) {
        let (hi, lo) = write_pair(value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, lo);
    }

    fn pop<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let value = read_word(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    fn condition(&self, cond: Option<Condition>) -> bool {
        cond.is_none_or(|c| c.holds(self.regs.f))
    }

    fn reg8(&self, reg: Reg8) -> u8 {
        let r = &self.regs;
        match reg {
            Reg8::A => r.a,
            Reg8::B => r.b,
            Reg8::C => r.c,
            Reg8::D => r.d,
            Reg8::E => r.e,
            Reg8::H => r.h,
            Reg8::L => r.l,
            Reg8::IxH => (r.ix >> 8) as u8,
            Reg8::IxL => r.ix as u8,
            Reg8::IyH => (r.iy >> 8) as u8,
            Reg8::IyL => r.iy as u8,
        }
    }

    fn set_reg8(&mut self, reg: Reg8, value: u8) {
        let r = &mut self.regs;
        match reg {
            Reg8::A => r.a = value,
            Reg8::B => r.b = value,
            Reg8::C => r.c = value,
            Reg8::D => r.d = value,
            Reg8::E => r.e = value,
            Reg8::H => r.h = value,
            Reg8::L => r.l = value,
            Reg8::IxH => r.ix = (r.ix & 0x00FF) | (u16::from(value) << 8),
            Reg8::IxL => r.ix = (r.ix & 0xFF00) | u16::from(value),
            Reg8::IyH => r.iy = (r.iy & 0x00FF) | (u16::from(value) << 8),
            Reg8::IyL => r.iy = (r.iy & 0xFF00) | u16::from(value),
        }
    }

    fn reg16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::Af => self.regs.af(),
            Reg16::Bc => self.regs.bc(),
            Reg16::De => self.regs.de(),
            Reg16::Hl => self.regs.hl(),
            Reg16::Sp => self.regs.sp,
            Reg16::Ix => self.regs.ix,
            Reg16::Iy => self.regs.iy,
        }
    }

    fn set_reg16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::Af => self.regs.set_af(value),
            Reg16::Bc => self.regs.set_bc(value),
            Reg16::De => self.regs.set_de(value),
            Reg16::Hl => self.regs.set_hl(value),
            Reg16::Sp => self.regs.sp = value,
            Reg16::Ix => self.regs.ix = value,
            Reg16::Iy => self.regs.iy = value,
        }
    }

    /// Effective address of a memory operand. Indexed forms fetch their
    /// displacement here unless the DDCB path already did.
    fn address_of<B: Bus>(&mut self, bus: &mut B, mem: MemRef) -> u16 {
        match mem {
            MemRef::Hl => self.regs.hl(),
            MemRef::Indexed(index) => {
                let d = match self.displacement {
                    Some(d) => d,
                    None => self.fetch_byte(bus) as i8,
                };
                let base = match index {
                    Index::Ix => self.regs.ix,
                    Index::Iy => self.regs.iy,
                };
                let addr = base.wrapping_add_signed(i16::from(d));
                self.regs.wz = addr;
                addr
            }
        }
    }

    fn resolve<B: Bus>(&mut self, bus: &mut B, operand: Operand) -> Target {
        match operand {
            Operand::Reg(reg) => Target::Reg(reg),
            Operand::Mem(mem) => Target::Addr(self.address_of(bus, mem)),
            Operand::Imm => Target::Value(self.fetch_byte(bus)),
        }
    }

    fn load<B: Bus>(&mut self, bus: &mut B, target: Target) -> u8 {
        match target {
            Target::Reg(reg) => self.reg8(reg),
            Target::Addr(addr) => bus.read(addr),
            Target::Value(value) => value,
        }
    }

    fn store<B: Bus>(&mut self, bus: &mut B, target: Target, value: u8) {
        match target {
            Target::Reg(reg) => self.set_reg8(reg, value),
            Target::Addr(addr) => bus.write(addr, value),
            Target::Value(_) => {}
        }
    }
}

/// Little-endian word; the high byte's address wraps on its own.
fn read_word<B: Bus>(bus: &mut B, addr: u16) -> u16 {
    let lo = bus.read(addr);
    let hi = bus.read(addr.wrapping_add(1));
    read_pair(hi, lo)
}

fn write_word<B: Bus>(bus: &mut B, addr: u16, value: u16) {
    let (hi, lo) = write_pair(value);
    bus.write(addr, lo);
    bus.write(addr.wrapping_add(1), hi);
}

impl<B: Bus> Cpu<B> for Z80 {
    type Error = DecodeError;

    fn step(&mut self, bus: &mut B) -> Result<Step, DecodeError> {
        Z80::step(self, bus)
    }

    fn reset(&mut self) {
        Z80::reset(self);
    }

    fn interrupt(&mut self, bus: &mut B) -> bool {
        Z80::interrupt(self, bus)
    }

    fn nmi(&mut self, bus: &mut B) {
        Z80::nmi(self, bus);
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }
}

const QUERY_PATHS: &[&str] = &[
    "pc", "sp", "af", "bc", "de", "hl", "ix", "iy", "a", "f", "b", "c", "d", "e", "h", "l",
    "i", "r", "wz", "iff1", "iff2", "im", "halted", "cycles", "flags.s", "flags.z", "flags.h",
    "flags.pv", "flags.n", "flags.c",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let r = &self.regs;
        let value = match path {
            "pc" => r.pc.into(),
            "sp" => r.sp.into(),
            "af" => r.af().into(),
            "bc" => r.bc().into(),
            "de" => r.de().into(),
            "hl" => r.hl().into(),
            "ix" => r.ix.into(),
            "iy" => r.iy.into(),
            "a" => r.a.into(),
            "f" => r.f.into(),
            "b" => r.b.into(),
            "c" => r.c.into(),
            "d" => r.d.into(),
            "e" => r.e.into(),
            "h" => r.h.into(),
            "l" => r.l.into(),
            "i" => r.i.into(),
            "r" => r.r.into(),
            "wz" => r.wz.into(),
            "iff1" => r.iff1.into(),
            "iff2" => r.iff2.into(),
            "im" => r.im.number().into(),
            "halted" => r.halted.into(),
            "cycles" => self.cycles.get().into(),
            "flags.s" => (r.f & SF != 0).into(),
            "flags.z" => (r.f & ZF != 0).into(),
            "flags.h" => (r.f & HF != 0).into(),
            "flags.pv" => (r.f & PF != 0).into(),
            "flags.n" => (r.f & NF != 0).into(),
            "flags.c" => (r.f & CF != 0).into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
