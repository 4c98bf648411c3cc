//! LDI/CPI/INI/OUTI and their decrementing and repeating forms.
//!
//! Each step runs one iteration. A repeating form that still has work left
//! rewinds PC onto its own ED byte so the next step runs it again.

use emu_core::Bus;

use super::Z80;
use crate::decode::{Block, BlockKind};
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53};

/// Extra T-states when a repeating block instruction goes round again.
const REPEAT: u32 = 5;

impl Z80 {
    pub(super) fn block<B: Bus>(&mut self, bus: &mut B, block: Block, base: u32) -> u32 {
        let more = match block.kind {
            BlockKind::Load => self.block_load(bus, block.decrement),
            BlockKind::Compare => self.block_compare(bus, block.decrement),
            BlockKind::In => self.block_in(bus, block.decrement),
            BlockKind::Out => self.block_out(bus, block.decrement),
        };
        if !(block.repeat && more) {
            return base;
        }
        self.regs.pc = self.regs.pc.wrapping_sub(2);
        self.regs.wz = self.regs.pc.wrapping_add(1);
        let pch = (self.regs.pc >> 8) as u8;
        self.regs.f = (self.regs.f & !(YF | XF)) | (pch & (YF | XF));
        base + REPEAT
    }

    fn advance_hl(&mut self, decrement: bool) {
        let hl = self.regs.hl();
        self.regs.set_hl(step(hl, decrement));
    }

    /// LDI/LDD. Returns true while BC is nonzero.
    fn block_load<B: Bus>(&mut self, bus: &mut B, decrement: bool) -> bool {
        let value = bus.read(self.regs.hl());
        let de = self.regs.de();
        bus.write(de, value);
        self.regs.set_de(step(de, decrement));
        self.advance_hl(decrement);
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        let n = value.wrapping_add(self.regs.a);
        let mut flags = (self.regs.f & (SF | ZF | CF)) | (n & XF) | ((n << 4) & YF);
        if bc != 0 {
            flags |= PF;
        }
        self.regs.f = flags;
        bc != 0
    }

    /// CPI/CPD. Returns true while BC is nonzero and A has not matched.
    fn block_compare<B: Bus>(&mut self, bus: &mut B, decrement: bool) -> bool {
        let value = bus.read(self.regs.hl());
        let a = self.regs.a;
        let result = a.wrapping_sub(value);
        let half = (a & 0x0F) < (value & 0x0F);
        self.advance_hl(decrement);
        self.regs.wz = step(self.regs.wz, decrement);
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        let n = result.wrapping_sub(u8::from(half));
        let mut flags = (self.regs.f & CF) | NF | (result & SF) | (n & XF) | ((n << 4) & YF);
        if result == 0 {
            flags |= ZF;
        }
        if half {
            flags |= HF;
        }
        if bc != 0 {
            flags |= PF;
        }
        self.regs.f = flags;
        bc != 0 && result != 0
    }

    /// INI/IND. Returns true while B is nonzero.
    fn block_in<B: Bus>(&mut self, bus: &mut B, decrement: bool) -> bool {
        let port = self.regs.bc();
        let value = bus.io_read(port);
        self.regs.wz = step(port, decrement);
        bus.write(self.regs.hl(), value);
        self.advance_hl(decrement);
        self.regs.b = self.regs.b.wrapping_sub(1);

        let c = if decrement {
            self.regs.c.wrapping_sub(1)
        } else {
            self.regs.c.wrapping_add(1)
        };
        self.regs.f = io_flags(self.regs.b, value, u16::from(value) + u16::from(c));
        self.regs.b != 0
    }

    /// OUTI/OUTD. B is decremented before the port is driven.
    fn block_out<B: Bus>(&mut self, bus: &mut B, decrement: bool) -> bool {
        let value = bus.read(self.regs.hl());
        self.regs.b = self.regs.b.wrapping_sub(1);
        let port = self.regs.bc();
        bus.io_write(port, value);
        self.regs.wz = step(port, decrement);
        self.advance_hl(decrement);

        self.regs.f = io_flags(self.regs.b, value, u16::from(value) + u16::from(self.regs.l));
        self.regs.b != 0
    }
}

const fn step(value: u16, decrement: bool) -> u16 {
    if decrement {
        value.wrapping_sub(1)
    } else {
        value.wrapping_add(1)
    }
}

/// Flags shared by the block I/O group. `k` is the transferred byte plus
/// the adjusted C (input) or the new L (output).
fn io_flags(b: u8, value: u8, k: u16) -> u8 {
    let mut flags = sz53(b);
    if value & 0x80 != 0 {
        flags |= NF;
    }
    if k > 0xFF {
        flags |= HF | CF;
    }
    if parity(((k as u8) & 7) ^ b) {
        flags |= PF;
    }
    flags
}
