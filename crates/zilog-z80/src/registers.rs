//! Z80 register file.

use crate::flags::Flag;

/// Join a high and low byte into a 16-bit value.
#[must_use]
pub const fn read_pair(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

/// Split a 16-bit value into `(hi, lo)`.
#[must_use]
pub const fn write_pair(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, value as u8)
}

/// The four main register pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegPair {
    Af,
    Bc,
    De,
    Hl,
}

/// Interrupt mode selected by IM 0/1/2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterruptMode {
    #[default]
    Mode0,
    Mode1,
    Mode2,
}

impl InterruptMode {
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            InterruptMode::Mode0 => 0,
            InterruptMode::Mode1 => 1,
            InterruptMode::Mode2 => 2,
        }
    }
}

/// Complete programmer-visible Z80 state plus WZ.
///
/// Pairs (AF, BC, DE, HL) are views over the 8-bit fields; there is no
/// separate 16-bit storage for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,

    /// WZ/MEMPTR. Leaks into X/Y after BIT n,(HL).
    pub wz: u16,

    pub iff1: bool,
    pub iff2: bool,
    pub im: InterruptMode,
    pub halted: bool,
}

impl Registers {
    #[must_use]
    pub const fn af(&self) -> u16 {
        read_pair(self.a, self.f)
    }

    #[must_use]
    pub const fn bc(&self) -> u16 {
        read_pair(self.b, self.c)
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        read_pair(self.d, self.e)
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        read_pair(self.h, self.l)
    }

    pub fn set_af(&mut self, value: u16) {
        (self.a, self.f) = write_pair(value);
    }

    pub fn set_bc(&mut self, value: u16) {
        (self.b, self.c) = write_pair(value);
    }

    pub fn set_de(&mut self, value: u16) {
        (self.d, self.e) = write_pair(value);
    }

    pub fn set_hl(&mut self, value: u16) {
        (self.h, self.l) = write_pair(value);
    }

    #[must_use]
    pub const fn pair(&self, pair: RegPair) -> u16 {
        match pair {
            RegPair::Af => self.af(),
            RegPair::Bc => self.bc(),
            RegPair::De => self.de(),
            RegPair::Hl => self.hl(),
        }
    }

    pub fn set_pair(&mut self, pair: RegPair, value: u16) {
        match pair {
            RegPair::Af => self.set_af(value),
            RegPair::Bc => self.set_bc(value),
            RegPair::De => self.set_de(value),
            RegPair::Hl => self.set_hl(value),
        }
    }

    #[must_use]
    pub const fn flag(&self, flag: Flag) -> bool {
        self.f & flag.mask() != 0
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        if on {
            self.f |= flag.mask();
        } else {
            self.f &= !flag.mask();
        }
    }

    /// EX AF,AF'
    pub fn exchange_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_alt);
        std::mem::swap(&mut self.f, &mut self.f_alt);
    }

    /// EXX
    pub fn exchange_main(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_alt);
        std::mem::swap(&mut self.c, &mut self.c_alt);
        std::mem::swap(&mut self.d, &mut self.d_alt);
        std::mem::swap(&mut self.e, &mut self.e_alt);
        std::mem::swap(&mut self.h, &mut self.h_alt);
        std::mem::swap(&mut self.l, &mut self.l_alt);
    }

    /// Bump the refresh counter. Bit 7 is left alone.
    pub fn increment_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }
}
