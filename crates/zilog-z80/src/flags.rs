//! Z80 flag register bits.

/// Sign flag (bit 7) - copy of bit 7 of the result.
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6).
pub const ZF: u8 = 0b0100_0000;

/// Undocumented flag (bit 5), usually bit 5 of the result.
pub const YF: u8 = 0b0010_0000;

/// Half-carry flag (bit 4) - carry or borrow between bits 3 and 4.
pub const HF: u8 = 0b0001_0000;

/// Undocumented flag (bit 3), usually bit 3 of the result.
pub const XF: u8 = 0b0000_1000;

/// Parity/Overflow flag (bit 2).
pub const PF: u8 = 0b0000_0100;

/// Add/Subtract flag (bit 1) - set after a subtraction.
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0).
pub const CF: u8 = 0b0000_0001;

/// A named bit of the F register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Sign,
    Zero,
    Y,
    HalfCarry,
    X,
    ParityOverflow,
    Subtract,
    Carry,
}

impl Flag {
    /// Bit mask of this flag within F.
    #[must_use]
    pub const fn mask(self) -> u8 {
        match self {
            Flag::Sign => SF,
            Flag::Zero => ZF,
            Flag::Y => YF,
            Flag::HalfCarry => HF,
            Flag::X => XF,
            Flag::ParityOverflow => PF,
            Flag::Subtract => NF,
            Flag::Carry => CF,
        }
    }
}

/// True if `value` has an even number of set bits.
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

/// S, Z and the undocumented X/Y bits for a result byte.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    let mut f = value & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// [`sz53`] plus even parity in P/V.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    if parity(value) {
        sz53(value) | PF
    } else {
        sz53(value)
    }
}
