//! Opcode decode table.
//!
//! Every (prefix, opcode) pair maps to at most one [`Instr`]: a tagged
//! [`Op`] plus its base T-state cost. The table is generated once from the
//! regular x/y/z/p/q fields of the opcode, so each slot is written exactly
//! once and there are no duplicate keys to resolve at run time.
//!
//! DD and FD pages are generated from the unprefixed page: H, L and (HL)
//! become IXH, IXL and (IX+d) (or the IY forms). Opcodes that touch none of
//! those execute unchanged and cost 4 extra T-states for the prefix fetch.

use std::sync::LazyLock;

use crate::alu::{AluOp, ShiftOp};
use crate::flags::{CF, PF, SF, ZF};
use crate::registers::InterruptMode;

/// Which opcode page an instruction lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    None,
    Cb,
    Ed,
    Dd,
    Fd,
    /// DD CB d op
    DdCb,
    /// FD CB d op
    FdCb,
}

impl Prefix {
    pub const ALL: [Prefix; 7] = [
        Prefix::None,
        Prefix::Cb,
        Prefix::Ed,
        Prefix::Dd,
        Prefix::Fd,
        Prefix::DdCb,
        Prefix::FdCb,
    ];

    /// The prefix bytes as they appear in memory (displacement omitted).
    #[must_use]
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Prefix::None => &[],
            Prefix::Cb => &[0xCB],
            Prefix::Ed => &[0xED],
            Prefix::Dd => &[0xDD],
            Prefix::Fd => &[0xFD],
            Prefix::DdCb => &[0xDD, 0xCB],
            Prefix::FdCb => &[0xFD, 0xCB],
        }
    }

    const fn slot(self) -> usize {
        match self {
            Prefix::None => 0,
            Prefix::Cb => 1,
            Prefix::Ed => 2,
            Prefix::Dd => 3,
            Prefix::Fd => 4,
            Prefix::DdCb => 5,
            Prefix::FdCb => 6,
        }
    }
}

/// IX or IY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    Ix,
    Iy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
    IxH,
    IxL,
    IyH,
    IyL,
}

impl Reg8 {
    /// Register for a 3-bit operand field, 6 excluded.
    const fn from_code(code: u8) -> Self {
        match code & 7 {
            0 => Reg8::B,
            1 => Reg8::C,
            2 => Reg8::D,
            3 => Reg8::E,
            4 => Reg8::H,
            5 => Reg8::L,
            _ => Reg8::A,
        }
    }
}

/// Memory operand addressed by HL or an index register plus displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemRef {
    Hl,
    Indexed(Index),
}

/// An 8-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg8),
    Mem(MemRef),
    /// Byte following the opcode (after any displacement).
    Imm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    Bc,
    De,
    Hl,
    Sp,
    Af,
    Ix,
    Iy,
}

/// Address source for LD A,(..) and LD (..),A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ptr {
    Bc,
    De,
    /// 16-bit absolute address following the opcode.
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
}

impl Condition {
    const ALL: [Condition; 8] = [
        Condition::Nz,
        Condition::Z,
        Condition::Nc,
        Condition::C,
        Condition::Po,
        Condition::Pe,
        Condition::P,
        Condition::M,
    ];

    /// Evaluate against the F register.
    #[must_use]
    pub const fn holds(self, f: u8) -> bool {
        match self {
            Condition::Nz => f & ZF == 0,
            Condition::Z => f & ZF != 0,
            Condition::Nc => f & CF == 0,
            Condition::C => f & CF != 0,
            Condition::Po => f & PF == 0,
            Condition::Pe => f & PF != 0,
            Condition::P => f & SF == 0,
            Condition::M => f & SF != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Load,
    Compare,
    In,
    Out,
}

/// One of the sixteen ED block transfer/search/I/O instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// HL (and DE) count down instead of up.
    pub decrement: bool,
    pub repeat: bool,
}

/// Decoded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Halt,
    Ld { dst: Operand, src: Operand },
    /// LD A,(BC) / LD A,(DE) / LD A,(nn)
    LoadA(Ptr),
    /// LD (BC),A / LD (DE),A / LD (nn),A
    StoreA(Ptr),
    /// LD rr,nn
    LdImm16(Reg16),
    /// LD rr,(nn)
    LoadWord(Reg16),
    /// LD (nn),rr
    StoreWord(Reg16),
    /// LD SP,HL / LD SP,IX / LD SP,IY
    LdSp(Reg16),
    LdIA,
    LdRA,
    LdAI,
    LdAR,
    Push(Reg16),
    Pop(Reg16),
    ExDeHl,
    ExAf,
    Exx,
    /// EX (SP),HL / EX (SP),IX / EX (SP),IY
    ExSp(Reg16),
    Alu { op: AluOp, src: Operand },
    Inc(Operand),
    Dec(Operand),
    Inc16(Reg16),
    Dec16(Reg16),
    Add16 { dst: Reg16, src: Reg16 },
    Adc16(Reg16),
    Sbc16(Reg16),
    /// RLCA / RRCA / RLA / RRA
    RotateA(ShiftOp),
    Daa,
    Cpl,
    Scf,
    Ccf,
    Neg,
    Rld,
    Rrd,
    Jp(Option<Condition>),
    /// JP (HL) / JP (IX) / JP (IY)
    JpInd(Reg16),
    Jr(Option<Condition>),
    Djnz,
    Call(Option<Condition>),
    Ret(Option<Condition>),
    Reti,
    Retn,
    Rst(u8),
    Di,
    Ei,
    Im(InterruptMode),
    /// IN A,(n)
    InImm,
    /// OUT (n),A
    OutImm,
    /// IN r,(C). `None` is the flags-only form ED 70.
    InC(Option<Reg8>),
    /// OUT (C),r. `None` is the undocumented OUT (C),0.
    OutC(Option<Reg8>),
    Block(Block),
    /// Rotate/shift. `copy` is the undocumented register that also
    /// receives the result in DDCB/FDCB forms.
    Shift { op: ShiftOp, target: Operand, copy: Option<Reg8> },
    Bit { bit: u8, target: Operand },
    Res { bit: u8, target: Operand, copy: Option<Reg8> },
    Set { bit: u8, target: Operand, copy: Option<Reg8> },
}

/// A decode-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub op: Op,
    /// Base T-states. Taken branches and repeating block instructions add
    /// their surcharge at execution.
    pub cycles: u8,
}

/// The full (prefix, opcode) -> [`Instr`] map.
pub struct DecodeTable {
    entries: Vec<Option<Instr>>,
}

static TABLE: LazyLock<DecodeTable> = LazyLock::new(DecodeTable::build);

/// Look up an instruction in the shared table.
#[must_use]
pub fn lookup(prefix: Prefix, opcode: u8) -> Option<Instr> {
    TABLE.get(prefix, opcode)
}

impl DecodeTable {
    fn build() -> Self {
        let mut entries = vec![None; Prefix::ALL.len() * 256];
        for prefix in Prefix::ALL {
            for opcode in 0..=255u8 {
                let entry = match prefix {
                    Prefix::None => main_page(opcode, None),
                    Prefix::Dd => main_page(opcode, Some(Index::Ix)),
                    Prefix::Fd => main_page(opcode, Some(Index::Iy)),
                    Prefix::Cb => Some(cb_page(opcode, None)),
                    Prefix::DdCb => Some(cb_page(opcode, Some(Index::Ix))),
                    Prefix::FdCb => Some(cb_page(opcode, Some(Index::Iy))),
                    Prefix::Ed => ed_page(opcode),
                };
                entries[prefix.slot() * 256 + usize::from(opcode)] = entry;
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, prefix: Prefix, opcode: u8) -> Option<Instr> {
        self.entries[prefix.slot() * 256 + usize::from(opcode)]
    }

    /// Number of defined slots on a page.
    #[must_use]
    pub fn defined(&self, prefix: Prefix) -> usize {
        let start = prefix.slot() * 256;
        self.entries[start..start + 256]
            .iter()
            .filter(|e| e.is_some())
            .count()
    }
}

/// Number of defined slots on a page of the shared table.
#[must_use]
pub fn defined(prefix: Prefix) -> usize {
    TABLE.defined(prefix)
}

/// Tracks whether an index prefix actually changed an operand.
struct Subst {
    index: Option<Index>,
    used: bool,
}

impl Subst {
    fn new(index: Option<Index>) -> Self {
        Self { index, used: false }
    }

    /// Operand for a 3-bit field with H/L/(HL) replaced under a prefix.
    fn reg(&mut self, code: u8) -> Operand {
        let code = code & 7;
        match (self.index, code) {
            (_, 6) => self.mem(),
            (Some(Index::Ix), 4) => self.hit(Operand::Reg(Reg8::IxH)),
            (Some(Index::Ix), 5) => self.hit(Operand::Reg(Reg8::IxL)),
            (Some(Index::Iy), 4) => self.hit(Operand::Reg(Reg8::IyH)),
            (Some(Index::Iy), 5) => self.hit(Operand::Reg(Reg8::IyL)),
            _ => Operand::Reg(Reg8::from_code(code)),
        }
    }

    /// Operand for a 3-bit field where only (HL) is replaced. Used when the
    /// other operand is memory: LD H,(IX+d) loads the real H.
    fn plain(&mut self, code: u8) -> Operand {
        if code & 7 == 6 {
            self.mem()
        } else {
            Operand::Reg(Reg8::from_code(code))
        }
    }

    fn mem(&mut self) -> Operand {
        match self.index {
            Some(i) => self.hit(Operand::Mem(MemRef::Indexed(i))),
            None => Operand::Mem(MemRef::Hl),
        }
    }

    fn hl(&mut self) -> Reg16 {
        match self.index {
            Some(Index::Ix) => self.hit(Reg16::Ix),
            Some(Index::Iy) => self.hit(Reg16::Iy),
            None => Reg16::Hl,
        }
    }

    /// rp table: BC DE HL SP.
    fn pair(&mut self, p: u8) -> Reg16 {
        match p & 3 {
            0 => Reg16::Bc,
            1 => Reg16::De,
            2 => self.hl(),
            _ => Reg16::Sp,
        }
    }

    /// rp2 table: BC DE HL AF.
    fn pair2(&mut self, p: u8) -> Reg16 {
        match p & 3 {
            3 => Reg16::Af,
            other => self.pair(other),
        }
    }

    fn hit<T>(&mut self, value: T) -> T {
        self.used = true;
        value
    }
}

/// T-states for an 8-bit operand form: plain register, (HL), index half,
/// (IX+d).
const fn operand_cost(operand: Operand, reg: u8, hl: u8, half: u8, indexed: u8) -> u8 {
    match operand {
        Operand::Reg(Reg8::IxH | Reg8::IxL | Reg8::IyH | Reg8::IyL) => half,
        Operand::Reg(_) | Operand::Imm => reg,
        Operand::Mem(MemRef::Hl) => hl,
        Operand::Mem(MemRef::Indexed(_)) => indexed,
    }
}

/// Unprefixed page, or the DD/FD page when `index` is set.
fn main_page(opcode: u8, index: Option<Index>) -> Option<Instr> {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;
    let mut s = Subst::new(index);

    // (op, cost when no operand was substituted, cost when one was)
    let (op, plain, substituted): (Op, u8, u8) = match (x, z) {
        (0, 0) => match y {
            0 => (Op::Nop, 4, 4),
            1 => (Op::ExAf, 4, 4),
            2 => (Op::Djnz, 8, 8),
            3 => (Op::Jr(None), 12, 12),
            _ => (Op::Jr(Some(Condition::ALL[usize::from(y - 4)])), 7, 7),
        },
        (0, 1) if q == 0 => (Op::LdImm16(s.pair(p)), 10, 14),
        (0, 1) => {
            let dst = s.hl();
            let src = s.pair(p);
            (Op::Add16 { dst, src }, 11, 15)
        }
        (0, 2) => match (q, p) {
            (0, 0) => (Op::StoreA(Ptr::Bc), 7, 7),
            (0, 1) => (Op::StoreA(Ptr::De), 7, 7),
            (0, 2) => (Op::StoreWord(s.hl()), 16, 20),
            (0, _) => (Op::StoreA(Ptr::Abs), 13, 13),
            (_, 0) => (Op::LoadA(Ptr::Bc), 7, 7),
            (_, 1) => (Op::LoadA(Ptr::De), 7, 7),
            (_, 2) => (Op::LoadWord(s.hl()), 16, 20),
            _ => (Op::LoadA(Ptr::Abs), 13, 13),
        },
        (0, 3) if q == 0 => (Op::Inc16(s.pair(p)), 6, 10),
        (0, 3) => (Op::Dec16(s.pair(p)), 6, 10),
        (0, 4 | 5) => {
            let target = s.reg(y);
            let cost = operand_cost(target, 4, 11, 8, 23);
            let op = if z == 4 { Op::Inc(target) } else { Op::Dec(target) };
            (op, cost, cost)
        }
        (0, 6) => {
            let dst = s.reg(y);
            let cost = operand_cost(dst, 7, 10, 11, 19);
            (Op::Ld { dst, src: Operand::Imm }, cost, cost)
        }
        (0, _) => {
            let op = match y {
                0 => Op::RotateA(ShiftOp::Rlc),
                1 => Op::RotateA(ShiftOp::Rrc),
                2 => Op::RotateA(ShiftOp::Rl),
                3 => Op::RotateA(ShiftOp::Rr),
                4 => Op::Daa,
                5 => Op::Cpl,
                6 => Op::Scf,
                _ => Op::Ccf,
            };
            (op, 4, 4)
        }
        (1, _) if y == 6 && z == 6 => (Op::Halt, 4, 4),
        (1, _) => {
            let (dst, src) = if y == 6 || z == 6 {
                (s.plain(y), s.plain(z))
            } else {
                (s.reg(y), s.reg(z))
            };
            let cost = operand_cost(dst, 4, 7, 8, 19).max(operand_cost(src, 4, 7, 8, 19));
            (Op::Ld { dst, src }, cost, cost)
        }
        (2, _) => {
            let src = s.reg(z);
            let cost = operand_cost(src, 4, 7, 8, 19);
            (Op::Alu { op: AluOp::ALL[usize::from(y)], src }, cost, cost)
        }
        (_, 0) => (Op::Ret(Some(Condition::ALL[usize::from(y)])), 5, 5),
        (_, 1) if q == 0 => (Op::Pop(s.pair2(p)), 10, 14),
        (_, 1) => match p {
            0 => (Op::Ret(None), 10, 10),
            1 => (Op::Exx, 4, 4),
            2 => (Op::JpInd(s.hl()), 4, 8),
            _ => (Op::LdSp(s.hl()), 6, 10),
        },
        (_, 2) => (Op::Jp(Some(Condition::ALL[usize::from(y)])), 10, 10),
        (_, 3) => match y {
            0 => (Op::Jp(None), 10, 10),
            1 => return None,
            2 => (Op::OutImm, 11, 11),
            3 => (Op::InImm, 11, 11),
            4 => (Op::ExSp(s.hl()), 19, 23),
            5 => (Op::ExDeHl, 4, 4),
            6 => (Op::Di, 4, 4),
            _ => (Op::Ei, 4, 4),
        },
        (_, 4) => (Op::Call(Some(Condition::ALL[usize::from(y)])), 10, 10),
        (_, 5) if q == 0 => (Op::Push(s.pair2(p)), 11, 15),
        (_, 5) if p == 0 => (Op::Call(None), 17, 17),
        (_, 5) => return None,
        (_, 6) => (
            Op::Alu {
                op: AluOp::ALL[usize::from(y)],
                src: Operand::Imm,
            },
            7,
            7,
        ),
        _ => (Op::Rst(y * 8), 11, 11),
    };

    let cycles = match (index, s.used) {
        (None, _) => plain,
        (Some(_), true) => substituted,
        (Some(_), false) => plain + 4,
    };
    Some(Instr { op, cycles })
}

/// CB page, or the DDCB/FDCB page when `index` is set.
fn cb_page(opcode: u8, index: Option<Index>) -> Instr {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;

    let (target, copy) = match index {
        None if z == 6 => (Operand::Mem(MemRef::Hl), None),
        None => (Operand::Reg(Reg8::from_code(z)), None),
        Some(i) if z == 6 => (Operand::Mem(MemRef::Indexed(i)), None),
        Some(i) => (Operand::Mem(MemRef::Indexed(i)), Some(Reg8::from_code(z))),
    };

    let (op, reg, hl, indexed) = match x {
        0 => (
            Op::Shift {
                op: ShiftOp::ALL[usize::from(y)],
                target,
                copy,
            },
            8,
            15,
            23,
        ),
        1 => (Op::Bit { bit: y, target }, 8, 12, 20),
        2 => (Op::Res { bit: y, target, copy }, 8, 15, 23),
        _ => (Op::Set { bit: y, target, copy }, 8, 15, 23),
    };
    let cycles = operand_cost(target, reg, hl, reg, indexed);
    Instr { op, cycles }
}

/// ED page. Slots outside the documented set have no entry.
fn ed_page(opcode: u8) -> Option<Instr> {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;
    let mut s = Subst::new(None);
    let reg = (y != 6).then_some(Reg8::from_code(y));

    let (op, cycles) = match (x, z) {
        (1, 0) => (Op::InC(reg), 12),
        (1, 1) => (Op::OutC(reg), 12),
        (1, 2) if q == 0 => (Op::Sbc16(s.pair(p)), 15),
        (1, 2) => (Op::Adc16(s.pair(p)), 15),
        (1, 3) if q == 0 => (Op::StoreWord(s.pair(p)), 20),
        (1, 3) => (Op::LoadWord(s.pair(p)), 20),
        (1, 4) => (Op::Neg, 8),
        (1, 5) if y == 1 => (Op::Reti, 14),
        (1, 5) => (Op::Retn, 14),
        (1, 6) => {
            let mode = match y & 3 {
                0 | 1 => InterruptMode::Mode0,
                2 => InterruptMode::Mode1,
                _ => InterruptMode::Mode2,
            };
            (Op::Im(mode), 8)
        }
        (1, _) => match y {
            0 => (Op::LdIA, 9),
            1 => (Op::LdRA, 9),
            2 => (Op::LdAI, 9),
            3 => (Op::LdAR, 9),
            4 => (Op::Rrd, 18),
            5 => (Op::Rld, 18),
            _ => return None,
        },
        (2, 0..=3) if y >= 4 => {
            let kind = match z {
                0 => BlockKind::Load,
                1 => BlockKind::Compare,
                2 => BlockKind::In,
                _ => BlockKind::Out,
            };
            let block = Block {
                kind,
                decrement: y & 1 != 0,
                repeat: y >= 6,
            };
            (Op::Block(block), 16)
        }
        _ => return None,
    };
    Some(Instr { op, cycles })
}
