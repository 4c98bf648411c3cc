//! Zilog Z80 CPU, stepped one instruction at a time.
//!
//! Opcodes are decoded through a table built once at first use (see
//! [`decode`]); each entry names an operation and its base T-state cost.
//! Flags follow the Z80 tables including the undocumented X/Y bits.

pub mod alu;
mod cpu;
pub mod decode;
mod flags;
mod registers;

pub use cpu::{DecodeError, RESET_SP, Z80};
pub use decode::Prefix;
pub use flags::{CF, Flag, HF, NF, PF, SF, XF, YF, ZF, parity, sz53, sz53p};
pub use registers::{InterruptMode, RegPair, Registers, read_pair, write_pair};
