//! CP/M 2.2 machine.
//!
//! A Z80 with 64K of RAM, a console, a printer, a paper tape reader and
//! punch, and four floppy drives behind a port-mapped controller. The
//! machine runs in slices of a fixed instruction count; a slice ends early
//! when the CPU halts, hits an undecodable opcode, or spins on an empty
//! console.

pub mod bus;
pub mod config;
pub mod console;
pub mod machine;
pub mod tape;

pub use bus::CpmBus;
pub use config::{ConfigError, CpmConfig, DecodePolicy};
pub use console::{BufferedConsole, BufferedPrinter, Console, Printer};
pub use machine::{CpmMachine, MachineError, SliceExit};
pub use tape::{PaperTape, TapePunch};
