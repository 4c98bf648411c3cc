//! Core traits and types shared by the CPU, the disk controller and the
//! machine that wires them together.
//!
//! The CPU never owns memory. Everything it touches goes through [`Bus`],
//! and everything a debugger wants to see comes out through [`Observable`].

mod bus;
mod cpu;
mod observable;
mod ticks;

pub use bus::{Bus, SimpleBus};
pub use cpu::{Cpu, Step};
pub use observable::{Observable, Value};
pub use ticks::Ticks;
