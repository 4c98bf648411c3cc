//! CPU trait.

use crate::Bus;

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An instruction ran and consumed this many T-states.
    Executed { cycles: u32 },
    /// The CPU is halted. It burns T-states but the PC does not move.
    Halted,
}

/// An instruction-stepped CPU.
///
/// The driving loop owns the timeslice: it calls [`Cpu::step`] until it has
/// run enough instructions, the CPU halts, or the step fails.
pub trait Cpu<B: Bus> {
    /// Raised when the CPU fetches something it cannot execute.
    type Error;

    /// Execute exactly one instruction.
    fn step(&mut self, bus: &mut B) -> Result<Step, Self::Error>;

    /// Reset to power-on state. The cycle counter survives.
    fn reset(&mut self);

    /// Request a maskable interrupt. Nothing drives the data bus during
    /// acknowledge, so it reads 0xFF.
    ///
    /// Returns `true` if the CPU accepted it.
    fn interrupt(&mut self, bus: &mut B) -> bool;

    /// Non-maskable interrupt.
    fn nmi(&mut self, bus: &mut B);

    /// Current program counter.
    fn pc(&self) -> u16;

    fn is_halted(&self) -> bool;
}
