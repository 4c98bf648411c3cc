//! T-state accounting.

use std::fmt;

/// A running count of CPU T-states.
///
/// Instructions report their cost as a `u32`; the session total is kept
/// here so it can be added to without thinking about overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Self {
        Self(self.0.saturating_sub(earlier.0))
    }
}

impl core::ops::AddAssign<u32> for Ticks {
    fn add_assign(&mut self, rhs: u32) {
        self.0 = self.0.wrapping_add(u64::from(rhs));
    }
}

impl core::ops::Add<u32> for Ticks {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0.wrapping_add(u64::from(rhs)))
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_instruction_costs() {
        let mut t = Ticks::ZERO;
        t += 4;
        t += 17;
        assert_eq!(t.get(), 21);
        assert_eq!((t + 3).since(t), Ticks::new(3));
        assert_eq!(t.since(t + 3), Ticks::ZERO);
        assert_eq!(t.to_string(), "21T");
    }
}
