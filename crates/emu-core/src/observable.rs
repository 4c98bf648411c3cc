//! Read-only inspection of component state.
//!
//! Debuggers and status lines ask for state by dotted path (`"pc"`,
//! `"flags.z"`, `"disk.pending"`). Queries never change emulation state.

use std::fmt;

/// A dynamically-typed value returned by a state query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U64(u64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", u8::from(*v)),
            Value::U8(v) => write!(f, "{v:02X}"),
            Value::U16(v) => write!(f, "{v:04X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A component whose state can be inspected by path.
pub trait Observable {
    /// Query one property. `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// Every path [`Observable::query`] answers.
    fn query_paths(&self) -> &'static [&'static str];

    /// All properties as `path=value` pairs, in `query_paths` order.
    fn snapshot(&self) -> Vec<(&'static str, Value)> {
        self.query_paths()
            .iter()
            .filter_map(|&path| self.query(path).map(|v| (path, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Latch {
        open: bool,
        count: u8,
    }

    impl Observable for Latch {
        fn query(&self, path: &str) -> Option<Value> {
            match path {
                "open" => Some(self.open.into()),
                "count" => Some(self.count.into()),
                _ => None,
            }
        }

        fn query_paths(&self) -> &'static [&'static str] {
            &["open", "count", "missing"]
        }
    }

    #[test]
    fn snapshot_skips_unanswered_paths() {
        let latch = Latch { open: true, count: 0x2A };
        let snap = latch.snapshot();
        assert_eq!(snap, vec![("open", Value::Bool(true)), ("count", Value::U8(0x2A))]);
    }

    #[test]
    fn display_is_hex_for_registers() {
        assert_eq!(Value::U8(0x0A).to_string(), "0A");
        assert_eq!(Value::U16(0xF000).to_string(), "F000");
        assert_eq!(Value::Bool(false).to_string(), "0");
        assert_eq!(Value::from("dsk0.cpm").to_string(), "dsk0.cpm");
    }
}
