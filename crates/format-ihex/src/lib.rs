//! Intel HEX parser and loader.
//!
//! Each record is one line: `:CCAAAATT<data>SS`, where CC is the data
//! length, AAAA the load address, TT the record type and SS a checksum
//! chosen so that all record bytes sum to zero mod 256. Loading stops at an
//! end-of-file record (type 01) or any record with a zero count.
//!
//! Only data (00) and end-of-file (01) records are understood; the 8080
//! toolchains CP/M uses never emit the segment or linear address types.

use std::fmt;

pub const RECORD_DATA: u8 = 0x00;
pub const RECORD_EOF: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    /// A non-blank line that does not start with `:`.
    MissingStartCode { line: usize },
    /// A character that is not a hex digit.
    BadDigit { line: usize, column: usize },
    /// Wrong length for the declared count, odd digit count, or an
    /// unsupported record type.
    Malformed { line: usize, reason: &'static str },
    Checksum { line: usize, expected: u8, actual: u8 },
    /// A data byte would land past the end of the target memory.
    OutOfRange { line: usize, address: usize },
    /// No records before end of input.
    Empty,
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStartCode { line } => write!(f, "line {line}: record does not start with ':'"),
            Self::BadDigit { line, column } => write!(f, "line {line}, column {column}: bad hex digit"),
            Self::Malformed { line, reason } => write!(f, "line {line}: malformed record ({reason})"),
            Self::Checksum {
                line,
                expected,
                actual,
            } => write!(
                f,
                "line {line}: checksum mismatch (expected {expected:02X}, found {actual:02X})"
            ),
            Self::OutOfRange { line, address } => {
                write!(f, "line {line}: address {address:#06X} outside memory")
            }
            Self::Empty => write!(f, "no HEX records found"),
        }
    }
}

impl std::error::Error for HexError {}

/// One data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub address: u16,
    pub data: Vec<u8>,
}

impl Record {
    /// Address of the last byte, not wrapped.
    fn last(&self) -> usize {
        usize::from(self.address) + self.data.len() - 1
    }
}

/// Where a load put its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexLoad {
    /// Lowest record address; also the entry point.
    pub start: u16,
    /// Highest address written.
    pub end: u16,
    /// `end - start + 1`.
    pub len: usize,
}

/// A parsed and checksum-verified HEX file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexImage {
    records: Vec<Record>,
}

impl HexImage {
    /// Parse the whole text. Nothing is returned unless every record up to
    /// the terminator is valid.
    pub fn parse(text: &str) -> Result<Self, HexError> {
        let mut records = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let Some(body) = raw.strip_prefix(':') else {
                return Err(HexError::MissingStartCode { line });
            };
            let bytes = decode_hex(body, line)?;
            if bytes.len() < 5 {
                return Err(HexError::Malformed {
                    line,
                    reason: "shorter than a header and checksum",
                });
            }

            let count = usize::from(bytes[0]);
            if bytes.len() != count + 5 {
                return Err(HexError::Malformed {
                    line,
                    reason: "length does not match count",
                });
            }
            let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            if sum != 0 {
                let stored = bytes[bytes.len() - 1];
                return Err(HexError::Checksum {
                    line,
                    expected: stored.wrapping_sub(sum),
                    actual: stored,
                });
            }
            // Terminators are checked like any other record.
            if count == 0 {
                break;
            }

            match bytes[3] {
                RECORD_DATA => records.push(Record {
                    line,
                    address: u16::from_be_bytes([bytes[1], bytes[2]]),
                    data: bytes[4..4 + count].to_vec(),
                }),
                RECORD_EOF => break,
                _ => {
                    return Err(HexError::Malformed {
                        line,
                        reason: "unsupported record type",
                    });
                }
            }
        }
        if records.is_empty() {
            return Err(HexError::Empty);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Start, end and span of the data.
    pub fn extent(&self) -> HexLoad {
        let start = self.records.iter().map(|r| r.address).min().unwrap_or(0);
        let last = self.records.iter().map(Record::last).max().unwrap_or(0);
        HexLoad {
            start,
            end: last as u16,
            len: last + 1 - usize::from(start),
        }
    }

    /// Every (address, byte) pair in file order. Addresses wrap at 64K.
    pub fn bytes(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.records.iter().flat_map(|r| {
            r.data
                .iter()
                .enumerate()
                .map(move |(i, &b)| (r.address.wrapping_add(i as u16), b))
        })
    }

    /// Copy into `memory`. Fails without writing anything if a record
    /// reaches past the end of the slice.
    pub fn write_to(&self, memory: &mut [u8]) -> Result<HexLoad, HexError> {
        if let Some(r) = self.records.iter().find(|r| r.last() >= memory.len()) {
            return Err(HexError::OutOfRange {
                line: r.line,
                address: r.last(),
            });
        }
        for r in &self.records {
            let start = usize::from(r.address);
            memory[start..start + r.data.len()].copy_from_slice(&r.data);
        }
        Ok(self.extent())
    }
}

/// Parse and load in one go. Memory is untouched on any error.
pub fn load(text: &str, memory: &mut [u8]) -> Result<HexLoad, HexError> {
    HexImage::parse(text)?.write_to(memory)
}

fn decode_hex(digits: &str, line: usize) -> Result<Vec<u8>, HexError> {
    let digits = digits.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(HexError::Malformed {
            line,
            reason: "odd number of hex digits",
        });
    }
    digits
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            // Column is 1-based and counts the leading ':'.
            let column = 2 + i * 2;
            let hi = nibble(pair[0]).ok_or(HexError::BadDigit { line, column })?;
            let lo = nibble(pair[1]).ok_or(HexError::BadDigit {
                line,
                column: column + 1,
            })?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn nibble(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}
