//! Disk and store errors, and the status codes they map to.

use std::fmt;
use std::io;

use crate::geometry::SectorKey;

/// Failure inside a sector store.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    /// The geometry manifest could not be read or written.
    Manifest(serde_json::Error),
    /// The I/O worker is gone.
    Disconnected,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "store I/O error: {e}"),
            Self::Manifest(e) => write!(f, "drive manifest error: {e}"),
            Self::Disconnected => write!(f, "sector I/O worker has stopped"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Manifest(e) => Some(e),
            Self::Disconnected => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Manifest(e)
    }
}

/// Value of the disk status port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskStatus {
    #[default]
    Ok,
    IllegalDrive,
    IllegalTrack,
    IllegalSector,
    ReadDma,
    WriteDma,
    IllegalCommand,
    /// Store failure, missing sector, or a bad dump.
    StoreFailure,
}

impl DiskStatus {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::IllegalDrive => 1,
            Self::IllegalTrack => 2,
            Self::IllegalSector => 3,
            Self::ReadDma => 5,
            Self::WriteDma => 6,
            Self::IllegalCommand => 7,
            Self::StoreFailure => 8,
        }
    }
}

/// A disk operation that could not be carried out.
#[derive(Debug)]
pub enum DiskError {
    IllegalDrive(u8),
    IllegalTrack { drive: u8, track: u8 },
    IllegalSector { drive: u8, sector: u8 },
    IllegalCommand(u8),
    /// The 128-byte transfer would run past the top of memory.
    DmaRange { address: u16, write: bool },
    NotFound(SectorKey),
    Store(StoreError),
    /// A flat image whose length does not match the drive geometry.
    ImageSize { expected: usize, actual: usize },
    /// A dump found the wrong number of sectors on a drive.
    SectorCount { drive: u8, expected: usize, actual: usize },
}

impl DiskError {
    /// Status-port code for this error.
    #[must_use]
    pub const fn status(&self) -> DiskStatus {
        match self {
            Self::IllegalDrive(_) => DiskStatus::IllegalDrive,
            Self::IllegalTrack { .. } => DiskStatus::IllegalTrack,
            Self::IllegalSector { .. } => DiskStatus::IllegalSector,
            Self::IllegalCommand(_) => DiskStatus::IllegalCommand,
            Self::DmaRange { write: false, .. } => DiskStatus::ReadDma,
            Self::DmaRange { write: true, .. } => DiskStatus::WriteDma,
            Self::NotFound(_)
            | Self::Store(_)
            | Self::ImageSize { .. }
            | Self::SectorCount { .. } => DiskStatus::StoreFailure,
        }
    }
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalDrive(d) => write!(f, "illegal drive {d}"),
            Self::IllegalTrack { drive, track } => {
                write!(f, "illegal track {track} on drive {drive}")
            }
            Self::IllegalSector { drive, sector } => {
                write!(f, "illegal sector {sector} on drive {drive}")
            }
            Self::IllegalCommand(c) => write!(f, "illegal disk command {c}"),
            Self::DmaRange { address, write } => write!(
                f,
                "{} DMA at {address:04X} runs past end of memory",
                if *write { "write" } else { "read" }
            ),
            Self::NotFound(key) => write!(f, "{key} not found"),
            Self::Store(e) => write!(f, "{e}"),
            Self::ImageSize { expected, actual } => {
                write!(f, "image is {actual} bytes, drive needs {expected}")
            }
            Self::SectorCount {
                drive,
                expected,
                actual,
            } => write!(
                f,
                "drive {drive} holds {actual} sectors, geometry says {expected}"
            ),
        }
    }
}

impl std::error::Error for DiskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DiskError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(DiskError::IllegalDrive(9).status().code(), 1);
        assert_eq!(DiskError::IllegalTrack { drive: 0, track: 80 }.status().code(), 2);
        assert_eq!(DiskError::IllegalSector { drive: 0, sector: 0 }.status().code(), 3);
        assert_eq!(DiskError::DmaRange { address: 0xFFC0, write: false }.status().code(), 5);
        assert_eq!(DiskError::DmaRange { address: 0xFFC0, write: true }.status().code(), 6);
        assert_eq!(DiskError::IllegalCommand(2).status().code(), 7);
        assert_eq!(DiskError::NotFound(SectorKey::new(0, 0, 1)).status().code(), 8);
        assert_eq!(DiskError::Store(StoreError::Disconnected).status().code(), 8);
        assert_eq!(DiskStatus::default().code(), 0);
    }

    #[test]
    fn messages() {
        assert_eq!(
            DiskError::NotFound(SectorKey::new(1, 2, 3)).to_string(),
            "drive 1 track 2 sector 3 not found"
        );
        assert_eq!(
            DiskError::ImageSize { expected: 256, actual: 10 }.to_string(),
            "image is 10 bytes, drive needs 256"
        );
    }
}
