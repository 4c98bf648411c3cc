//! Drive geometry and sector addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bytes per sector. Fixed for every drive.
pub const SECTOR_SIZE: usize = 128;

/// Drives the controller can address.
pub const DRIVE_COUNT: usize = 4;

/// One sector's payload.
pub type Sector = [u8; SECTOR_SIZE];

/// Composite store key: `drive * 65536 + track * 256 + (sector - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorKey(pub u32);

impl SectorKey {
    /// Key for a 1-based sector number.
    #[must_use]
    pub const fn new(drive: u8, track: u8, sector: u8) -> Self {
        Self((drive as u32) << 16 | (track as u32) << 8 | sector.wrapping_sub(1) as u32)
    }

    #[must_use]
    pub const fn drive(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[must_use]
    pub const fn track(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// 1-based sector number.
    #[must_use]
    pub const fn sector(self) -> u8 {
        (self.0 as u8).wrapping_add(1)
    }

    /// Position within the drive, `track * 256 + (sector - 1)`.
    #[must_use]
    pub const fn slot(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "drive {} track {} sector {}",
            self.drive(),
            self.track(),
            self.sector()
        )
    }
}

/// Shape and image name of one drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveGeometry {
    pub drive: u8,
    pub tracks: u8,
    pub sectors: u8,
    pub name: String,
}

impl DriveGeometry {
    /// IBM 3740 8" single-sided single-density: 77 tracks of 26 sectors.
    #[must_use]
    pub fn ibm_3740(drive: u8) -> Self {
        Self {
            drive,
            tracks: 77,
            sectors: 26,
            name: default_name(drive),
        }
    }

    #[must_use]
    pub fn sector_count(&self) -> usize {
        usize::from(self.tracks) * usize::from(self.sectors)
    }

    /// Size of a flat image of this drive.
    #[must_use]
    pub fn image_len(&self) -> usize {
        self.sector_count() * SECTOR_SIZE
    }

    /// Every key on the drive in (track, sector) order.
    pub fn keys(&self) -> impl Iterator<Item = SectorKey> + '_ {
        (0..self.tracks).flat_map(move |track| {
            (1..=self.sectors).map(move |sector| SectorKey::new(self.drive, track, sector))
        })
    }
}

/// `dskN.cpm`
#[must_use]
pub fn default_name(drive: u8) -> String {
    format!("dsk{drive}.cpm")
}

/// The default four-drive configuration.
#[must_use]
pub fn default_geometries() -> Vec<DriveGeometry> {
    (0..DRIVE_COUNT as u8).map(DriveGeometry::ibm_3740).collect()
}

/// A freshly formatted sector: empty directory entries (0xE5) at each
/// 32-byte boundary, zero elsewhere.
#[must_use]
pub fn formatted_sector() -> Sector {
    let mut sector = [0; SECTOR_SIZE];
    for offset in (0..SECTOR_SIZE).step_by(32) {
        sector[offset] = 0xE5;
    }
    sector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = SectorKey::new(2, 76, 26);
        assert_eq!(key.0, 2 * 65536 + 76 * 256 + 25);
        assert_eq!((key.drive(), key.track(), key.sector()), (2, 76, 26));
        assert_eq!(key.slot(), 76 * 256 + 25);
        assert_eq!(key.to_string(), "drive 2 track 76 sector 26");
    }

    #[test]
    fn keys_follow_track_then_sector() {
        let g = DriveGeometry {
            drive: 1,
            tracks: 2,
            sectors: 3,
            name: "t".into(),
        };
        let keys: Vec<_> = g.keys().map(|k| (k.track(), k.sector())).collect();
        assert_eq!(keys, vec![(0, 1), (0, 2), (0, 3), (1, 1), (1, 2), (1, 3)]);
        assert_eq!(g.image_len(), 6 * 128);
    }

    #[test]
    fn defaults() {
        let all = default_geometries();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].name, "dsk3.cpm");
        assert_eq!(all[0].image_len(), 77 * 26 * 128);
    }

    #[test]
    fn format_pattern() {
        let s = formatted_sector();
        for (i, &b) in s.iter().enumerate() {
            let want = if i % 32 == 0 { 0xE5 } else { 0 };
            assert_eq!(b, want, "offset {i}");
        }
    }
}
