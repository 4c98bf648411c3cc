//! Key-addressed sector storage.

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::geometry::{DriveGeometry, Sector, SectorKey};

/// Persistent home of sector contents and drive geometries.
///
/// Sectors that were never written are absent, not zero-filled.
pub trait SectorStore {
    fn get_sector(&mut self, key: SectorKey) -> Result<Option<Sector>, StoreError>;

    fn put_sector(&mut self, key: SectorKey, data: &Sector) -> Result<(), StoreError>;

    /// Every stored sector of `drive`, in key order.
    fn sectors_for_drive(&mut self, drive: u8) -> Result<Vec<(SectorKey, Sector)>, StoreError>;

    /// Record a drive's geometry, replacing any earlier entry for it.
    fn put_geometry(&mut self, geometry: &DriveGeometry) -> Result<(), StoreError>;

    fn geometries(&mut self) -> Result<Vec<DriveGeometry>, StoreError>;
}

/// In-memory store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sectors: BTreeMap<SectorKey, Sector>,
    geometries: BTreeMap<u8, DriveGeometry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// Direct read without the `Result` wrapper.
    #[must_use]
    pub fn peek(&self, key: SectorKey) -> Option<&Sector> {
        self.sectors.get(&key)
    }
}

impl SectorStore for MemoryStore {
    fn get_sector(&mut self, key: SectorKey) -> Result<Option<Sector>, StoreError> {
        Ok(self.sectors.get(&key).copied())
    }

    fn put_sector(&mut self, key: SectorKey, data: &Sector) -> Result<(), StoreError> {
        self.sectors.insert(key, *data);
        Ok(())
    }

    fn sectors_for_drive(&mut self, drive: u8) -> Result<Vec<(SectorKey, Sector)>, StoreError> {
        let first = SectorKey(u32::from(drive) << 16);
        let last = SectorKey(u32::from(drive) << 16 | 0xFFFF);
        Ok(self
            .sectors
            .range(first..=last)
            .map(|(k, v)| (*k, *v))
            .collect())
    }

    fn put_geometry(&mut self, geometry: &DriveGeometry) -> Result<(), StoreError> {
        self.geometries.insert(geometry.drive, geometry.clone());
        Ok(())
    }

    fn geometries(&mut self) -> Result<Vec<DriveGeometry>, StoreError> {
        Ok(self.geometries.values().cloned().collect())
    }
}

impl<S: SectorStore + ?Sized> SectorStore for Box<S> {
    fn get_sector(&mut self, key: SectorKey) -> Result<Option<Sector>, StoreError> {
        (**self).get_sector(key)
    }

    fn put_sector(&mut self, key: SectorKey, data: &Sector) -> Result<(), StoreError> {
        (**self).put_sector(key, data)
    }

    fn sectors_for_drive(&mut self, drive: u8) -> Result<Vec<(SectorKey, Sector)>, StoreError> {
        (**self).sectors_for_drive(drive)
    }

    fn put_geometry(&mut self, geometry: &DriveGeometry) -> Result<(), StoreError> {
        (**self).put_geometry(geometry)
    }

    fn geometries(&mut self) -> Result<Vec<DriveGeometry>, StoreError> {
        (**self).geometries()
    }
}
