//! Directory-backed sector store.
//!
//! Layout under the root directory:
//! - `drives.json`: registered geometries, a JSON array.
//! - `driveN.sec`: one file per drive, an array of 129-byte slots indexed
//!   by `track * 256 + (sector - 1)`. The first byte of a slot is 1 once the
//!   sector has been written; the other 128 are the payload. Slots past the
//!   end of the file, or with a zero marker, are absent.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::geometry::{DriveGeometry, SECTOR_SIZE, Sector, SectorKey};
use crate::store::SectorStore;

const MANIFEST: &str = "drives.json";
const SLOT_LEN: usize = SECTOR_SIZE + 1;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sector_file(&self, drive: u8) -> PathBuf {
        self.root.join(format!("drive{drive}.sec"))
    }

    fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST)
    }
}

fn slot_offset(key: SectorKey) -> u64 {
    u64::from(key.slot()) * SLOT_LEN as u64
}

/// Missing files read as empty.
fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl SectorStore for FileStore {
    fn get_sector(&mut self, key: SectorKey) -> Result<Option<Sector>, StoreError> {
        let mut file = match File::open(self.sector_file(key.drive())) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(slot_offset(key)))?;
        let mut slot = [0u8; SLOT_LEN];
        match file.read_exact(&mut slot) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        if slot[0] == 0 {
            return Ok(None);
        }
        let mut sector = [0u8; SECTOR_SIZE];
        sector.copy_from_slice(&slot[1..]);
        Ok(Some(sector))
    }

    fn put_sector(&mut self, key: SectorKey, data: &Sector) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.sector_file(key.drive()))?;
        file.seek(SeekFrom::Start(slot_offset(key)))?;
        let mut slot = [0u8; SLOT_LEN];
        slot[0] = 1;
        slot[1..].copy_from_slice(data);
        file.write_all(&slot)?;
        Ok(())
    }

    fn sectors_for_drive(&mut self, drive: u8) -> Result<Vec<(SectorKey, Sector)>, StoreError> {
        let Some(bytes) = read_optional(&self.sector_file(drive))? else {
            return Ok(Vec::new());
        };
        let base = u32::from(drive) << 16;
        let sectors = bytes
            .chunks_exact(SLOT_LEN)
            .enumerate()
            .filter(|(_, slot)| slot[0] != 0)
            .map(|(index, slot)| {
                let mut sector = [0u8; SECTOR_SIZE];
                sector.copy_from_slice(&slot[1..]);
                (SectorKey(base | index as u32), sector)
            })
            .collect();
        Ok(sectors)
    }

    fn put_geometry(&mut self, geometry: &DriveGeometry) -> Result<(), StoreError> {
        let mut all = self.geometries()?;
        all.retain(|g| g.drive != geometry.drive);
        all.push(geometry.clone());
        all.sort_by_key(|g| g.drive);
        fs::write(self.manifest(), serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }

    fn geometries(&mut self) -> Result<Vec<DriveGeometry>, StoreError> {
        match read_optional(&self.manifest())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}
