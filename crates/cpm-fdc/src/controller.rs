//! The port-mapped disk controller.
//!
//! # Register interface
//!
//! Drive, track, sector and a 16-bit DMA address are plain latches. Writing
//! the command register validates the latches and, if they describe a real
//! sector, submits a 128-byte transfer to the I/O backend and bumps the
//! pending counter. The CPU polls until pending is back to zero; only then
//! is memory at the DMA address defined.
//!
//! Validation order is drive, track, sector, command, DMA range. The first
//! failure sets the status register and nothing is submitted.

use std::collections::VecDeque;
use std::ops::Range;

use emu_core::{Observable, Value};
use log::{debug, info, warn};

use crate::error::{DiskError, DiskStatus};
use crate::geometry::{
    DriveGeometry, SECTOR_SIZE, Sector, SectorKey, default_geometries, default_name,
    formatted_sector,
};
use crate::transfer::{Completion, Outcome, Request, RequestId, RequestKind, SectorIo};

/// Command register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read,
    Write,
}

impl Command {
    fn decode(value: u8) -> Result<Self, DiskError> {
        match value {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            other => Err(DiskError::IllegalCommand(other)),
        }
    }
}

/// Result of a whole-drive dump.
#[derive(Debug)]
pub struct DriveDump {
    pub drive: u8,
    pub name: String,
    /// Flat image in (track, sector) order.
    pub image: Result<Vec<u8>, DiskError>,
}

/// A group of requests (format, image load) tracked as one unit.
struct Batch {
    ids: Range<RequestId>,
    outstanding: usize,
    failed: bool,
}

pub struct DiskController<I> {
    io: I,
    geometries: Vec<DriveGeometry>,

    drive: u8,
    track: u8,
    sector: u8,
    dma: u16,
    status: DiskStatus,

    /// Requests submitted and not yet completed.
    pending: usize,
    next_id: RequestId,

    batch: Option<Batch>,
    /// Whether the last finished batch had no failures.
    write_complete: Option<bool>,

    dump_requests: Vec<(RequestId, u8)>,
    dumps: VecDeque<DriveDump>,
}

impl<I: SectorIo> DiskController<I> {
    /// Controller with the default four IBM 3740 drives.
    #[must_use]
    pub fn new(io: I) -> Self {
        Self::with_geometries(io, default_geometries())
    }

    /// Controller with explicit drive shapes. Missing drives get defaults.
    #[must_use]
    pub fn with_geometries(io: I, geometries: Vec<DriveGeometry>) -> Self {
        let mut drives = default_geometries();
        for g in geometries {
            if let Some(slot) = drives.get_mut(usize::from(g.drive)) {
                *slot = g;
            }
        }
        Self {
            io,
            geometries: drives,
            drive: 0,
            track: 0,
            // CP/M sectors are 1-based.
            sector: 1,
            dma: 0,
            status: DiskStatus::Ok,
            pending: 0,
            next_id: 0,
            batch: None,
            write_complete: None,
            dump_requests: Vec::new(),
            dumps: VecDeque::new(),
        }
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }

    #[must_use]
    pub fn drive(&self) -> u8 {
        self.drive
    }

    pub fn set_drive(&mut self, value: u8) {
        self.drive = value;
    }

    #[must_use]
    pub fn track(&self) -> u8 {
        self.track
    }

    pub fn set_track(&mut self, value: u8) {
        self.track = value;
    }

    #[must_use]
    pub fn sector(&self) -> u8 {
        self.sector
    }

    pub fn set_sector(&mut self, value: u8) {
        self.sector = value;
    }

    #[must_use]
    pub fn dma(&self) -> u16 {
        self.dma
    }

    pub fn set_dma(&mut self, address: u16) {
        self.dma = address;
    }

    pub fn set_dma_low(&mut self, value: u8) {
        self.dma = (self.dma & 0xFF00) | u16::from(value);
    }

    pub fn set_dma_high(&mut self, value: u8) {
        self.dma = (self.dma & 0x00FF) | (u16::from(value) << 8);
    }

    #[must_use]
    pub fn status(&self) -> DiskStatus {
        self.status
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }

    #[must_use]
    pub fn geometry(&self, drive: u8) -> Option<&DriveGeometry> {
        self.geometries.get(usize::from(drive))
    }

    #[must_use]
    pub fn geometries(&self) -> &[DriveGeometry] {
        &self.geometries
    }

    /// Replace one drive's shape. Takes effect for the next command.
    pub fn set_geometry(&mut self, geometry: DriveGeometry) -> Result<(), DiskError> {
        let slot = self
            .geometries
            .get_mut(usize::from(geometry.drive))
            .ok_or(DiskError::IllegalDrive(geometry.drive))?;
        *slot = geometry;
        Ok(())
    }

    /// Result of the most recent format or image load, once it has
    /// finished. `None` while one is in flight or before the first.
    #[must_use]
    pub fn write_complete(&self) -> Option<bool> {
        self.write_complete
    }

    /// Command register write.
    pub fn command(&mut self, value: u8, memory: &[u8]) {
        if let Err(e) =
            self.start_transfer(value, self.drive, self.track, self.sector, self.dma, memory)
        {
            warn!("disk command {value}: {e}");
            self.status = e.status();
        }
    }

    /// Read a sector straight to `address` without going through the
    /// register latches. Same validation and pending rules as a command.
    pub fn read_sector_to(
        &mut self,
        drive: u8,
        track: u8,
        sector: u8,
        address: u16,
        memory: &[u8],
    ) -> Result<(), DiskError> {
        self.start_transfer(0, drive, track, sector, address, memory)
            .inspect_err(|e| self.status = e.status())
            .map(|_| ())
    }

    fn start_transfer(
        &mut self,
        command: u8,
        drive: u8,
        track: u8,
        sector: u8,
        dma: u16,
        memory: &[u8],
    ) -> Result<RequestId, DiskError> {
        let geometry = self
            .geometries
            .get(usize::from(drive))
            .ok_or(DiskError::IllegalDrive(drive))?;
        if track >= geometry.tracks {
            return Err(DiskError::IllegalTrack { drive, track });
        }
        if sector == 0 || sector > geometry.sectors {
            return Err(DiskError::IllegalSector { drive, sector });
        }
        let command = Command::decode(command)?;
        let range = usize::from(dma)..usize::from(dma) + SECTOR_SIZE;
        let dma_error = DiskError::DmaRange {
            address: dma,
            write: command == Command::Write,
        };
        if range.end > 0x10000 {
            return Err(dma_error);
        }

        let key = SectorKey::new(drive, track, sector);
        let kind = match command {
            Command::Read => RequestKind::Read { key, dma },
            Command::Write => {
                let source = memory.get(range).ok_or(dma_error)?;
                let mut data: Sector = [0; SECTOR_SIZE];
                data.copy_from_slice(source);
                RequestKind::Write { key, data }
            }
        };
        debug!("disk {command:?} {key} dma {dma:04X}");
        Ok(self.submit(kind))
    }

    fn submit(&mut self, kind: RequestKind) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending += 1;
        self.io.submit(Request { id, kind });
        id
    }

    /// Apply every completion the backend has ready. Reads land in
    /// `memory` here. Returns how many were applied.
    pub fn poll(&mut self, memory: &mut [u8]) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.io.poll() {
            self.complete(completion, memory);
            applied += 1;
        }
        applied
    }

    fn complete(&mut self, completion: Completion, memory: &mut [u8]) {
        self.pending = self.pending.saturating_sub(1);
        self.settle_batch(completion.id, completion.outcome.is_err());
        let dump_drive = self.take_dump_request(completion.id);

        match completion.outcome {
            Ok(Outcome::Read { key, dma, data }) => {
                let start = usize::from(dma);
                if let Some(dest) = memory.get_mut(start..start + SECTOR_SIZE) {
                    dest.copy_from_slice(&data);
                    self.status = DiskStatus::Ok;
                    debug!("disk read {key} done");
                } else {
                    warn!("disk read {key}: DMA {dma:04X} outside memory");
                    self.status = DiskStatus::ReadDma;
                }
            }
            Ok(Outcome::Written(key)) => {
                self.status = DiskStatus::Ok;
                debug!("disk write {key} done");
            }
            Ok(Outcome::GeometryStored(drive)) => debug!("geometry for drive {drive} stored"),
            Ok(Outcome::Geometries(list)) => {
                for geometry in list {
                    let drive = geometry.drive;
                    if let Some(slot) = self.geometries.get_mut(usize::from(drive)) {
                        info!(
                            "drive {drive}: {} ({} tracks x {} sectors)",
                            geometry.name, geometry.tracks, geometry.sectors
                        );
                        *slot = geometry;
                    }
                }
            }
            Ok(Outcome::Dump { drive, sectors }) => {
                let image = self.assemble(drive, sectors);
                if let Err(e) = &image {
                    warn!("dump of drive {drive}: {e}");
                    self.status = e.status();
                }
                self.push_dump(drive, image);
            }
            Err(e) => {
                warn!("disk request {}: {e}", completion.id);
                self.status = e.status();
                if let Some(drive) = dump_drive {
                    self.push_dump(drive, Err(e));
                }
            }
        }
    }

    fn settle_batch(&mut self, id: RequestId, failed: bool) {
        let Some(batch) = &mut self.batch else {
            return;
        };
        if !batch.ids.contains(&id) {
            return;
        }
        batch.outstanding -= 1;
        batch.failed |= failed;
        if batch.outstanding == 0 {
            let ok = !batch.failed;
            self.write_complete = Some(ok);
            self.batch = None;
            if ok {
                info!("disk write batch complete");
            } else {
                warn!("disk write batch finished with errors");
            }
        }
    }

    /// Submit a batch of requests and track them as one unit.
    fn submit_batch(&mut self, requests: Vec<RequestKind>) {
        let first = self.next_id;
        let outstanding = requests.len();
        self.write_complete = None;
        self.batch = Some(Batch {
            ids: first..first + outstanding as RequestId,
            outstanding,
            failed: false,
        });
        for kind in requests {
            self.submit(kind);
        }
    }

    /// Write the empty-directory pattern to every sector of `drive` and
    /// register it under its default name.
    pub fn format_drive(&mut self, drive: u8) -> Result<(), DiskError> {
        let geometry = self
            .geometries
            .get_mut(usize::from(drive))
            .ok_or(DiskError::IllegalDrive(drive))?;
        geometry.name = default_name(drive);
        let geometry = geometry.clone();
        info!(
            "formatting drive {drive}: {} tracks x {} sectors",
            geometry.tracks, geometry.sectors
        );

        let pattern = formatted_sector();
        let mut requests = Vec::with_capacity(geometry.sector_count() + 1);
        requests.push(RequestKind::PutGeometry(geometry.clone()));
        requests.extend(geometry.keys().map(|key| RequestKind::Write { key, data: pattern }));
        self.submit_batch(requests);
        Ok(())
    }

    /// Write a flat image onto `drive`, sector by sector in (track, sector)
    /// order. The length must match the drive's geometry exactly; a
    /// mismatch is rejected before anything is submitted.
    pub fn load_image(&mut self, drive: u8, name: &str, image: &[u8]) -> Result<(), DiskError> {
        let geometry = self
            .geometries
            .get_mut(usize::from(drive))
            .ok_or(DiskError::IllegalDrive(drive))?;
        let expected = geometry.image_len();
        if image.len() != expected {
            return Err(DiskError::ImageSize {
                expected,
                actual: image.len(),
            });
        }
        geometry.name = name.to_string();
        let geometry = geometry.clone();
        info!("loading {name} into drive {drive}");

        let mut requests = Vec::with_capacity(geometry.sector_count() + 1);
        requests.push(RequestKind::PutGeometry(geometry.clone()));
        for (key, chunk) in geometry.keys().zip(image.chunks_exact(SECTOR_SIZE)) {
            let mut data: Sector = [0; SECTOR_SIZE];
            data.copy_from_slice(chunk);
            requests.push(RequestKind::Write { key, data });
        }
        self.submit_batch(requests);
        Ok(())
    }

    /// Ask the store for registered geometries; they replace the current
    /// shapes of matching drives when the request completes.
    pub fn restore_geometries(&mut self) {
        self.submit(RequestKind::Geometries);
    }

    /// Start collecting every sector of `drive` into a flat image. The
    /// result is available from [`DiskController::take_dump`] once pending
    /// is back to zero.
    pub fn dump_drive(&mut self, drive: u8) -> Result<(), DiskError> {
        if self.geometry(drive).is_none() {
            return Err(DiskError::IllegalDrive(drive));
        }
        let id = self.submit(RequestKind::Dump { drive });
        self.dump_requests.push((id, drive));
        Ok(())
    }

    pub fn take_dump(&mut self) -> Option<DriveDump> {
        self.dumps.pop_front()
    }

    fn take_dump_request(&mut self, id: RequestId) -> Option<u8> {
        let index = self.dump_requests.iter().position(|&(i, _)| i == id)?;
        Some(self.dump_requests.swap_remove(index).1)
    }

    fn push_dump(&mut self, drive: u8, image: Result<Vec<u8>, DiskError>) {
        let name = self
            .geometry(drive)
            .map_or_else(|| default_name(drive), |g| g.name.clone());
        self.dumps.push_back(DriveDump { drive, name, image });
    }

    fn assemble(
        &self,
        drive: u8,
        mut sectors: Vec<(SectorKey, Sector)>,
    ) -> Result<Vec<u8>, DiskError> {
        let expected = self.geometry(drive).map_or(0, DriveGeometry::sector_count);
        if sectors.len() != expected {
            return Err(DiskError::SectorCount {
                drive,
                expected,
                actual: sectors.len(),
            });
        }
        sectors.sort_by_key(|(key, _)| *key);
        Ok(sectors.iter().flat_map(|(_, data)| data.iter().copied()).collect())
    }
}

const QUERY_PATHS: &[&str] = &["drive", "track", "sector", "dma", "status", "pending"];

impl<I> Observable for DiskController<I> {
    fn query(&self, path: &str) -> Option<Value> {
        let value = match path {
            "drive" => self.drive.into(),
            "track" => self.track.into(),
            "sector" => self.sector.into(),
            "dma" => self.dma.into(),
            "status" => self.status.code().into(),
            "pending" => (self.pending as u64).into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transfer::ImmediateIo;

    type Controller = DiskController<ImmediateIo<MemoryStore>>;

    fn controller() -> Controller {
        DiskController::new(ImmediateIo::new(MemoryStore::new()))
    }

    fn select(c: &mut Controller, drive: u8, track: u8, sector: u8, dma: u16) {
        c.set_drive(drive);
        c.set_track(track);
        c.set_sector(sector);
        c.set_dma_low(dma as u8);
        c.set_dma_high((dma >> 8) as u8);
    }

    #[test]
    fn validation_order() {
        let mut c = controller();
        let memory = vec![0u8; 0x10000];
        // Everything wrong: drive wins.
        select(&mut c, 4, 200, 0, 0xFFF0);
        c.command(9, &memory);
        assert_eq!(c.status().code(), 1);
        select(&mut c, 0, 77, 0, 0xFFF0);
        c.command(9, &memory);
        assert_eq!(c.status().code(), 2);
        select(&mut c, 0, 76, 27, 0xFFF0);
        c.command(9, &memory);
        assert_eq!(c.status().code(), 3);
        select(&mut c, 0, 76, 26, 0xFFF0);
        c.command(9, &memory);
        assert_eq!(c.status().code(), 7);
        c.command(0, &memory);
        assert_eq!(c.status().code(), 5);
        c.command(1, &memory);
        assert_eq!(c.status().code(), 6);
        assert_eq!(c.pending(), 0);
    }

    #[test]
    fn dma_may_end_exactly_at_top_of_memory() {
        let mut c = controller();
        let mut memory = vec![0u8; 0x10000];
        memory[0xFF80..].fill(0x33);
        select(&mut c, 0, 0, 1, 0xFF80);
        c.command(1, &memory);
        assert_eq!(c.pending(), 1);
        c.poll(&mut memory);
        assert_eq!(c.status(), DiskStatus::Ok);
        assert_eq!(c.io().store().peek(SectorKey::new(0, 0, 1)), Some(&[0x33; 128]));
    }

    #[test]
    fn write_captures_memory_at_submit() {
        let mut c = controller();
        let mut memory = vec![0u8; 0x10000];
        memory[0x100..0x180].fill(0xAA);
        select(&mut c, 1, 2, 3, 0x0100);
        c.command(1, &memory);
        memory[0x100..0x180].fill(0x00);
        c.poll(&mut memory);

        select(&mut c, 1, 2, 3, 0x0200);
        c.command(0, &memory);
        assert!(!c.is_idle());
        assert_eq!(memory[0x200], 0);
        assert_eq!(c.poll(&mut memory), 1);
        assert!(c.is_idle());
        assert!(memory[0x200..0x280].iter().all(|&b| b == 0xAA));
        assert_eq!(c.status(), DiskStatus::Ok);
    }

    #[test]
    fn never_written_sector_fails_and_drains() {
        let mut c = controller();
        let mut memory = vec![0x11u8; 0x10000];
        select(&mut c, 0, 5, 5, 0x4000);
        c.command(0, &memory);
        assert_eq!(c.pending(), 1);
        c.poll(&mut memory);
        assert_eq!(c.pending(), 0);
        assert_eq!(c.status().code(), 8);
        assert!(memory.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn format_writes_every_sector() {
        let mut c = controller();
        c.set_geometry(DriveGeometry {
            drive: 2,
            tracks: 3,
            sectors: 4,
            name: "scratch".into(),
        })
        .expect("drive 2 exists");
        let mut memory = vec![0u8; 0x10000];
        c.format_drive(2).expect("format");
        assert_eq!(c.pending(), 13);
        assert_eq!(c.write_complete(), None);
        c.poll(&mut memory);
        assert_eq!(c.pending(), 0);
        assert_eq!(c.write_complete(), Some(true));

        let store = c.io().store();
        assert_eq!(store.len(), 12);
        for track in 0..3 {
            for sector in 1..=4 {
                assert_eq!(
                    store.peek(SectorKey::new(2, track, sector)),
                    Some(&formatted_sector())
                );
            }
        }
        assert_eq!(c.geometry(2).map(|g| g.name.as_str()), Some("dsk2.cpm"));
    }

    #[test]
    fn image_size_mismatch_submits_nothing() {
        let mut c = controller();
        let err = c.load_image(0, "short.dsk", &[0; 1000]).expect_err("wrong size");
        assert!(matches!(err, DiskError::ImageSize { actual: 1000, .. }));
        assert_eq!(c.pending(), 0);
        assert_eq!(c.geometry(0).map(|g| g.name.as_str()), Some("dsk0.cpm"));
        assert!(matches!(
            c.load_image(7, "x", &[]),
            Err(DiskError::IllegalDrive(7))
        ));
    }

    #[test]
    fn image_load_then_dump_round_trips() {
        let mut c = controller();
        c.set_geometry(DriveGeometry {
            drive: 1,
            tracks: 2,
            sectors: 2,
            name: String::new(),
        })
        .expect("drive 1");
        let image: Vec<u8> = (0..512).map(|i| (i / 128) as u8 + 1).collect();
        let mut memory = vec![0u8; 0x10000];
        c.load_image(1, "tiny.dsk", &image).expect("load");
        c.poll(&mut memory);
        assert_eq!(c.write_complete(), Some(true));
        assert_eq!(
            c.io().store().peek(SectorKey::new(1, 1, 1)).map(|s| s[0]),
            Some(3)
        );

        c.dump_drive(1).expect("dump");
        c.poll(&mut memory);
        let dump = c.take_dump().expect("dump finished");
        assert_eq!(dump.drive, 1);
        assert_eq!(dump.name, "tiny.dsk");
        assert_eq!(dump.image.expect("complete drive"), image);
    }

    #[test]
    fn dump_of_partial_drive_is_an_error() {
        let mut c = controller();
        let mut memory = vec![0u8; 0x10000];
        select(&mut c, 0, 0, 1, 0);
        c.command(1, &memory);
        c.dump_drive(0).expect("dump");
        c.poll(&mut memory);
        let dump = c.take_dump().expect("dump finished");
        assert!(matches!(
            dump.image,
            Err(DiskError::SectorCount { actual: 1, expected: 2002, .. })
        ));
        assert_eq!(c.status().code(), 8);
    }

    #[test]
    fn restore_replaces_matching_drives() {
        let mut store = MemoryStore::new();
        crate::store::SectorStore::put_geometry(
            &mut store,
            &DriveGeometry {
                drive: 3,
                tracks: 40,
                sectors: 9,
                name: "saved.dsk".into(),
            },
        )
        .expect("put");
        let mut c = DiskController::new(ImmediateIo::new(store));
        let mut memory = vec![0u8; 0x10000];
        c.restore_geometries();
        c.poll(&mut memory);
        let g = c.geometry(3).expect("drive 3");
        assert_eq!((g.tracks, g.sectors, g.name.as_str()), (40, 9, "saved.dsk"));
        assert_eq!(c.geometry(0), Some(&DriveGeometry::ibm_3740(0)));
    }

    #[test]
    fn boot_read_bypasses_latches() {
        let mut c = controller();
        let mut memory = vec![0u8; 0x10000];
        crate::store::SectorStore::put_sector(
            c.io_mut().store_mut(),
            SectorKey::new(0, 0, 1),
            &[0xC3; 128],
        )
        .expect("put");
        c.read_sector_to(0, 0, 1, 0x0000, &memory).expect("valid");
        assert_eq!(c.drive(), 0);
        assert_eq!(c.sector(), 1);
        assert_eq!(c.dma(), 0);
        c.poll(&mut memory);
        assert_eq!(memory[0], 0xC3);
        assert!(c.read_sector_to(0, 0, 0, 0, &memory).is_err());
        assert_eq!(c.status().code(), 3);
    }

    #[test]
    fn observable_registers() {
        let mut c = controller();
        select(&mut c, 1, 2, 3, 0x1234);
        assert_eq!(c.query("dma"), Some(Value::U16(0x1234)));
        assert_eq!(c.query("sector"), Some(Value::U8(3)));
        assert_eq!(c.query("pending"), Some(Value::U64(0)));
    }
}
