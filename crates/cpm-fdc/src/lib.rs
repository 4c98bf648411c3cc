//! CP/M floppy controller.
//!
//! The controller is a handful of I/O-port latches in front of a sector
//! store. Transfers are asynchronous: a command only submits a request, and
//! the result lands in guest memory when the machine next calls
//! [`DiskController::poll`]. The guest sees this through the pending
//! counter.
//!
//! Storage is pluggable ([`SectorStore`]) and so is the way requests reach
//! it ([`SectorIo`]): [`ImmediateIo`] runs them inline but completes on the
//! next poll, [`WorkerIo`] runs them on a background thread.

mod controller;
mod error;
mod file_store;
mod geometry;
mod store;
mod transfer;

pub use controller::{Command, DiskController, DriveDump};
pub use error::{DiskError, DiskStatus, StoreError};
pub use file_store::FileStore;
pub use geometry::{
    DRIVE_COUNT, DriveGeometry, SECTOR_SIZE, Sector, SectorKey, default_geometries, default_name,
    formatted_sector,
};
pub use store::{MemoryStore, SectorStore};
pub use transfer::{
    Completion, ImmediateIo, Outcome, Request, RequestId, RequestKind, SectorIo, WorkerIo, perform,
};
