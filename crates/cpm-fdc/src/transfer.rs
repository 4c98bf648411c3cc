//! Asynchronous sector I/O.
//!
//! The controller never touches a store directly. It hands [`Request`]s to
//! a [`SectorIo`] backend and later drains [`Completion`]s, which carry
//! everything needed to finish the operation (the DMA address captured at
//! submit time, the data read). Two backends are provided:
//!
//! - [`ImmediateIo`] runs each request inline and queues its completion for
//!   the next poll. Deterministic; what the tests use.
//! - [`WorkerIo`] hands requests to a worker thread that owns the store.
//!   Requests are processed in submission order, so a read after a write to
//!   the same key sees the written data.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::{DiskError, StoreError};
use crate::geometry::{DriveGeometry, Sector, SectorKey};
use crate::store::SectorStore;

/// Identifies a request so its completion can be matched up.
pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Read a sector; the payload lands at `dma` on completion.
    Read { key: SectorKey, dma: u16 },
    /// Write a sector captured from memory at submit time.
    Write { key: SectorKey, data: Sector },
    PutGeometry(DriveGeometry),
    Geometries,
    /// Every stored sector of a drive.
    Dump { drive: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
}

#[derive(Debug)]
pub enum Outcome {
    Read { key: SectorKey, dma: u16, data: Sector },
    Written(SectorKey),
    GeometryStored(u8),
    Geometries(Vec<DriveGeometry>),
    Dump { drive: u8, sectors: Vec<(SectorKey, Sector)> },
}

#[derive(Debug)]
pub struct Completion {
    pub id: RequestId,
    pub outcome: Result<Outcome, DiskError>,
}

/// A backend that carries out sector requests, possibly later.
pub trait SectorIo {
    fn submit(&mut self, request: Request);

    /// Next finished request, if any.
    fn poll(&mut self) -> Option<Completion>;
}

/// Run one request against a store.
pub fn perform<S: SectorStore + ?Sized>(store: &mut S, request: Request) -> Completion {
    let outcome = match request.kind {
        RequestKind::Read { key, dma } => match store.get_sector(key) {
            Ok(Some(data)) => Ok(Outcome::Read { key, dma, data }),
            Ok(None) => Err(DiskError::NotFound(key)),
            Err(e) => Err(e.into()),
        },
        RequestKind::Write { key, data } => store
            .put_sector(key, &data)
            .map(|()| Outcome::Written(key))
            .map_err(DiskError::from),
        RequestKind::PutGeometry(geometry) => store
            .put_geometry(&geometry)
            .map(|()| Outcome::GeometryStored(geometry.drive))
            .map_err(DiskError::from),
        RequestKind::Geometries => store
            .geometries()
            .map(Outcome::Geometries)
            .map_err(DiskError::from),
        RequestKind::Dump { drive } => store
            .sectors_for_drive(drive)
            .map(|sectors| Outcome::Dump { drive, sectors })
            .map_err(DiskError::from),
    };
    Completion {
        id: request.id,
        outcome,
    }
}

/// Synchronous backend: the work happens in `submit`, the completion is
/// delivered by the next `poll`.
pub struct ImmediateIo<S> {
    store: S,
    ready: VecDeque<Completion>,
}

impl<S: SectorStore> ImmediateIo<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            ready: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: SectorStore> SectorIo for ImmediateIo<S> {
    fn submit(&mut self, request: Request) {
        let completion = perform(&mut self.store, request);
        self.ready.push_back(completion);
    }

    fn poll(&mut self) -> Option<Completion> {
        self.ready.pop_front()
    }
}

type CompletionQueue = Arc<Mutex<VecDeque<Completion>>>;

fn push_completion(queue: &CompletionQueue, completion: Completion) {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.push_back(completion);
}

/// Threaded backend. The worker owns the store; completions come back
/// through a shared queue drained by `poll`.
pub struct WorkerIo {
    requests: Option<Sender<Request>>,
    completions: CompletionQueue,
    worker: Option<JoinHandle<()>>,
}

impl WorkerIo {
    #[must_use]
    pub fn spawn<S>(mut store: S) -> Self
    where
        S: SectorStore + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Request>();
        let completions: CompletionQueue = Arc::new(Mutex::new(VecDeque::new()));
        let queue = Arc::clone(&completions);
        let worker = thread::spawn(move || {
            for request in rx {
                let completion = perform(&mut store, request);
                push_completion(&queue, completion);
            }
            debug!("sector I/O worker exiting");
        });
        Self {
            requests: Some(tx),
            completions,
            worker: Some(worker),
        }
    }
}

impl SectorIo for WorkerIo {
    fn submit(&mut self, request: Request) {
        let Some(tx) = &self.requests else {
            return;
        };
        if let Err(mpsc::SendError(request)) = tx.send(request) {
            // Still complete it so the caller's pending count drains.
            warn!("sector I/O worker is gone; failing request {}", request.id);
            push_completion(
                &self.completions,
                Completion {
                    id: request.id,
                    outcome: Err(StoreError::Disconnected.into()),
                },
            );
        }
    }

    fn poll(&mut self) -> Option<Completion> {
        let mut guard = match self.completions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.pop_front()
    }
}

impl Drop for WorkerIo {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once queued work is done.
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sector I/O worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::store::MemoryStore;

    fn request(id: RequestId, kind: RequestKind) -> Request {
        Request { id, kind }
    }

    #[test]
    fn immediate_defers_to_poll() {
        let mut io = ImmediateIo::new(MemoryStore::new());
        let key = SectorKey::new(0, 0, 1);
        io.submit(request(1, RequestKind::Write { key, data: [3; 128] }));
        io.submit(request(2, RequestKind::Read { key, dma: 0x80 }));
        let first = io.poll().expect("write completion");
        assert_eq!(first.id, 1);
        assert!(matches!(first.outcome, Ok(Outcome::Written(k)) if k == key));
        let second = io.poll().expect("read completion");
        assert!(matches!(
            second.outcome,
            Ok(Outcome::Read { dma: 0x80, data, .. }) if data == [3; 128]
        ));
        assert!(io.poll().is_none());
    }

    #[test]
    fn missing_sector_is_not_found() {
        let mut store = MemoryStore::new();
        let key = SectorKey::new(1, 2, 3);
        let done = perform(&mut store, request(9, RequestKind::Read { key, dma: 0 }));
        assert!(matches!(done.outcome, Err(DiskError::NotFound(k)) if k == key));
    }

    #[test]
    fn worker_preserves_order() {
        let mut io = WorkerIo::spawn(MemoryStore::new());
        let key = SectorKey::new(0, 5, 5);
        io.submit(request(1, RequestKind::Write { key, data: [1; 128] }));
        io.submit(request(2, RequestKind::Write { key, data: [2; 128] }));
        io.submit(request(3, RequestKind::Read { key, dma: 0 }));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut done = Vec::new();
        while done.len() < 3 && Instant::now() < deadline {
            match io.poll() {
                Some(c) => done.push(c),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        assert_eq!(done.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(matches!(
            done[2].outcome,
            Ok(Outcome::Read { data, .. }) if data == [2; 128]
        ));
    }
}
