//! The CP/M machine: a Z80 on a [`CpmBus`], run in fixed-size slices.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use cpm_fdc::{DiskController, DiskError, DiskStatus, SectorIo};
use emu_core::{Observable, Step, Value};
use format_ihex::{HexError, HexLoad};
use log::{info, warn};
use zilog_z80::{DecodeError, Z80};

use crate::bus::CpmBus;
use crate::config::{CpmConfig, DecodePolicy};
use crate::console::{Console, Printer};

/// How long [`CpmMachine::wait_io`] waits for the disk before giving up.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a slice ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceExit {
    /// Ran the full instruction budget.
    Completed,
    /// The program kept polling an empty console; yield until input.
    Idle,
    Halted,
    /// Undecodable opcode under [`DecodePolicy::Halt`].
    DecodeError(DecodeError),
}

#[derive(Debug)]
pub enum MachineError {
    Disk(DiskError),
    Hex(HexError),
    /// The boot sector read completed with an error status.
    Boot { drive: u8, status: DiskStatus },
    /// A format or image load did not write every sector.
    WriteFailed { drive: u8 },
    /// A dump request finished without producing an image.
    NoDump { drive: u8 },
    /// Disk requests still pending after the timeout.
    IoTimeout { pending: usize },
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk(e) => write!(f, "{e}"),
            Self::Hex(e) => write!(f, "Intel HEX load failed: {e}"),
            Self::Boot { drive, status } => write!(
                f,
                "cannot boot from drive {drive} (disk status {})",
                status.code()
            ),
            Self::WriteFailed { drive } => write!(f, "writing drive {drive} failed"),
            Self::NoDump { drive } => write!(f, "no image produced for drive {drive}"),
            Self::IoTimeout { pending } => {
                write!(f, "disk I/O timed out with {pending} requests pending")
            }
        }
    }
}

impl std::error::Error for MachineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Disk(e) => Some(e),
            Self::Hex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DiskError> for MachineError {
    fn from(e: DiskError) -> Self {
        Self::Disk(e)
    }
}

impl From<HexError> for MachineError {
    fn from(e: HexError) -> Self {
        Self::Hex(e)
    }
}

pub struct CpmMachine<I> {
    cpu: Z80,
    bus: CpmBus<I>,
    instructions_per_slice: u32,
    poll_limit: u32,
    decode_policy: DecodePolicy,
}

impl<I: SectorIo> CpmMachine<I> {
    /// Build a machine around a sector backend. Drive shapes come from the
    /// config; call [`CpmMachine::restore_geometries`] to prefer the ones
    /// saved in the store.
    #[must_use]
    pub fn new(
        config: &CpmConfig,
        io: I,
        console: Box<dyn Console>,
        printer: Box<dyn Printer>,
    ) -> Self {
        let disk = DiskController::with_geometries(io, config.drives.clone());
        Self {
            cpu: Z80::new(),
            bus: CpmBus::new(disk, console, printer),
            instructions_per_slice: config.instructions_per_slice,
            poll_limit: config.poll_limit(),
            decode_policy: config.decode_policy,
        }
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &CpmBus<I> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut CpmBus<I> {
        &mut self.bus
    }

    pub fn set_decode_policy(&mut self, policy: DecodePolicy) {
        self.decode_policy = policy;
    }

    /// PC=0, SP=0xF000. Memory and disks are untouched.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Run up to one slice worth of instructions.
    pub fn run_slice(&mut self) -> SliceExit {
        self.bus.reset_idle_polls();
        for _ in 0..self.instructions_per_slice {
            match self.cpu.step(&mut self.bus) {
                Ok(Step::Executed { .. }) => {}
                Ok(Step::Halted) => return SliceExit::Halted,
                Err(e) => match self.decode_policy {
                    DecodePolicy::Halt => {
                        warn!("{e}");
                        return SliceExit::DecodeError(e);
                    }
                    DecodePolicy::Skip => warn!("{e}, skipping"),
                },
            }
            if self.bus.idle_polls() > self.poll_limit {
                return SliceExit::Idle;
            }
        }
        self.bus.poll_disk();
        SliceExit::Completed
    }

    /// Poll the disk until nothing is pending.
    pub fn wait_io(&mut self) -> Result<(), MachineError> {
        let deadline = Instant::now() + IO_TIMEOUT;
        loop {
            self.bus.poll_disk();
            if self.bus.disk.is_idle() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MachineError::IoTimeout {
                    pending: self.bus.disk.pending(),
                });
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Replace drive shapes with the ones registered in the store.
    pub fn restore_geometries(&mut self) -> Result<(), MachineError> {
        self.bus.disk.restore_geometries();
        self.wait_io()
    }

    /// Load track 0 sector 1 of `drive` to 0x0000 and start there.
    pub fn boot(&mut self, drive: u8) -> Result<(), MachineError> {
        self.bus.read_sector_to(drive, 0, 1, 0x0000)?;
        self.wait_io()?;
        let status = self.bus.disk.status();
        if status != DiskStatus::Ok {
            return Err(MachineError::Boot { drive, status });
        }
        self.cpu.reset();
        info!("booting from drive {drive}");
        Ok(())
    }

    /// Load Intel HEX into memory and point PC at its start.
    pub fn load_hex(&mut self, text: &str) -> Result<HexLoad, MachineError> {
        let load = format_ihex::load(text, self.bus.memory_mut())?;
        self.cpu.set_pc(load.start);
        info!(
            "loaded HEX {:04X}-{:04X} ({} bytes)",
            load.start, load.end, load.len
        );
        Ok(load)
    }

    /// Write a flat disk image onto `drive` and wait for it to land.
    pub fn mount_image(&mut self, drive: u8, name: &str, image: &[u8]) -> Result<(), MachineError> {
        self.bus.disk.load_image(drive, name, image)?;
        self.finish_batch(drive)
    }

    pub fn format_drive(&mut self, drive: u8) -> Result<(), MachineError> {
        self.bus.disk.format_drive(drive)?;
        self.finish_batch(drive)
    }

    fn finish_batch(&mut self, drive: u8) -> Result<(), MachineError> {
        self.wait_io()?;
        match self.bus.disk.write_complete() {
            Some(true) => Ok(()),
            _ => Err(MachineError::WriteFailed { drive }),
        }
    }

    /// Read back a whole drive as a flat image.
    pub fn dump_drive(&mut self, drive: u8) -> Result<Vec<u8>, MachineError> {
        self.bus.disk.dump_drive(drive)?;
        self.wait_io()?;
        let dump = self
            .bus
            .disk
            .take_dump()
            .ok_or(MachineError::NoDump { drive })?;
        Ok(dump.image?)
    }

    #[must_use]
    pub fn io_status(&self) -> String {
        self.bus.io_status()
    }
}

impl<I: SectorIo> Observable for CpmMachine<I> {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("disk.") {
            self.bus.disk.query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let address = match rest.strip_prefix("0x") {
                Some(hex) => u16::from_str_radix(hex, 16).ok(),
                None => rest.parse().ok(),
            };
            address.map(|a| Value::U8(self.bus.memory()[usize::from(a)]))
        } else {
            self.cpu.query(path)
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["cpu.<z80_paths>", "disk.<controller_paths>", "memory.<address>"]
    }
}
