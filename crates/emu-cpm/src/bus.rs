//! CP/M machine bus: 64K of RAM plus the I/O port map.
//!
//! | port | in | out |
//! |------|----|-----|
//! | 0x00 | console status (0xFF = key waiting) | |
//! | 0x01 | console input, 7-bit | console output |
//! | 0x03 | | printer |
//! | 0x04 | 0xFF (aux always ready) | bit 0 rewinds the tape |
//! | 0x05 | paper tape, 0x1A at end | tape punch |
//! | 0x0A-0x0C | drive, track, sector | drive, track, sector |
//! | 0x0D | 0xFF when no disk I/O is pending | disk command |
//! | 0x0E | disk status | |
//! | 0x0F-0x10 | DMA low, high | DMA low, high |
//!
//! Only the low byte of the port address is decoded. Unmapped ports read
//! 0x1A so a program reading them sees end-of-file.

use cpm_fdc::{DiskController, DiskError, SectorIo};
use emu_core::Bus;
use log::trace;

use crate::console::{Console, Printer};
use crate::tape::{END_OF_TAPE, PaperTape, TapePunch};

pub const MEMORY_SIZE: usize = 0x10000;

pub const PORT_CONSOLE_STATUS: u8 = 0x00;
pub const PORT_CONSOLE_DATA: u8 = 0x01;
pub const PORT_PRINTER: u8 = 0x03;
pub const PORT_AUX_STATUS: u8 = 0x04;
pub const PORT_AUX_DATA: u8 = 0x05;
pub const PORT_DRIVE: u8 = 0x0A;
pub const PORT_TRACK: u8 = 0x0B;
pub const PORT_SECTOR: u8 = 0x0C;
pub const PORT_COMMAND: u8 = 0x0D;
pub const PORT_STATUS: u8 = 0x0E;
pub const PORT_DMA_LOW: u8 = 0x0F;
pub const PORT_DMA_HIGH: u8 = 0x10;

pub struct CpmBus<I> {
    memory: Vec<u8>,
    pub disk: DiskController<I>,
    pub tape: PaperTape,
    pub punch: TapePunch,
    console: Box<dyn Console>,
    printer: Box<dyn Printer>,
    /// Console status reads that found no key since the last reset.
    idle_polls: u32,
}

impl<I: SectorIo> CpmBus<I> {
    #[must_use]
    pub fn new(
        disk: DiskController<I>,
        console: Box<dyn Console>,
        printer: Box<dyn Printer>,
    ) -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            disk,
            tape: PaperTape::new(),
            punch: TapePunch::default(),
            console,
            printer,
            idle_polls: 0,
        }
    }

    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Copy `data` into memory at `address`, wrapping at the top.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.memory[usize::from(address.wrapping_add(i as u16))] = byte;
        }
    }

    /// Apply finished disk requests to memory.
    pub fn poll_disk(&mut self) -> usize {
        self.disk.poll(&mut self.memory)
    }

    /// Start a read that bypasses the controller latches.
    pub fn read_sector_to(
        &mut self,
        drive: u8,
        track: u8,
        sector: u8,
        address: u16,
    ) -> Result<(), DiskError> {
        self.disk
            .read_sector_to(drive, track, sector, address, &self.memory)
    }

    #[must_use]
    pub fn idle_polls(&self) -> u32 {
        self.idle_polls
    }

    pub fn reset_idle_polls(&mut self) {
        self.idle_polls = 0;
    }

    /// One-line summary of the controller latches and tape positions.
    #[must_use]
    pub fn io_status(&self) -> String {
        format!(
            "drv:{} trk:{} sec:{} dma:{:04x} stat:{} iocnt:{} ptr:{} len:{} pos:{} ptp:{} len:{}",
            self.disk.drive(),
            self.disk.track(),
            self.disk.sector(),
            self.disk.dma(),
            self.disk.status().code(),
            self.disk.pending(),
            self.tape.name(),
            self.tape.len(),
            self.tape.position(),
            self.punch.name(),
            self.punch.len(),
        )
    }
}

impl<I: SectorIo> Bus for CpmBus<I> {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[usize::from(address)] = value;
    }

    fn io_read(&mut self, port: u16) -> u8 {
        match port as u8 {
            PORT_CONSOLE_STATUS => {
                if self.console.status() {
                    self.idle_polls = 0;
                    0xFF
                } else {
                    self.idle_polls += 1;
                    0x00
                }
            }
            PORT_CONSOLE_DATA => self.console.read() & 0x7F,
            PORT_AUX_STATUS => 0xFF,
            PORT_AUX_DATA => self.tape.read(),
            PORT_DRIVE => self.disk.drive(),
            PORT_TRACK => self.disk.track(),
            PORT_SECTOR => self.disk.sector(),
            PORT_COMMAND => {
                self.poll_disk();
                if self.disk.is_idle() { 0xFF } else { 0x00 }
            }
            PORT_STATUS => {
                self.poll_disk();
                self.disk.status().code()
            }
            PORT_DMA_LOW => self.disk.dma() as u8,
            PORT_DMA_HIGH => (self.disk.dma() >> 8) as u8,
            other => {
                trace!("read from unmapped port {other:02X}");
                END_OF_TAPE
            }
        }
    }

    fn io_write(&mut self, port: u16, value: u8) {
        match port as u8 {
            PORT_CONSOLE_DATA => self.console.write(value),
            PORT_PRINTER => self.printer.print(value),
            PORT_AUX_STATUS => {
                if value & 0x01 != 0 {
                    self.tape.rewind();
                }
            }
            PORT_AUX_DATA => self.punch.punch(value),
            PORT_DRIVE => self.disk.set_drive(value),
            PORT_TRACK => self.disk.set_track(value),
            PORT_SECTOR => self.disk.set_sector(value),
            PORT_COMMAND => self.disk.command(value, &self.memory),
            PORT_DMA_LOW => self.disk.set_dma_low(value),
            PORT_DMA_HIGH => self.disk.set_dma_high(value),
            other => trace!("write {value:02X} to unmapped port {other:02X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{BufferedConsole, BufferedPrinter};
    use cpm_fdc::{ImmediateIo, MemoryStore, SectorKey, SectorStore};

    fn bus() -> (CpmBus<ImmediateIo<MemoryStore>>, BufferedConsole, BufferedPrinter) {
        let console = BufferedConsole::new();
        let printer = BufferedPrinter::new();
        let disk = DiskController::new(ImmediateIo::new(MemoryStore::new()));
        let bus = CpmBus::new(disk, Box::new(console.clone()), Box::new(printer.clone()));
        (bus, console, printer)
    }

    #[test]
    fn console_ports() {
        let (mut bus, console, _) = bus();
        assert_eq!(bus.io_read(0x00), 0x00);
        assert_eq!(bus.io_read(0x00), 0x00);
        assert_eq!(bus.idle_polls(), 2);

        console.push_input(b"x");
        assert_eq!(bus.io_read(0x00), 0xFF);
        assert_eq!(bus.idle_polls(), 0);
        assert_eq!(bus.io_read(0x01), b'x');

        bus.io_write(0x01, b'!');
        assert_eq!(console.take_output(), b"!");
    }

    #[test]
    fn high_port_byte_is_ignored() {
        let (mut bus, console, _) = bus();
        bus.io_write(0xAB01, b'h');
        assert_eq!(console.take_output(), b"h");
    }

    #[test]
    fn printer_and_tape_ports() {
        let (mut bus, _, printer) = bus();
        bus.io_write(0x03, b'p');
        assert_eq!(printer.take(), b"p");

        bus.tape.mount("t", vec![7, 8]);
        assert_eq!(bus.io_read(0x04), 0xFF);
        assert_eq!(bus.io_read(0x05), 7);
        bus.io_write(0x04, 0x00);
        assert_eq!(bus.io_read(0x05), 8);
        assert_eq!(bus.io_read(0x05), 0x1A);
        bus.io_write(0x04, 0x01);
        assert_eq!(bus.io_read(0x05), 7);

        bus.io_write(0x05, 0x42);
        assert_eq!(bus.punch.take(), vec![0x42]);
    }

    #[test]
    fn unmapped_ports_read_end_of_file() {
        let (mut bus, _, _) = bus();
        assert_eq!(bus.io_read(0x02), 0x1A);
        assert_eq!(bus.io_read(0x11), 0x1A);
        assert_eq!(bus.io_read(0xFF), 0x1A);
    }

    #[test]
    fn disk_round_trip_through_ports() {
        let (mut bus, _, _) = bus();
        bus.load(0x2000, &[0x99; 128]);
        bus.io_write(0x0A, 2);
        bus.io_write(0x0B, 10);
        bus.io_write(0x0C, 26);
        bus.io_write(0x0F, 0x00);
        bus.io_write(0x10, 0x20);
        assert_eq!(bus.io_read(0x10), 0x20);
        bus.io_write(0x0D, 1);
        assert_eq!(bus.disk.pending(), 1);
        // Reading the ready port drains the completion.
        assert_eq!(bus.io_read(0x0D), 0xFF);
        assert_eq!(bus.io_read(0x0E), 0);

        bus.io_write(0x10, 0x30);
        bus.io_write(0x0D, 0);
        assert_eq!(bus.read(0x3000), 0);
        assert_eq!(bus.io_read(0x0D), 0xFF);
        assert_eq!(bus.read(0x3000), 0x99);
        assert_eq!(bus.read(0x307F), 0x99);
        assert_eq!(
            bus.disk.io_mut().store_mut().get_sector(SectorKey::new(2, 10, 26)).ok().flatten(),
            Some([0x99; 128])
        );
    }

    #[test]
    fn disk_errors_show_on_status_port() {
        let (mut bus, _, _) = bus();
        bus.io_write(0x0A, 5);
        bus.io_write(0x0D, 0);
        assert_eq!(bus.io_read(0x0E), 1);
        bus.io_write(0x0A, 0);
        bus.io_write(0x0C, 1);
        bus.io_write(0x0D, 0);
        assert_eq!(bus.io_read(0x0E), 8);
        assert!(bus.io_status().starts_with("drv:0 trk:0 sec:1 dma:0000 stat:8 iocnt:0"));
    }
}
