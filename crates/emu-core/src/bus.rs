//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The Z80 has two address spaces: 64K of memory and a separate port space
/// reached by IN/OUT. Port addresses are 16 bits wide because the CPU drives
/// A8-A15 during I/O cycles; decoders that only look at the low byte should
/// mask it themselves.
pub trait Bus {
    /// Read a byte from memory.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to memory.
    fn write(&mut self, address: u16, value: u8);

    /// Read a byte from an I/O port.
    fn io_read(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn io_write(&mut self, port: u16, value: u8);
}

/// Flat 64K RAM with a scriptable port space. Used by CPU tests.
///
/// Port reads return whatever was last placed with [`SimpleBus::set_port`]
/// (0xFF otherwise). Port writes are recorded in order.
pub struct SimpleBus {
    memory: Vec<u8>,
    ports: [u8; 256],
    io_writes: Vec<(u16, u8)>,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            ports: [0xFF; 256],
            io_writes: Vec::new(),
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at 0xFFFF.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.memory[usize::from(addr)] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    /// Set the value returned by reads of `port` (low byte decoded).
    pub fn set_port(&mut self, port: u8, value: u8) {
        self.ports[usize::from(port)] = value;
    }

    /// Every port write seen so far, as `(port, value)`.
    #[must_use]
    pub fn io_writes(&self) -> &[(u16, u8)] {
        &self.io_writes
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[usize::from(address)] = value;
    }

    fn io_read(&mut self, port: u16) -> u8 {
        self.ports[usize::from(port & 0xFF)]
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.io_writes.push((port, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_wraps_at_top_of_memory() {
        let mut bus = SimpleBus::new();
        bus.load(0xFFFF, &[0x11, 0x22]);
        assert_eq!(bus.peek(0xFFFF), 0x11);
        assert_eq!(bus.peek(0x0000), 0x22);
    }

    #[test]
    fn ports_decode_low_byte() {
        let mut bus = SimpleBus::new();
        bus.set_port(0x10, 0x42);
        assert_eq!(bus.io_read(0xAB10), 0x42);
        assert_eq!(bus.io_read(0x0011), 0xFF);
        bus.io_write(0x1234, 7);
        assert_eq!(bus.io_writes(), &[(0x1234, 7)]);
    }
}
